use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::{http::StatusCode, Json};
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::db::{create_todo, get_todo_with_user, save_log};
use crate::error::AppError;
use crate::middleware::Auth;
use crate::models::{CreateTodo, Todo, TodoResponse};
use crate::search::{
    list_todos, search_todos, ListQuery, Page, SearchFilter, SearchQuery, SearchResultRow,
    WeatherFilter,
};
use crate::AppState;

pub async fn create_new_todo(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(req): Json<CreateTodo>,
) -> Result<(StatusCode, Json<Todo>), AppError> {
    if req.title.trim().is_empty() {
        return Err(AppError::bad_request("Title cannot be empty"));
    }
    if req.contents.trim().is_empty() {
        return Err(AppError::bad_request("Contents cannot be empty"));
    }

    // A failed weather lookup counts as a failed attempt.
    let created = match state.weather.today().await {
        Ok(weather) => create_todo(
            &state.db,
            user.id,
            &req.title,
            &req.contents,
            &weather,
            OffsetDateTime::now_utc(),
        ),
        Err(err) => Err(err),
    };

    if let Err(err) = save_log(&state.db, created.is_ok()) {
        warn!(error = %err, "Failed to record todo creation log");
    }

    let todo = created?;
    info!(id = todo.id, user_id = user.id, weather = %todo.weather, "Created todo");
    Ok((StatusCode::CREATED, Json(todo)))
}

pub async fn list_all_todos(
    _auth: Auth,
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Page<TodoResponse>>, AppError> {
    let Query(query) = query?;
    let filter = WeatherFilter::try_from(query)?;
    let page = list_todos(&state.db, &filter)?;
    info!(
        count = page.items.len(),
        total = page.total_elements,
        "Listed todos"
    );
    Ok(Json(page))
}

pub async fn search(
    _auth: Auth,
    State(state): State<AppState>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Result<Json<Page<SearchResultRow>>, AppError> {
    let Query(query) = query?;
    let filter = SearchFilter::try_from(query)?;
    let page = search_todos(&state.db, &filter)?;
    info!(
        page = filter.page().index + 1,
        count = page.items.len(),
        total = page.total_elements,
        "Searched todos"
    );
    Ok(Json(page))
}

pub async fn get_single_todo(
    _auth: Auth,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<TodoResponse>, AppError> {
    match get_todo_with_user(&state.db, id)? {
        Some(todo) => Ok(Json(todo)),
        None => Err(AppError::NotFound),
    }
}
