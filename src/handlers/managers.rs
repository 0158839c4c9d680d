use axum::extract::{Path, State};
use axum::{http::StatusCode, response::IntoResponse, Json};
use tracing::info;

use crate::db::{add_manager, delete_manager, get_todo, get_user, list_managers};
use crate::error::AppError;
use crate::middleware::Auth;
use crate::models::{AssignManager, AuthUser, ManagerResponse, Todo};
use crate::AppState;

fn owned_todo(state: &AppState, user: &AuthUser, todo_id: i64) -> Result<Todo, AppError> {
    let todo = get_todo(&state.db, todo_id)?.ok_or(AppError::NotFound)?;
    if todo.user_id != user.id {
        return Err(AppError::bad_request(
            "Only the todo owner can change its managers",
        ));
    }
    Ok(todo)
}

pub async fn assign(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(todo_id): Path<i64>,
    Json(req): Json<AssignManager>,
) -> Result<(StatusCode, Json<ManagerResponse>), AppError> {
    let todo = owned_todo(&state, &user, todo_id)?;
    if get_user(&state.db, req.manager_user_id)?.is_none() {
        return Err(AppError::bad_request("Manager user does not exist"));
    }

    let manager = add_manager(&state.db, todo.id, req.manager_user_id)?;
    info!(todo_id, manager_id = manager.id, user_id = manager.user.id, "Assigned manager");
    Ok((StatusCode::CREATED, Json(manager)))
}

pub async fn list(
    _auth: Auth,
    State(state): State<AppState>,
    Path(todo_id): Path<i64>,
) -> Result<Json<Vec<ManagerResponse>>, AppError> {
    if get_todo(&state.db, todo_id)?.is_none() {
        return Err(AppError::NotFound);
    }
    Ok(Json(list_managers(&state.db, todo_id)?))
}

pub async fn remove(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path((todo_id, manager_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    owned_todo(&state, &user, todo_id)?;
    if delete_manager(&state.db, todo_id, manager_id)? {
        info!(todo_id, manager_id, "Removed manager");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound)
    }
}
