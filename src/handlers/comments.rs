use axum::extract::{Path, State};
use axum::{http::StatusCode, Json};
use tracing::info;

use crate::db::{create_comment, get_todo, list_comments};
use crate::error::AppError;
use crate::middleware::Auth;
use crate::models::{CommentResponse, CreateComment};
use crate::AppState;

pub async fn create(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(todo_id): Path<i64>,
    Json(req): Json<CreateComment>,
) -> Result<(StatusCode, Json<CommentResponse>), AppError> {
    if req.contents.trim().is_empty() {
        return Err(AppError::bad_request("Comment cannot be empty"));
    }
    if get_todo(&state.db, todo_id)?.is_none() {
        return Err(AppError::NotFound);
    }

    let comment = create_comment(&state.db, todo_id, user.id, &req.contents)?;
    info!(todo_id, id = comment.id, "Created comment");
    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn list(
    _auth: Auth,
    State(state): State<AppState>,
    Path(todo_id): Path<i64>,
) -> Result<Json<Vec<CommentResponse>>, AppError> {
    if get_todo(&state.db, todo_id)?.is_none() {
        return Err(AppError::NotFound);
    }
    Ok(Json(list_comments(&state.db, todo_id)?))
}
