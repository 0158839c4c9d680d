pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod search;
pub mod seed;
pub mod weather;

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use db::DbPool;
use weather::WeatherClient;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub weather: Arc<WeatherClient>,
    pub base_path: Arc<String>,
}

pub fn create_app(state: AppState) -> Router {
    let base_path = state.base_path.clone();

    let app_routes = Router::new()
        .route("/api/auth/signup", post(handlers::auth::signup))
        .route("/api/auth/signin", post(handlers::auth::signin))
        .route("/api/auth/signout", post(handlers::auth::signout))
        .route("/api/users/me", get(handlers::auth::me))
        .route("/api/todos", get(handlers::todos::list_all_todos))
        .route("/api/todos", post(handlers::todos::create_new_todo))
        .route("/api/todos/search", get(handlers::todos::search))
        .route("/api/todos/{id}", get(handlers::todos::get_single_todo))
        .route("/api/todos/{id}/managers", get(handlers::managers::list))
        .route("/api/todos/{id}/managers", post(handlers::managers::assign))
        .route(
            "/api/todos/{id}/managers/{manager_id}",
            delete(handlers::managers::remove),
        )
        .route("/api/todos/{id}/comments", get(handlers::comments::list))
        .route("/api/todos/{id}/comments", post(handlers::comments::create))
        .layer(
            tower::ServiceBuilder::new()
                .layer(tower_http::trace::TraceLayer::new_for_http())
                .layer(tower_http::compression::CompressionLayer::new()),
        )
        .with_state(state);

    tracing::info!("base_path: {base_path:?}");

    if base_path.is_empty() {
        app_routes
    } else {
        Router::new().nest(&base_path, app_routes)
    }
}
