use axum::Router;

pub mod monitor;
pub mod notifications;
pub mod system;

/// Router for the admin endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/monitor", monitor::router())
        .nest("/notifications", notifications::router())
}
