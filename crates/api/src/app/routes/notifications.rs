use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use pricewatch_core::UserId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/stats/:user_id", get(stats))
        .route("/test-email", post(test_email))
        .route("/welcome", post(welcome))
}

pub async fn stats(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let user_id: UserId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid user id"),
    };

    match services.dispatcher.notifications_last_hour(user_id).await {
        Ok(count) => Json(dto::NotificationStats {
            user_id,
            notifications_last_hour: count,
            limit_per_hour: services.dispatcher.limit_per_hour(),
            timestamp: Utc::now(),
        })
        .into_response(),
        Err(e) => errors::rate_limit_error_to_response(e),
    }
}

/// Send a low-priority system mail to check the mail setup.
pub async fn test_email(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::TestEmailRequest>,
) -> axum::response::Response {
    match services
        .dispatcher
        .send_test_email(&body.email, body.subject.as_deref(), body.message.as_deref())
        .await
    {
        Ok(()) => (
            StatusCode::OK,
            Json(dto::MessageResponse {
                message: format!("Test email sent successfully to {}", body.email),
            }),
        )
            .into_response(),
        Err(e) => errors::send_error_to_response(e),
    }
}

pub async fn welcome(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::WelcomeRequest>,
) -> axum::response::Response {
    match services
        .dispatcher
        .send_welcome(&body.email, body.user_name())
        .await
    {
        Ok(()) => Json(dto::MessageResponse {
            message: format!("Welcome notification sent successfully to {}", body.email),
        })
        .into_response(),
        Err(e) => errors::send_error_to_response(e),
    }
}
