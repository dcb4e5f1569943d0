use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use pricewatch_monitor::StoreError;
use pricewatch_notify::{RateLimitError, SendError};

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::Backend(msg) => json_error(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", msg),
        StoreError::Corrupt(msg) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg),
    }
}

pub fn send_error_to_response(err: SendError) -> axum::response::Response {
    match err {
        SendError::UnsupportedChannel(channel) => json_error(
            StatusCode::NOT_IMPLEMENTED,
            "unsupported_channel",
            format!("{channel} notifications are not supported"),
        ),
        other => json_error(StatusCode::INTERNAL_SERVER_ERROR, "send_failed", other.to_string()),
    }
}

pub fn rate_limit_error_to_response(err: RateLimitError) -> axum::response::Response {
    json_error(StatusCode::SERVICE_UNAVAILABLE, "rate_limit_store_unavailable", err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
