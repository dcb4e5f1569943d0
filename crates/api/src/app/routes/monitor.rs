use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use pricewatch_core::ProductId;
use pricewatch_monitor::MonitoredProduct;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/run", post(run_tick))
        .route("/products/:id", post(check_product))
        .route("/history/:product_id", get(history))
        .route("/latest/:product_id", get(latest))
        .route("/changes", get(changes))
}

fn parse_product_id(raw: &str) -> Result<ProductId, axum::response::Response> {
    raw.parse().map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid product id")
    })
}

/// Run one monitoring pass now, outside the schedule.
pub async fn run_tick(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let report = services.orchestrator.run_tick().await;
    (StatusCode::OK, Json(report)).into_response()
}

pub async fn check_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(product): Json<MonitoredProduct>,
) -> axum::response::Response {
    let product_id = match parse_product_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if product.id != product_id {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "id_mismatch",
            format!("path id {product_id} does not match body id {}", product.id),
        );
    }

    match services.orchestrator.check_product(&product).await {
        Ok(outcome) => Json(dto::CheckProductResponse {
            product_id,
            observation: outcome.observation,
            events_published: outcome.events_published,
        })
        .into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn history(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Query(query): Query<dto::HistoryQuery>,
) -> axum::response::Response {
    let product_id = match parse_product_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.orchestrator.history(product_id, query.days()).await {
        Ok(observations) => Json(observations).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn latest(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let product_id = match parse_product_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.orchestrator.latest(product_id).await {
        Ok(Some(observation)) => Json(observation).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "no observations for product"),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn changes(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ChangesQuery>,
) -> axum::response::Response {
    let hours = query.hours();
    match services.orchestrator.products_with_changes(hours).await {
        Ok(product_ids) => Json(dto::ChangesResponse { hours, product_ids }).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
