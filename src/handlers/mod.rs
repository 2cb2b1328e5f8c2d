pub mod gateways;
pub mod metrics;
pub mod payments;

use axum::{
    http::StatusCode,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

use crate::services::PaymentGateway;

pub fn router(gateway: Arc<PaymentGateway>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/payments", post(payments::create_payment))
        .route("/gateways", get(gateways::list_gateways))
        .route("/gateways/test", post(gateways::test_all_connections))
        .route("/gateways/:gateway/api-key", put(gateways::set_api_key))
        .route("/gateways/:gateway/test", post(gateways::test_connection))
        .route("/metrics", get(metrics::get_metrics))
        .with_state(gateway)
}

async fn health_handler() -> StatusCode {
    StatusCode::OK
}
