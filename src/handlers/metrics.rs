use axum::{extract::State, response::Json};
use std::sync::Arc;

use crate::services::PaymentGateway;

pub async fn get_metrics(State(gateway): State<Arc<PaymentGateway>>) -> Json<serde_json::Value> {
    let snapshot = gateway.metrics();
    let configured: Vec<String> = gateway
        .configured_gateways()
        .iter()
        .map(|g| g.to_string())
        .collect();

    Json(serde_json::json!({
        "payments": snapshot,
        "approval_rate": snapshot.approval_rate(),
        "idempotency_ledger_size": gateway.ledger_size(),
        "configured_gateways": configured,
    }))
}
