use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};

use crate::models::gateway::Gateway;
use crate::services::{CredentialError, PaymentGateway};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyBody {
    api_key: String,
}

pub async fn list_gateways(State(gateway): State<Arc<PaymentGateway>>) -> Json<Value> {
    let supported: Vec<String> = Gateway::SUPPORTED.iter().map(|g| g.to_string()).collect();
    let configured: Vec<String> = gateway
        .configured_gateways()
        .iter()
        .map(|g| g.to_string())
        .collect();

    Json(serde_json::json!({
        "supported": supported,
        "configured": configured,
    }))
}

pub async fn set_api_key(
    State(gateway): State<Arc<PaymentGateway>>,
    Path(name): Path<String>,
    Json(body): Json<ApiKeyBody>,
) -> StatusCode {
    let target = Gateway::from(name);
    match gateway.set_api_key(&target, &body.api_key).await {
        Ok(()) => {
            info!("API key for {} updated", target);
            StatusCode::NO_CONTENT
        }
        Err(CredentialError::UnsupportedGateway(name)) => {
            error!("Refusing API key for unsupported gateway {}", name);
            StatusCode::BAD_REQUEST
        }
        Err(e) => {
            error!("Failed to persist API key for {}: {}", target, e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub async fn test_connection(
    State(gateway): State<Arc<PaymentGateway>>,
    Path(name): Path<String>,
) -> Json<Value> {
    let target = Gateway::from(name);
    let connected = gateway.test_connection(&target).await;

    Json(serde_json::json!({
        "gateway": target,
        "connected": connected,
    }))
}

pub async fn test_all_connections(
    State(gateway): State<Arc<PaymentGateway>>,
) -> Json<BTreeMap<String, bool>> {
    let results = gateway.test_all_connections().await;
    Json(
        results
            .into_iter()
            .map(|(gateway, connected)| (gateway.to_string(), connected))
            .collect(),
    )
}
