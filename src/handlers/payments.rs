use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

use crate::models::payment::{PaymentRequest, PaymentResult};
use crate::services::PaymentGateway;

pub async fn create_payment(
    State(gateway): State<Arc<PaymentGateway>>,
    Json(payload): Json<Value>,
) -> Result<Json<PaymentResult>, (StatusCode, Json<Value>)> {
    let request: PaymentRequest = match serde_json::from_value(payload) {
        Ok(req) => req,
        Err(e) => {
            error!("Invalid payment request: {}", e);
            return Err((
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": e.to_string() })),
            ));
        }
    };

    info!(
        "Received payment request {} for {} via {}",
        request.order_id, request.amount, request.gateway
    );

    // Falhas de pagamento voltam com 200 e success=false
    Ok(Json(gateway.process_payment(request).await))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::CredentialStore;

    fn state() -> State<Arc<PaymentGateway>> {
        State(Arc::new(
            PaymentGateway::builder(Arc::new(CredentialStore::in_memory())).build(),
        ))
    }

    #[tokio::test]
    async fn test_cash_payment_round_trip() {
        let Json(result) = create_payment(
            state(),
            Json(serde_json::json!({ "amount": 12.5, "orderId": "ORD-1", "gateway": "cash" })),
        )
        .await
        .unwrap();

        assert!(result.is_success());
        assert_eq!(result.order_id, "ORD-1");
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let (status, Json(body)) = create_payment(
            state(),
            Json(serde_json::json!({ "amount": "abc", "orderId": "ORD-1", "gateway": "pix" })),
        )
        .await
        .unwrap_err();

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("invalid amount"));
    }

    #[tokio::test]
    async fn test_validation_failure_is_still_ok_status() {
        let Json(result) = create_payment(
            state(),
            Json(serde_json::json!({ "amount": 0, "orderId": "ORD-1", "gateway": "stone" })),
        )
        .await
        .unwrap();

        assert!(!result.is_success());
    }
}
