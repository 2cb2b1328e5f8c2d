pub mod remote;
pub mod simulated;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::models::payment::{FailureKind, PaymentRequest};

pub use remote::RemoteGateway;
pub use simulated::SimulatedGateway;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0}")]
    Declined(String),
    #[error("{0}")]
    Transient(String),
    #[error("gateway did not answer within {0:?}")]
    Timeout(Duration),
    #[error("gateway {0} is not configured")]
    NotConfigured(String),
    #[error("gateway rejected the API key: {0}")]
    Unauthorized(String),
    #[error("unsupported payment gateway: {0}")]
    Unsupported(String),
    #[error("gateway request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid gateway response: {0}")]
    InvalidResponse(String),
    #[error("gateway handler crashed: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Only transient errors are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Transient(_) | GatewayError::Timeout(_) => true,
            GatewayError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            GatewayError::Declined(_) => FailureKind::Declined,
            GatewayError::Timeout(_) => FailureKind::Timeout,
            GatewayError::NotConfigured(_)
            | GatewayError::Unauthorized(_)
            | GatewayError::Unsupported(_) => FailureKind::Configuration,
            GatewayError::InvalidResponse(_) | GatewayError::Internal(_) => FailureKind::Internal,
            GatewayError::Transient(_) | GatewayError::Http(_) => FailureKind::Transient,
        }
    }
}

/// What a gateway hands back on approval.
#[derive(Debug, Clone)]
pub struct GatewayReceipt {
    pub transaction_id: String,
    pub receipt_reference: Option<String>,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct ChargeContext {
    pub idempotency_key: String,
    pub api_key: Option<String>,
    pub attempt: u32,
}

#[derive(Debug, Clone)]
pub struct ProbeContext {
    pub api_key: Option<String>,
}

#[async_trait]
pub trait GatewayHandler: Send + Sync {
    async fn charge(
        &self,
        request: &PaymentRequest,
        ctx: &ChargeContext,
    ) -> Result<GatewayReceipt, GatewayError>;

    async fn probe(&self, ctx: &ProbeContext) -> Result<(), GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(GatewayError::Transient("503".into()).is_transient());
        assert!(GatewayError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(!GatewayError::Declined("card declined".into()).is_transient());
        assert!(!GatewayError::NotConfigured("stone".into()).is_transient());
        assert!(!GatewayError::Unauthorized("invalid api key".into()).is_transient());
    }

    #[test]
    fn test_declined_message_is_verbatim() {
        let err = GatewayError::Declined("card declined".into());
        assert_eq!(err.to_string(), "card declined");
        assert_eq!(err.failure_kind(), FailureKind::Declined);
    }
}
