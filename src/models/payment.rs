use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use crate::models::gateway::Gateway;
use crate::utils::money::Amount;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub amount: Amount,
    pub order_id: String,
    pub gateway: Gateway,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub installments: Option<u32>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_document: Option<String>,
}

impl PaymentRequest {
    pub fn new(amount: Amount, order_id: impl Into<String>, gateway: Gateway) -> Self {
        Self {
            amount,
            order_id: order_id.into(),
            gateway,
            description: None,
            installments: None,
            customer_name: None,
            customer_document: None,
        }
    }

    pub fn with_installments(mut self, installments: u32) -> Self {
        self.installments = Some(installments);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_customer(mut self, name: impl Into<String>, document: Option<String>) -> Self {
        self.customer_name = Some(name.into());
        self.customer_document = document;
        self
    }
}

/// `{GATEWAY}-{uuid}`: único mesmo com dispatches concorrentes no mesmo milissegundo.
pub fn new_transaction_id(gateway: &Gateway) -> String {
    format!("{}-{}", gateway.id_prefix(), Uuid::new_v4().simple())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    Configuration,
    Declined,
    Transient,
    Timeout,
    Duplicate,
    Internal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PaymentOutcome {
    Approved {
        transaction_id: String,
        receipt_reference: Option<String>,
    },
    Failed {
        kind: FailureKind,
        error_message: String,
    },
}

#[derive(Debug, Clone)]
pub struct PaymentResult {
    pub gateway: Gateway,
    pub order_id: String,
    pub outcome: PaymentOutcome,
    pub gateway_response: Option<serde_json::Value>,
    pub attempts: u32,
    pub completed_at: DateTime<Utc>,
}

impl PaymentResult {
    pub fn approved(
        request: &PaymentRequest,
        transaction_id: String,
        receipt_reference: Option<String>,
        gateway_response: Option<serde_json::Value>,
        attempts: u32,
    ) -> Self {
        Self {
            gateway: request.gateway.clone(),
            order_id: request.order_id.clone(),
            outcome: PaymentOutcome::Approved {
                transaction_id,
                receipt_reference,
            },
            gateway_response,
            attempts,
            completed_at: Utc::now(),
        }
    }

    pub fn failed(
        request: &PaymentRequest,
        kind: FailureKind,
        error_message: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self {
            gateway: request.gateway.clone(),
            order_id: request.order_id.clone(),
            outcome: PaymentOutcome::Failed {
                kind,
                error_message: error_message.into(),
            },
            gateway_response: None,
            attempts,
            completed_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, PaymentOutcome::Approved { .. })
    }

    pub fn transaction_id(&self) -> Option<&str> {
        match &self.outcome {
            PaymentOutcome::Approved { transaction_id, .. } => Some(transaction_id),
            PaymentOutcome::Failed { .. } => None,
        }
    }

    pub fn receipt_reference(&self) -> Option<&str> {
        match &self.outcome {
            PaymentOutcome::Approved {
                receipt_reference, ..
            } => receipt_reference.as_deref(),
            PaymentOutcome::Failed { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.outcome {
            PaymentOutcome::Failed { error_message, .. } => Some(error_message),
            PaymentOutcome::Approved { .. } => None,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.outcome {
            PaymentOutcome::Failed { kind, .. } => Some(*kind),
            PaymentOutcome::Approved { .. } => None,
        }
    }
}

// Formato consumido pelo checkout: flag `success` + campos planos.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentResultBody<'a> {
    success: bool,
    gateway: &'a Gateway,
    order_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    transaction_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    receipt_reference: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gateway_response: Option<&'a serde_json::Value>,
    attempts: u32,
    completed_at: DateTime<Utc>,
}

impl Serialize for PaymentResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        PaymentResultBody {
            success: self.is_success(),
            gateway: &self.gateway,
            order_id: &self.order_id,
            transaction_id: self.transaction_id(),
            receipt_reference: self.receipt_reference(),
            error_kind: self.failure_kind(),
            error_message: self.error_message(),
            gateway_response: self.gateway_response.as_ref(),
            attempts: self.attempts,
            completed_at: self.completed_at,
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_accepts_checkout_payload() {
        let request: PaymentRequest = serde_json::from_str(
            r#"{"amount": 25.50, "orderId": "ORD-1", "gateway": "pix", "customerName": "Ana"}"#,
        )
        .unwrap();
        assert_eq!(request.amount.cents(), 2550);
        assert_eq!(request.gateway, Gateway::Pix);
        assert_eq!(request.customer_name.as_deref(), Some("Ana"));
        assert_eq!(request.installments, None);
    }

    #[test]
    fn test_failed_result_has_no_transaction_fields() {
        let request = PaymentRequest::new(Amount::from_cents(100), "ORD-2", Gateway::Stone);
        let result = PaymentResult::failed(&request, FailureKind::Declined, "card declined", 1);
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["success"], false);
        assert_eq!(json["errorMessage"], "card declined");
        assert_eq!(json["errorKind"], "declined");
        assert!(json.get("transactionId").is_none());
    }

    #[test]
    fn test_approved_result_has_no_error_fields() {
        let request = PaymentRequest::new(Amount::from_cents(100), "ORD-3", Gateway::Cash);
        let result = PaymentResult::approved(&request, new_transaction_id(&Gateway::Cash), None, None, 0);
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["success"], true);
        assert!(json["transactionId"].as_str().unwrap().starts_with("CASH-"));
        assert!(json.get("errorMessage").is_none());
    }

    #[test]
    fn test_transaction_ids_do_not_collide() {
        let ids: std::collections::HashSet<_> =
            (0..1000).map(|_| new_transaction_id(&Gateway::Pix)).collect();
        assert_eq!(ids.len(), 1000);
    }
}
