use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;
use uuid::Uuid;

use super::{ChargeContext, GatewayError, GatewayHandler, GatewayReceipt, ProbeContext};
use crate::models::gateway::HandlerKind;
use crate::models::payment::{new_transaction_id, PaymentRequest};

/// Gateway sem integração real: espera um delay fixo e devolve um payload
/// no formato do provedor.
pub struct SimulatedGateway {
    kind: HandlerKind,
    delay: Duration,
    probe_delay: Duration,
}

impl SimulatedGateway {
    pub fn new(kind: HandlerKind, delay: Duration, probe_delay: Duration) -> Self {
        Self {
            kind,
            delay,
            probe_delay,
        }
    }

    fn card_payload(
        request: &PaymentRequest,
        transaction_id: &str,
        acquirer: &str,
    ) -> (serde_json::Value, String) {
        let mut rng = rand::thread_rng();
        let nsu = format!("{:012}", rng.gen_range(0..1_000_000_000_000u64));
        let authorization_code = format!("{:06}", rng.gen_range(0..1_000_000u32));

        let payload = serde_json::json!({
            "acquirer": acquirer,
            "transactionId": transaction_id,
            "authorizationCode": authorization_code,
            "nsu": nsu,
            "cardBrand": "VISA",
            "installments": request.installments.unwrap_or(1),
            "amountCents": request.amount.cents(),
            "status": "APPROVED",
            "authorizedAt": Utc::now(),
        });
        (payload, nsu)
    }

    fn pix_payload(request: &PaymentRequest, transaction_id: &str) -> (serde_json::Value, String) {
        let txid = Uuid::new_v4().simple().to_string();
        let end_to_end_id = format!("E{}", &txid[..31]);
        let payload = serde_json::json!({
            "transactionId": transaction_id,
            "txid": txid,
            "endToEndId": end_to_end_id,
            "qrCode": format!(
                "00020126580014br.gov.bcb.pix0136{}5204000053039865405{}",
                txid,
                request.amount.to_decimal_string()
            ),
            "amountCents": request.amount.cents(),
            "status": "CONCLUIDA",
            "paidAt": Utc::now(),
        });
        (payload, end_to_end_id)
    }
}

#[async_trait]
impl GatewayHandler for SimulatedGateway {
    async fn charge(
        &self,
        request: &PaymentRequest,
        ctx: &ChargeContext,
    ) -> Result<GatewayReceipt, GatewayError> {
        debug!(
            "Simulating {:?} charge for order {} (attempt {})",
            self.kind, request.order_id, ctx.attempt
        );
        sleep(self.delay).await;

        let transaction_id = new_transaction_id(&request.gateway);
        let (payload, receipt_reference) = match self.kind {
            HandlerKind::Stone => Self::card_payload(request, &transaction_id, "stone"),
            HandlerKind::Getnet => Self::card_payload(request, &transaction_id, "getnet"),
            HandlerKind::Pix => Self::pix_payload(request, &transaction_id),
            HandlerKind::Generic => {
                let payload = serde_json::json!({
                    "provider": request.gateway.as_str(),
                    "transactionId": transaction_id,
                    "amountCents": request.amount.cents(),
                    "status": "approved",
                });
                (payload, transaction_id.clone())
            }
        };

        Ok(GatewayReceipt {
            transaction_id,
            receipt_reference: Some(receipt_reference),
            payload,
        })
    }

    async fn probe(&self, _ctx: &ProbeContext) -> Result<(), GatewayError> {
        sleep(self.probe_delay).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::gateway::Gateway;
    use crate::utils::money::Amount;

    fn ctx() -> ChargeContext {
        ChargeContext {
            idempotency_key: "k".into(),
            api_key: None,
            attempt: 1,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_charge_waits_for_configured_delay() {
        let gateway = SimulatedGateway::new(
            HandlerKind::Stone,
            Duration::from_millis(2000),
            Duration::from_millis(10),
        );
        let request = PaymentRequest::new(Amount::from_cents(1000), "ORD-1", Gateway::Stone)
            .with_installments(3);

        let started = tokio::time::Instant::now();
        let receipt = gateway.charge(&request, &ctx()).await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(2000));
        assert!(receipt.transaction_id.starts_with("STONE-"));
        assert_eq!(receipt.payload["installments"], 3);
        assert_eq!(receipt.payload["nsu"].as_str().unwrap().len(), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pix_receipt_is_end_to_end_id() {
        let gateway = SimulatedGateway::new(HandlerKind::Pix, Duration::ZERO, Duration::ZERO);
        let request = PaymentRequest::new(Amount::from_cents(2550), "ORD-1", Gateway::Pix);

        let receipt = gateway.charge(&request, &ctx()).await.unwrap();
        let reference = receipt.receipt_reference.unwrap();

        assert!(reference.starts_with('E'));
        assert_eq!(reference.len(), 32);
        assert_eq!(receipt.payload["endToEndId"], reference.as_str());
        assert!(receipt.payload["qrCode"].as_str().unwrap().ends_with("25.50"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_generic_uses_requested_gateway_prefix() {
        let gateway = SimulatedGateway::new(HandlerKind::Generic, Duration::ZERO, Duration::ZERO);
        let request = PaymentRequest::new(Amount::from_cents(500), "ORD-9", Gateway::PagSeguro);

        let receipt = gateway.charge(&request, &ctx()).await.unwrap();
        assert!(receipt.transaction_id.starts_with("PAGSEGURO-"));
        assert_eq!(receipt.payload["provider"], "pagseguro");
    }
}
