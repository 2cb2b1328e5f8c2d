use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use super::{ChargeContext, GatewayError, GatewayHandler, GatewayReceipt, ProbeContext};
use crate::models::gateway::Gateway;
use crate::models::payment::{new_transaction_id, PaymentRequest};

// Payload enviado ao provedor
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChargePayload<'a> {
    correlation_id: &'a str,
    amount_cents: i64,
    installments: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    customer_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    customer_document: Option<&'a str>,
    requested_at: i64, // timestamp em milissegundos
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChargeResponse {
    #[serde(default)]
    transaction_id: Option<String>,
    #[serde(default)]
    receipt_reference: Option<String>,
}

/// Gateway atrás de uma API HTTP/JSON.
pub struct RemoteGateway {
    client: Client,
    gateway: Gateway,
    base_url: Url,
}

impl RemoteGateway {
    pub fn new(gateway: Gateway, base_url: Url) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;
        Ok(Self::with_client(client, gateway, base_url))
    }

    pub fn with_client(client: Client, gateway: Gateway, base_url: Url) -> Self {
        Self {
            client,
            gateway,
            base_url,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.join(path)
            .map_err(|e| GatewayError::InvalidResponse(format!("bad endpoint: {e}")))
    }

    fn api_key<'a>(&self, api_key: &'a Option<String>) -> Result<&'a str, GatewayError> {
        api_key
            .as_deref()
            .ok_or_else(|| GatewayError::NotConfigured(self.gateway.to_string()))
    }

    fn classify(status: StatusCode, body: String) -> GatewayError {
        let message = if body.trim().is_empty() {
            format!("HTTP {}", status)
        } else {
            body
        };
        if status.is_server_error()
            || status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
        {
            GatewayError::Transient(message)
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            // credencial errada não é recusa do cartão
            GatewayError::Unauthorized(message)
        } else {
            GatewayError::Declined(message)
        }
    }
}

#[async_trait]
impl GatewayHandler for RemoteGateway {
    async fn charge(
        &self,
        request: &PaymentRequest,
        ctx: &ChargeContext,
    ) -> Result<GatewayReceipt, GatewayError> {
        let api_key = self.api_key(&ctx.api_key)?;
        let payload = ChargePayload {
            correlation_id: &request.order_id,
            amount_cents: request.amount.cents(),
            installments: request.installments.unwrap_or(1),
            description: request.description.as_deref(),
            customer_name: request.customer_name.as_deref(),
            customer_document: request.customer_document.as_deref(),
            requested_at: Utc::now().timestamp_millis(),
        };

        let response = self
            .client
            .post(self.endpoint("payments")?)
            .bearer_auth(api_key)
            .header("Idempotency-Key", &ctx.idempotency_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("{} gateway returned status {} for order {}", self.gateway, status, request.order_id);
            return Err(Self::classify(status, body));
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        let parsed: ChargeResponse = serde_json::from_value(raw.clone())
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        // O id do provedor vem com o prefixo do gateway para rastreabilidade
        let transaction_id = match parsed.transaction_id {
            Some(id) => format!("{}-{}", self.gateway.id_prefix(), id),
            None => new_transaction_id(&self.gateway),
        };

        info!("Order {} approved by {} gateway", request.order_id, self.gateway);
        Ok(GatewayReceipt {
            transaction_id,
            receipt_reference: parsed.receipt_reference,
            payload: raw,
        })
    }

    async fn probe(&self, ctx: &ProbeContext) -> Result<(), GatewayError> {
        let api_key = self.api_key(&ctx.api_key)?;
        let response = self
            .client
            .get(self.endpoint("health")?)
            .bearer_auth(api_key)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Self::classify(status, String::new()))
        }
    }
}
