use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::app::config::{Config, ConfigError};
use crate::models::gateway::{Gateway, HandlerKind, Route};
use crate::models::payment::{new_transaction_id, FailureKind, PaymentRequest, PaymentResult};
use crate::services::atomic_metrics::{AtomicMetrics, MetricsSnapshot};
use crate::services::credential_store::{CredentialError, CredentialStore};
use crate::services::dispatch_policy::DispatchPolicy;
use crate::services::gateways::{
    ChargeContext, GatewayError, GatewayHandler, ProbeContext, RemoteGateway, SimulatedGateway,
};
use crate::services::idempotency::{
    Begin, IdempotencyKey, IdempotencyLedger, RequestFingerprint, DEFAULT_TTL,
};
use crate::services::notifier::{Notification, Notifier, TracingNotifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Dispatching,
    Retrying,
    Succeeded,
    Failed,
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DispatchState::Idle => "idle",
            DispatchState::Dispatching => "dispatching",
            DispatchState::Retrying => "retrying",
            DispatchState::Succeeded => "succeeded",
            DispatchState::Failed => "failed",
        };
        f.write_str(name)
    }
}

fn trace_state(request: &PaymentRequest, state: DispatchState) {
    debug!(
        order_id = %request.order_id,
        gateway = %request.gateway,
        state = %state,
        "dispatch state"
    );
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Fachada única do checkout: valida, roteia para o gateway e devolve
/// sempre um `PaymentResult`, nunca um erro.
pub struct PaymentGateway {
    credentials: Arc<CredentialStore>,
    handlers: HashMap<Gateway, Arc<dyn GatewayHandler>>,
    policy: DispatchPolicy,
    ledger: Option<IdempotencyLedger>,
    notifier: Arc<dyn Notifier>,
    metrics: AtomicMetrics,
    max_installments: u32,
}

pub struct PaymentGatewayBuilder {
    credentials: Arc<CredentialStore>,
    policy: DispatchPolicy,
    notifier: Arc<dyn Notifier>,
    idempotency: bool,
    idempotency_ttl: Duration,
    max_installments: u32,
    card_delay: Duration,
    pix_delay: Duration,
    probe_delay: Duration,
    overrides: HashMap<Gateway, Arc<dyn GatewayHandler>>,
}

impl PaymentGatewayBuilder {
    pub fn policy(mut self, policy: DispatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn idempotency(mut self, enabled: bool) -> Self {
        self.idempotency = enabled;
        self
    }

    /// How long an approval stays replayable.
    pub fn idempotency_ttl(mut self, ttl: Duration) -> Self {
        self.idempotency_ttl = ttl;
        self
    }

    pub fn max_installments(mut self, max_installments: u32) -> Self {
        self.max_installments = max_installments;
        self
    }

    pub fn simulated_delays(mut self, card: Duration, pix: Duration, probe: Duration) -> Self {
        self.card_delay = card;
        self.pix_delay = pix;
        self.probe_delay = probe;
        self
    }

    /// Replaces the handler of one gateway (remote integration, tests).
    pub fn handler(mut self, gateway: Gateway, handler: Arc<dyn GatewayHandler>) -> Self {
        self.overrides.insert(gateway, handler);
        self
    }

    pub fn build(mut self) -> PaymentGateway {
        let mut handlers: HashMap<Gateway, Arc<dyn GatewayHandler>> = HashMap::new();

        for gateway in Gateway::SUPPORTED {
            let kind = match gateway.route() {
                Route::Handler(kind) => kind,
                Route::Local | Route::Unsupported => continue,
            };
            let handler: Arc<dyn GatewayHandler> = match self.overrides.remove(&gateway) {
                Some(handler) => handler,
                None => {
                    let delay = match kind {
                        HandlerKind::Pix => self.pix_delay,
                        HandlerKind::Stone | HandlerKind::Getnet | HandlerKind::Generic => {
                            self.card_delay
                        }
                    };
                    Arc::new(SimulatedGateway::new(kind, delay, self.probe_delay))
                }
            };
            handlers.insert(gateway, handler);
        }

        for gateway in self.overrides.keys() {
            warn!("Ignoring handler override for gateway {} without a handler route", gateway);
        }

        let ttl = self.idempotency_ttl;
        PaymentGateway {
            credentials: self.credentials,
            handlers,
            policy: self.policy,
            ledger: self.idempotency.then(|| IdempotencyLedger::with_ttl(ttl)),
            notifier: self.notifier,
            metrics: AtomicMetrics::new(),
            max_installments: self.max_installments,
        }
    }
}

impl PaymentGateway {
    pub fn builder(credentials: Arc<CredentialStore>) -> PaymentGatewayBuilder {
        PaymentGatewayBuilder {
            credentials,
            policy: DispatchPolicy::default(),
            notifier: Arc::new(TracingNotifier),
            idempotency: true,
            idempotency_ttl: DEFAULT_TTL,
            max_installments: 12,
            card_delay: Duration::from_millis(2000),
            pix_delay: Duration::from_millis(1500),
            probe_delay: Duration::from_millis(1000),
            overrides: HashMap::new(),
        }
    }

    pub fn from_config(
        config: &Config,
        credentials: Arc<CredentialStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Self::builder(credentials)
            .policy(DispatchPolicy::from_config(config))
            .notifier(notifier)
            .idempotency(config.idempotency_enabled)
            .idempotency_ttl(config.idempotency_ttl())
            .max_installments(config.max_installments)
            .simulated_delays(
                Duration::from_millis(config.simulated_card_delay_ms),
                Duration::from_millis(config.simulated_pix_delay_ms),
                Duration::from_millis(config.simulated_probe_delay_ms),
            );

        for gateway in Gateway::SUPPORTED {
            if let Some(url) = config.endpoint_for(&gateway)? {
                info!("Gateway {} dispatches to {}", gateway, url);
                let remote = RemoteGateway::new(gateway.clone(), url).map_err(|e| {
                    ConfigError::Endpoint {
                        gateway: gateway.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                builder = builder.handler(gateway, Arc::new(remote));
            }
        }

        Ok(builder.build())
    }

    pub async fn process_payment(&self, request: PaymentRequest) -> PaymentResult {
        self.metrics.increment_submitted();
        trace_state(&request, DispatchState::Idle);

        if let Err(message) = self.validate(&request) {
            warn!("Rejecting order {}: {}", request.order_id, message);
            self.metrics.increment_rejected();
            return self.finish(PaymentResult::failed(&request, FailureKind::Validation, message, 0));
        }

        let handler = match request.gateway.route() {
            Route::Local => None,
            Route::Handler(_) => match self.handlers.get(&request.gateway) {
                Some(handler) => Some(handler.clone()),
                None => {
                    let err = GatewayError::NotConfigured(request.gateway.to_string());
                    return self.finish(PaymentResult::failed(&request, err.failure_kind(), err.to_string(), 0));
                }
            },
            Route::Unsupported => {
                let err = GatewayError::Unsupported(request.gateway.to_string());
                error!("Order {} targets an unsupported gateway", request.order_id);
                return self.finish(PaymentResult::failed(&request, err.failure_kind(), err.to_string(), 0));
            }
        };

        let key = IdempotencyKey::derive(&request.gateway, &request.order_id);
        let fingerprint = RequestFingerprint::of(&request);
        let claim = match self.ledger.as_ref().map(|ledger| ledger.begin(&key, fingerprint)) {
            Some(Begin::Completed(previous)) => {
                info!("Order {} already approved on {}, replaying result", request.order_id, request.gateway);
                self.metrics.increment_replayed();
                return previous;
            }
            Some(Begin::Conflict) => {
                warn!(
                    "Order {} was already approved on {} with different terms",
                    request.order_id, request.gateway
                );
                return self.finish(PaymentResult::failed(
                    &request,
                    FailureKind::Duplicate,
                    format!(
                        "conflicting request for order {}: already approved with a different amount or installments",
                        request.order_id
                    ),
                    0,
                ));
            }
            Some(Begin::InFlight) => {
                return self.finish(PaymentResult::failed(
                    &request,
                    FailureKind::Duplicate,
                    format!("payment for order {} is already in progress", request.order_id),
                    0,
                ));
            }
            Some(Begin::Fresh(claim)) => Some(claim),
            None => None,
        };

        let result = match handler {
            // Dinheiro: sem chamada externa e sem await
            None => {
                PaymentResult::approved(&request, new_transaction_id(&request.gateway), None, None, 0)
            }
            Some(handler) => self.dispatch(handler, &request, &key).await,
        };

        if let Some(claim) = claim {
            claim.complete(&result);
        }
        self.finish(result)
    }

    fn validate(&self, request: &PaymentRequest) -> Result<(), String> {
        if !request.amount.is_positive() {
            return Err("amount must be greater than zero".to_string());
        }
        if request.order_id.trim().is_empty() {
            return Err("order id is required".to_string());
        }
        match request.installments {
            Some(n) if n == 0 || n > self.max_installments => Err(format!(
                "installments must be between 1 and {}",
                self.max_installments
            )),
            Some(n) if n > 1 && !request.gateway.accepts_installments() => {
                Err(format!("{} does not accept installments", request.gateway))
            }
            _ => Ok(()),
        }
    }

    async fn dispatch(
        &self,
        handler: Arc<dyn GatewayHandler>,
        request: &PaymentRequest,
        key: &IdempotencyKey,
    ) -> PaymentResult {
        let api_key = self.credentials.api_key(&request.gateway);
        trace_state(request, DispatchState::Dispatching);

        let outcome = self
            .policy
            .run(
                |attempt| {
                    let handler = handler.clone();
                    let ctx = ChargeContext {
                        idempotency_key: key.to_string(),
                        api_key: api_key.clone(),
                        attempt,
                    };
                    async move {
                        match AssertUnwindSafe(handler.charge(request, &ctx))
                            .catch_unwind()
                            .await
                        {
                            Ok(result) => result,
                            Err(panic) => Err(GatewayError::Internal(panic_message(panic))),
                        }
                    }
                },
                |_, _| {
                    self.metrics.increment_retries();
                    trace_state(request, DispatchState::Retrying);
                },
            )
            .await;

        match outcome.result {
            Ok(receipt) => {
                let prefix = format!("{}-", request.gateway.id_prefix());
                let transaction_id = if receipt.transaction_id.starts_with(&prefix) {
                    receipt.transaction_id
                } else {
                    format!("{}{}", prefix, receipt.transaction_id)
                };
                PaymentResult::approved(
                    request,
                    transaction_id,
                    receipt.receipt_reference,
                    Some(receipt.payload),
                    outcome.attempts,
                )
            }
            Err(e) => {
                error!(
                    "Order {} failed on {} after {} attempt(s): {}",
                    request.order_id, request.gateway, outcome.attempts, e
                );
                PaymentResult::failed(request, e.failure_kind(), e.to_string(), outcome.attempts)
            }
        }
    }

    fn finish(&self, result: PaymentResult) -> PaymentResult {
        if result.is_success() {
            self.metrics.increment_approved();
            info!(
                "Order {} approved on {}: {}",
                result.order_id,
                result.gateway,
                result.transaction_id().unwrap_or_default()
            );
        } else {
            self.metrics.increment_failed();
        }

        let state = if result.is_success() {
            DispatchState::Succeeded
        } else {
            DispatchState::Failed
        };
        debug!(order_id = %result.order_id, gateway = %result.gateway, state = %state, "dispatch state");
        result
    }

    /// Diagnóstico da tela de configurações; não interfere nos pagamentos.
    pub async fn test_connection(&self, gateway: &Gateway) -> bool {
        let handler = match gateway.route() {
            Route::Local => {
                self.notifier
                    .notify(Notification::success("Pagamento em dinheiro não requer conexão"));
                return true;
            }
            Route::Unsupported => {
                self.notifier
                    .notify(Notification::error(format!("Gateway não suportado: {}", gateway)));
                return false;
            }
            Route::Handler(_) => self.handlers.get(gateway).cloned(),
        };

        let (handler, api_key) = match (handler, self.credentials.api_key(gateway)) {
            (Some(handler), Some(api_key)) => (handler, api_key),
            _ => {
                self.notifier.notify(Notification::error(format!(
                    "Configure a chave de API de {} antes de testar",
                    gateway
                )));
                return false;
            }
        };

        let ctx = ProbeContext {
            api_key: Some(api_key),
        };
        let probe = AssertUnwindSafe(handler.probe(&ctx)).catch_unwind();
        let outcome = match timeout(self.policy.attempt_timeout, probe).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(GatewayError::Internal(panic_message(panic))),
            Err(_) => Err(GatewayError::Timeout(self.policy.attempt_timeout)),
        };

        match outcome {
            Ok(()) => {
                info!("Connection test succeeded for {}", gateway);
                self.notifier.notify(Notification::success(format!(
                    "Conexão com {} testada com sucesso",
                    gateway
                )));
                true
            }
            Err(e) => {
                warn!("Connection test failed for {}: {}", gateway, e);
                self.notifier.notify(Notification::error(format!(
                    "Falha ao conectar com {}: {}",
                    gateway, e
                )));
                false
            }
        }
    }

    pub async fn test_all_connections(&self) -> BTreeMap<Gateway, bool> {
        let gateways: Vec<Gateway> = self.configured_gateways().into_iter().collect();
        let results = join_all(gateways.iter().map(|gateway| self.test_connection(gateway))).await;
        gateways.into_iter().zip(results).collect()
    }

    /// A persistência é síncrona (arquivo), então roda fora dos workers do runtime.
    pub async fn set_api_key(&self, gateway: &Gateway, key: &str) -> Result<(), CredentialError> {
        let credentials = self.credentials.clone();
        let gateway = gateway.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || credentials.set_api_key(&gateway, &key)).await?
    }

    pub fn configured_gateways(&self) -> BTreeSet<Gateway> {
        self.credentials.configured()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn ledger_size(&self) -> usize {
        self.ledger.as_ref().map_or(0, IdempotencyLedger::len)
    }

    pub fn purge_expired_approvals(&self) -> usize {
        let removed = self
            .ledger
            .as_ref()
            .map_or(0, IdempotencyLedger::purge_expired);
        if removed > 0 {
            debug!("Purged {} expired approval(s) from the idempotency ledger", removed);
        }
        removed
    }
}
