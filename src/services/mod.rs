pub mod atomic_metrics;
pub mod credential_store;
pub mod dispatch_policy;
pub mod gateways;
pub mod idempotency;
pub mod notifier;
pub mod payment_gateway;

pub use credential_store::{CredentialError, CredentialStore, JsonFileStore, KeyValueStore, MemoryStore};
pub use dispatch_policy::{DispatchPolicy, RetryPolicy};
pub use notifier::{ChannelNotifier, Notification, Notifier, TracingNotifier};
pub use payment_gateway::{DispatchState, PaymentGateway, PaymentGatewayBuilder};
