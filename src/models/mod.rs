pub mod gateway;
pub mod payment;

pub use gateway::{Gateway, HandlerKind, Route};
pub use payment::{new_transaction_id, FailureKind, PaymentOutcome, PaymentRequest, PaymentResult};
