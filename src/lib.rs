pub mod app;
pub mod handlers;
pub mod models;
pub mod services;
pub mod utils;

pub use models::{Gateway, PaymentRequest, PaymentResult};
pub use services::PaymentGateway;
