pub mod money;

pub use money::{format_currency, Amount, AmountError};
