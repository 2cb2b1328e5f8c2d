// Utilitários para manipulação de valores monetários (centavos, nunca float)

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,
    #[error("invalid amount: {0}")]
    Invalid(String),
    #[error("amount has more than two decimal places: {0}")]
    TooPrecise(String),
    #[error("amount out of range: {0}")]
    OutOfRange(String),
}

/// Valor monetário em centavos. Pode ser negativo para que a validação
/// aconteça no dispatch e não no parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn from_cents(cents: i64) -> Self {
        Amount(cents)
    }

    pub fn cents(self) -> i64 {
        self.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Accepts `25.50`, `25,50`, `25.5`, `25` and an optional `R$` prefix.
    pub fn parse(input: &str) -> Result<Self, AmountError> {
        let cleaned = input.trim().trim_start_matches("R$").trim();
        if cleaned.is_empty() {
            return Err(AmountError::Empty);
        }

        let (negative, digits) = match cleaned.strip_prefix('-') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, cleaned),
        };

        let normalized = digits.replace(',', ".");
        let mut parts = normalized.splitn(2, '.');
        let whole = parts.next().unwrap_or_default();
        let fraction = parts.next().unwrap_or_default();

        if whole.is_empty() && fraction.is_empty() {
            return Err(AmountError::Invalid(input.to_string()));
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit()) {
            return Err(AmountError::Invalid(input.to_string()));
        }
        if fraction.len() > 2 {
            return Err(AmountError::TooPrecise(input.to_string()));
        }

        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|_| AmountError::OutOfRange(input.to_string()))?
        };
        let fraction: i64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().unwrap_or(0) * 10,
            _ => fraction.parse::<i64>().unwrap_or(0),
        };

        let cents = whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(fraction))
            .ok_or_else(|| AmountError::OutOfRange(input.to_string()))?;

        Ok(Amount(if negative { -cents } else { cents }))
    }

    /// JSON numbers chegam como f64; arredonda para o centavo mais próximo.
    pub fn from_decimal(value: f64) -> Result<Self, AmountError> {
        if !value.is_finite() {
            return Err(AmountError::Invalid(value.to_string()));
        }
        let cents = (value * 100.0).round();
        if cents.abs() > i64::MAX as f64 {
            return Err(AmountError::OutOfRange(value.to_string()));
        }
        Ok(Amount(cents as i64))
    }

    pub fn to_decimal_string(self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        format!("{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_currency(*self))
    }
}

pub fn format_currency(amount: Amount) -> String {
    let sign = if amount.0 < 0 { "-" } else { "" };
    let abs = amount.0.unsigned_abs();
    format!("{}R$ {},{:02}", sign, abs / 100, abs % 100)
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_decimal_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AmountVisitor;

        impl<'de> de::Visitor<'de> for AmountVisitor {
            type Value = Amount;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a decimal amount as number or string")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
                v.checked_mul(100)
                    .map(Amount)
                    .ok_or_else(|| E::custom(AmountError::OutOfRange(v.to_string())))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
                i64::try_from(v)
                    .ok()
                    .and_then(|v| v.checked_mul(100))
                    .map(Amount)
                    .ok_or_else(|| E::custom(AmountError::OutOfRange(v.to_string())))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Amount, E> {
                Amount::from_decimal(v).map_err(E::custom)
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
                Amount::parse(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_decimal_strings() {
        assert_eq!(Amount::parse("25.50").unwrap().cents(), 2550);
        assert_eq!(Amount::parse("25,5").unwrap().cents(), 2550);
        assert_eq!(Amount::parse("R$ 10").unwrap().cents(), 1000);
        assert_eq!(Amount::parse(".99").unwrap().cents(), 99);
        assert_eq!(Amount::parse("-3.10").unwrap().cents(), -310);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(Amount::parse("  "), Err(AmountError::Empty));
        assert!(matches!(Amount::parse("12.345"), Err(AmountError::TooPrecise(_))));
        assert!(matches!(Amount::parse("1a.00"), Err(AmountError::Invalid(_))));
        assert!(matches!(Amount::parse("."), Err(AmountError::Invalid(_))));
    }

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(Amount::from_cents(1000)), "R$ 10,00");
        assert_eq!(format_currency(Amount::from_cents(2550)), "R$ 25,50");
        assert_eq!(format_currency(Amount::from_cents(-5)), "-R$ 0,05");
    }

    #[test]
    fn test_json_number_rounds_to_cents() {
        let amount: Amount = serde_json::from_str("25.50").unwrap();
        assert_eq!(amount.cents(), 2550);
        let amount: Amount = serde_json::from_str("0.1").unwrap();
        assert_eq!(amount.cents(), 10);
        let amount: Amount = serde_json::from_str("7").unwrap();
        assert_eq!(amount.cents(), 700);
        let amount: Amount = serde_json::from_str("\"19,90\"").unwrap();
        assert_eq!(amount.cents(), 1990);
    }

    proptest! {
        #[test]
        fn float_input_lands_on_the_intended_cent(cents in -10_000_000i64..10_000_000i64) {
            let value = cents as f64 / 100.0;
            prop_assert_eq!(Amount::from_decimal(value).unwrap().cents(), cents);
        }
    }
}
