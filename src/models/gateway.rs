use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Meios de pagamento conhecidos pelo PDV.
///
/// Nomes desconhecidos viram `Unsupported` em vez de falhar no parse, para que
/// o dispatch possa devolver uma falha estruturada com o nome recebido.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Gateway {
    Stone,
    Getnet,
    Pix,
    MercadoPago,
    PagSeguro,
    Cash,
    Unsupported(String),
}

/// Which handler family serves a gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    Stone,
    Getnet,
    Pix,
    Generic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Settled at the counter, no external call.
    Local,
    Handler(HandlerKind),
    Unsupported,
}

impl Gateway {
    pub const SUPPORTED: [Gateway; 6] = [
        Gateway::Stone,
        Gateway::Getnet,
        Gateway::Pix,
        Gateway::MercadoPago,
        Gateway::PagSeguro,
        Gateway::Cash,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Gateway::Stone => "stone",
            Gateway::Getnet => "getnet",
            Gateway::Pix => "pix",
            Gateway::MercadoPago => "mercadopago",
            Gateway::PagSeguro => "pagseguro",
            Gateway::Cash => "cash",
            Gateway::Unsupported(name) => name,
        }
    }

    // Adicionar um gateway novo obriga a decidir a rota aqui.
    pub fn route(&self) -> Route {
        match self {
            Gateway::Cash => Route::Local,
            Gateway::Stone => Route::Handler(HandlerKind::Stone),
            Gateway::Getnet => Route::Handler(HandlerKind::Getnet),
            Gateway::Pix => Route::Handler(HandlerKind::Pix),
            Gateway::MercadoPago | Gateway::PagSeguro => Route::Handler(HandlerKind::Generic),
            Gateway::Unsupported(_) => Route::Unsupported,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Gateway::Unsupported(_))
    }

    /// Card acquirers accept installments, PIX and cash do not.
    pub fn accepts_installments(&self) -> bool {
        matches!(
            self,
            Gateway::Stone | Gateway::Getnet | Gateway::MercadoPago | Gateway::PagSeguro
        )
    }

    /// Prefix used in transaction ids, e.g. `PIX`.
    pub fn id_prefix(&self) -> String {
        self.as_str().to_uppercase()
    }
}

impl FromStr for Gateway {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Ok(match normalized.as_str() {
            "stone" => Gateway::Stone,
            "getnet" => Gateway::Getnet,
            "pix" => Gateway::Pix,
            "mercadopago" | "mercado_pago" => Gateway::MercadoPago,
            "pagseguro" => Gateway::PagSeguro,
            "cash" | "dinheiro" => Gateway::Cash,
            _ => Gateway::Unsupported(normalized),
        })
    }
}

impl From<String> for Gateway {
    fn from(value: String) -> Self {
        match value.parse::<Gateway>() {
            Ok(gateway) => gateway,
            Err(never) => match never {},
        }
    }
}

impl From<Gateway> for String {
    fn from(value: Gateway) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
