use serde::{Deserialize, Serialize};
use std::{fmt, rc::Rc, str::FromStr};
use thiserror::Error;

/// ISO 4217 codes that the importers classify as fiat without further context.
const FIAT_CODES: &[&str] = &[
    "AUD", "BRL", "CAD", "CHF", "CNY", "CZK", "DKK", "EUR", "GBP", "HKD", "HUF", "INR", "JPY",
    "KRW", "MXN", "NOK", "NZD", "PLN", "RUB", "SEK", "SGD", "TRY", "UAH", "USD", "ZAR",
];

/// Renamed tickers. The key is the legacy code found in old exports.
const CRYPTO_ALIASES: &[(&str, &str)] = &[("XRB", "NANO")];

#[derive(Debug, Error)]
pub enum CurrencyError {
    #[error("Currency code `{0}` is not a known fiat currency")]
    NotFiat(String),

    #[error("Empty currency code")]
    Empty,
}

#[derive(Copy, Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum CurrencyKind {
    Fiat,
    Crypto,
}

/// An asset identified by its ticker code.
///
/// A fiat currency without a code stands for "no fiat leg at all", which is how airdrops and
/// staking rewards are recorded. Equality is by `(kind, code)`.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Currency {
    kind: CurrencyKind,
    code: Option<Rc<str>>,
}

impl Currency {
    pub fn fiat(code: &str) -> Self {
        Self {
            kind: CurrencyKind::Fiat,
            code: Some(Rc::from(code.trim().to_uppercase())),
        }
    }

    pub fn crypto(code: &str) -> Self {
        let code = code.trim().to_uppercase();
        let code = CRYPTO_ALIASES
            .iter()
            .find_map(|(old, new)| (*old == code).then_some(*new))
            .map(str::to_string)
            .unwrap_or(code);

        Self {
            kind: CurrencyKind::Crypto,
            code: Some(Rc::from(code)),
        }
    }

    /// The fiat side of a transaction that had no fiat counterpart.
    pub fn no_fiat() -> Self {
        Self {
            kind: CurrencyKind::Fiat,
            code: None,
        }
    }

    /// Classify a bare ticker. Empty input is the "no fiat" currency.
    pub fn classify(code: &str) -> Self {
        let code = code.trim();

        if code.is_empty() || code == "–" || code == "-" {
            Self::no_fiat()
        } else if is_fiat_code(code) {
            Self::fiat(code)
        } else {
            Self::crypto(code)
        }
    }

    pub fn kind(&self) -> CurrencyKind {
        self.kind
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn is_fiat(&self) -> bool {
        self.kind == CurrencyKind::Fiat
    }

    pub fn is_crypto(&self) -> bool {
        self.kind == CurrencyKind::Crypto
    }

    /// True for the code-less fiat placeholder.
    pub fn is_no_fiat(&self) -> bool {
        self.is_fiat() && self.code.is_none()
    }
}

pub(crate) fn is_fiat_code(code: &str) -> bool {
    let code = code.to_uppercase();

    FIAT_CODES.contains(&code.as_str())
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code().unwrap_or("–"))
    }
}

/// Parses a reporting currency. Only fiat codes are accepted.
impl FromStr for Currency {
    type Err = CurrencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            Err(CurrencyError::Empty)
        } else if is_fiat_code(s) {
            Ok(Self::fiat(s))
        } else {
            Err(CurrencyError::NotFiat(s.to_string()))
        }
    }
}
