//! HTTP exchange rate providers.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::Value;
use std::{str::FromStr as _, time::Instant};
use thiserror::Error;
use tracing::{info, trace};
use ureq::tls::{TlsConfig, TlsProvider};
use ureq::Agent;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("No exchange rate from {from} to {to} on {date}")]
    NoData {
        from: String,
        to: String,
        date: NaiveDate,
    },

    #[error("Bad request: `{0}`")]
    BadRequest(String),

    #[error("HTTP request failed: `{0}`")]
    Http(String, #[source] ureq::Error),

    #[error("{0} only converts to {1}, not {2}")]
    UnsupportedTarget(&'static str, &'static str, String),

    #[error("Unreadable exchange rate `{0}`")]
    InvalidNumber(String),
}

/// A source of historical exchange rates.
pub trait RateProvider {
    /// Name used in configuration files and cache file names.
    fn name(&self) -> &str;

    /// How many `to` units one `from` unit was worth on `date`.
    fn fetch_rate(&self, from: &str, to: &str, date: NaiveDate) -> Result<Decimal, ProviderError>;
}

pub(crate) fn agent() -> Agent {
    Agent::from(
        Agent::config_builder()
            .tls_config(
                TlsConfig::builder()
                    .provider(TlsProvider::NativeTls)
                    .build(),
            )
            .build(),
    )
}

/// GET a JSON document. `Ok(None)` when the server has nothing at that URL.
pub(crate) fn get_json(agent: &Agent, url: &str) -> Result<Option<Value>, ProviderError> {
    info!("Fetching `{url}`");

    let start = Instant::now();
    let mut resp = match agent.get(url).call() {
        Ok(resp) => resp,
        Err(ureq::Error::StatusCode(400)) => return Err(ProviderError::BadRequest(url.to_string())),
        Err(ureq::Error::StatusCode(404)) => return Ok(None),
        Err(err) => return Err(ProviderError::Http(url.to_string(), err)),
    };
    let json: Value = resp
        .body_mut()
        .read_json()
        .map_err(|err| ProviderError::Http(url.to_string(), err))?;
    let dur = start.elapsed();

    info!("`{url}` received in {dur:?}");
    trace!("{json:#?}");

    Ok(Some(json))
}

/// JSON numbers are read through their text so no binary float rounding leaks in.
pub(crate) fn decimal_from_json(value: &Value) -> Result<Option<Decimal>, ProviderError> {
    let text = match value {
        Value::Number(number) => number.to_string(),
        Value::String(s) => s.clone(),
        Value::Null => return Ok(None),
        other => return Err(ProviderError::InvalidNumber(other.to_string())),
    };

    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map(Some)
        .map_err(|_| ProviderError::InvalidNumber(text))
}

/// `GET {base}/{date}?base={FROM}`, reading `rates[TO]`.
pub struct ExchangeRatesApi {
    agent: Agent,
    base_url: String,
}

impl ExchangeRatesApi {
    pub const NAME: &'static str = "exchangeratesapi";
    pub const BASE_URL: &'static str = "https://exchangeratesapi.io/api";

    pub fn new() -> Self {
        Self::with_base_url(Self::BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            agent: agent(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub(crate) fn url(&self, from: &str, date: NaiveDate) -> String {
        format!("{}/{date}?base={from}", self.base_url)
    }

    pub(crate) fn read_rate(json: &Value, to: &str) -> Result<Option<Decimal>, ProviderError> {
        match json.get("rates").and_then(|rates| rates.get(to.to_uppercase())) {
            Some(rate) => decimal_from_json(rate),
            None => Ok(None),
        }
    }
}

impl Default for ExchangeRatesApi {
    fn default() -> Self {
        Self::new()
    }
}

impl RateProvider for ExchangeRatesApi {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn fetch_rate(&self, from: &str, to: &str, date: NaiveDate) -> Result<Decimal, ProviderError> {
        let no_data = || ProviderError::NoData {
            from: from.to_string(),
            to: to.to_string(),
            date,
        };

        let json = get_json(&self.agent, &self.url(from, date))?.ok_or_else(no_data)?;

        Self::read_rate(&json, to)?.ok_or_else(no_data)
    }
}

/// Narodowy Bank Polski table A mid rates. Only converts to PLN.
///
/// The rate applied to a transaction is the one published on the previous day.
pub struct Nbp {
    agent: Agent,
    base_url: String,
}

impl Nbp {
    pub const NAME: &'static str = "nbp";
    pub const BASE_URL: &'static str = "https://api.nbp.pl/api";
    const TARGET: &'static str = "PLN";

    pub fn new() -> Self {
        Self::with_base_url(Self::BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            agent: agent(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub(crate) fn url(&self, from: &str, date: NaiveDate) -> String {
        let previous = date.pred_opt().unwrap_or(date);

        format!(
            "{}/exchangerates/rates/a/{}/{previous}/?format=json",
            self.base_url,
            from.to_lowercase()
        )
    }

    pub(crate) fn read_rate(json: &Value) -> Result<Option<Decimal>, ProviderError> {
        match json
            .get("rates")
            .and_then(|rates| rates.get(0))
            .and_then(|rate| rate.get("mid"))
        {
            Some(mid) => decimal_from_json(mid),
            None => Ok(None),
        }
    }
}

impl Default for Nbp {
    fn default() -> Self {
        Self::new()
    }
}

impl RateProvider for Nbp {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn fetch_rate(&self, from: &str, to: &str, date: NaiveDate) -> Result<Decimal, ProviderError> {
        if !to.eq_ignore_ascii_case(Self::TARGET) {
            return Err(ProviderError::UnsupportedTarget(
                Self::NAME,
                Self::TARGET,
                to.to_string(),
            ));
        }

        let no_data = || ProviderError::NoData {
            from: from.to_string(),
            to: to.to_string(),
            date,
        };

        let json = get_json(&self.agent, &self.url(from, date))?.ok_or_else(no_data)?;

        Self::read_rate(&json)?.ok_or_else(no_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_exchangeratesapi_request() {
        let provider = ExchangeRatesApi::with_base_url("https://example.com/api/");
        assert_eq!(
            provider.url("USD", date("2018-01-05")),
            "https://example.com/api/2018-01-05?base=USD"
        );

        let body = json!({
            "base": "USD",
            "date": "2018-01-05",
            "rates": { "PLN": 3.4616, "EUR": 0.83 }
        });
        assert_eq!(
            ExchangeRatesApi::read_rate(&body, "pln").unwrap(),
            Some("3.4616".parse().unwrap())
        );
        assert_eq!(ExchangeRatesApi::read_rate(&body, "JPY").unwrap(), None);
    }

    #[test]
    fn test_nbp_request() {
        let provider = Nbp::new();
        assert_eq!(
            provider.url("USD", date("2018-03-01")),
            "https://api.nbp.pl/api/exchangerates/rates/a/usd/2018-02-28/?format=json"
        );

        let body = json!({
            "table": "A",
            "code": "USD",
            "rates": [{ "no": "041/A/NBP/2018", "effectiveDate": "2018-02-28", "mid": 3.4188 }]
        });
        assert_eq!(Nbp::read_rate(&body).unwrap(), Some("3.4188".parse().unwrap()));
        assert_eq!(Nbp::read_rate(&json!({ "rates": [] })).unwrap(), None);
    }

    #[test]
    fn test_nbp_only_converts_to_pln() {
        let err = Nbp::new()
            .fetch_rate("USD", "EUR", date("2018-03-01"))
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnsupportedTarget("nbp", "PLN", _)));
    }

    #[test]
    fn test_unreadable_rate() {
        let body = json!({ "rates": { "PLN": "abc" } });
        assert!(matches!(
            ExchangeRatesApi::read_rate(&body, "PLN"),
            Err(ProviderError::InvalidNumber(_))
        ));
    }
}
