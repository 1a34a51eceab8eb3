//! Historical prices from the Cryptowatch OHLC API.

use super::PriceProvider;
use crate::convert::provider::{agent, decimal_from_json, get_json, ProviderError};
use crate::model::Currency;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use ureq::Agent;

/// Candle width in seconds.
const PERIOD: i64 = 60;

/// `GET {base}/markets/{exchange}/{coin}{currency}/ohlc`, reading one-minute candles.
///
/// Each candle is `[close_time, open, high, low, close, volume, quote_volume]`. The price at a
/// given second is the open of the first candle closing at or after it.
pub struct Cryptowatch {
    agent: Agent,
    base_url: String,
    exchange: String,
    currency: Currency,
    name: String,
}

impl Cryptowatch {
    pub const NAME: &'static str = "cryptowatch";
    pub const BASE_URL: &'static str = "https://api.cryptowat.ch";
    pub const DEFAULT_EXCHANGE: &'static str = "kraken";
    pub const DEFAULT_CURRENCY: &'static str = "USD";

    pub fn new(exchange: &str, currency: Currency) -> Self {
        Self::with_base_url(Self::BASE_URL, exchange, currency)
    }

    pub fn with_base_url(base_url: &str, exchange: &str, currency: Currency) -> Self {
        let exchange = exchange.to_lowercase();
        let name = format!(
            "{}-{exchange}-{}",
            Self::NAME,
            currency.to_string().to_lowercase()
        );

        Self {
            agent: agent(),
            base_url: base_url.trim_end_matches('/').to_string(),
            exchange,
            currency,
            name,
        }
    }

    pub(crate) fn url(&self, coin: &str, time: DateTime<Utc>) -> String {
        let after = time.timestamp();

        format!(
            "{}/markets/{}/{}{}/ohlc?periods={PERIOD}&after={after}&before={}",
            self.base_url,
            self.exchange,
            coin.to_lowercase(),
            self.currency.to_string().to_lowercase(),
            after + PERIOD,
        )
    }

    pub(crate) fn read_price(
        json: &Value,
        time: DateTime<Utc>,
    ) -> Result<Option<Decimal>, ProviderError> {
        let Some(candles) = json
            .get("result")
            .and_then(|result| result.get(PERIOD.to_string()))
            .and_then(Value::as_array)
        else {
            return Ok(None);
        };

        let timestamp = time.timestamp();
        let candle = candles.iter().find(|candle| {
            candle
                .get(0)
                .and_then(Value::as_i64)
                .is_some_and(|close_time| close_time >= timestamp)
        });

        match candle.and_then(|candle| candle.get(1)) {
            Some(open) => decimal_from_json(open),
            None => Ok(None),
        }
    }
}

impl PriceProvider for Cryptowatch {
    fn name(&self) -> &str {
        &self.name
    }

    fn currency(&self) -> &Currency {
        &self.currency
    }

    fn fetch_price(
        &self,
        coin: &str,
        time: DateTime<Utc>,
    ) -> Result<Option<Decimal>, ProviderError> {
        match get_json(&self.agent, &self.url(coin, time))? {
            Some(json) => Self::read_price(&json, time),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::transaction::tests::{dec, time};
    use serde_json::json;

    #[test]
    fn test_cryptowatch_request() {
        let provider =
            Cryptowatch::with_base_url("https://example.com/", "Bitfinex", Currency::fiat("eur"));
        let when = time("2018-02-01T12:00:30Z").with_timezone(&Utc);

        assert_eq!(provider.name(), "cryptowatch-bitfinex-eur");
        assert_eq!(
            provider.url("ADA", when),
            "https://example.com/markets/bitfinex/adaeur/ohlc?periods=60&after=1517486430&before=1517486490"
        );

        let body = json!({
            "result": {
                "60": [
                    [1517486400, 9010.1, 9020, 9000, 9015, 1.5, 13500],
                    [1517486460, 9015.2, 9030, 9010, 9025, 2.0, 18000]
                ]
            }
        });
        assert_eq!(Cryptowatch::read_price(&body, when).unwrap(), Some(dec("9015.2")));

        let late = time("2018-02-01T13:00:00Z").with_timezone(&Utc);
        assert_eq!(Cryptowatch::read_price(&body, late).unwrap(), None);
        assert_eq!(Cryptowatch::read_price(&json!({ "result": {} }), when).unwrap(), None);
    }
}
