//! Restating fiat legs in the reporting currency.

use self::cache::{CacheError, RateCache};
use self::provider::{ExchangeRatesApi, Nbp, ProviderError, RateProvider};
use crate::model::{ConvertedAmounts, Currency, Transaction, TxType};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod cache;
pub mod provider;

pub const DEFAULT_PROVIDER: &str = ExchangeRatesApi::NAME;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("No exchange rate from {from} to {to} on {date}")]
    RateNotFound {
        from: Currency,
        to: Currency,
        date: NaiveDate,
    },

    #[error("Exchange rate request failed for {from} to {to} on {date}")]
    ProviderRequest {
        from: Currency,
        to: Currency,
        date: NaiveDate,
        #[source]
        source: ProviderError,
    },

    #[error("Amount to convert must be positive, got {0}")]
    InvalidAmount(Decimal),

    #[error("`{0}` is not a fiat currency")]
    NotFiat(Currency),

    #[error("Provider returned rate {rate} from {from} to {to} on {date}")]
    InvalidRate {
        from: Currency,
        to: Currency,
        date: NaiveDate,
        rate: Decimal,
    },

    #[error("Unknown currency converter `{0}`")]
    UnknownProvider(String),

    #[error("Unable to convert {0}")]
    Transaction(String, #[source] Box<ConvertError>),

    #[error("Rate cache error")]
    Cache(#[from] CacheError),
}

type ProviderCtor = Box<dyn Fn() -> Box<dyn RateProvider>>;

/// Rate providers by name.
pub struct ProviderRegistry {
    providers: BTreeMap<String, ProviderCtor>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: BTreeMap::new(),
        }
    }

    /// `exchangeratesapi` and `nbp`.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(ExchangeRatesApi::NAME, || Box::new(ExchangeRatesApi::new()));
        registry.register(Nbp::NAME, || Box::new(Nbp::new()));

        registry
    }

    pub fn register<F>(&mut self, name: &str, ctor: F)
    where
        F: Fn() -> Box<dyn RateProvider> + 'static,
    {
        if self.providers.insert(name.to_string(), Box::new(ctor)).is_some() {
            warn!("Currency converter `{name}` registered twice, keeping the last one");
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn RateProvider>, ConvertError> {
        self.providers
            .get(name)
            .map(|ctor| ctor())
            .ok_or_else(|| ConvertError::UnknownProvider(name.to_string()))
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn fiat_code(currency: &Currency) -> Result<&str, ConvertError> {
    match currency.code() {
        Some(code) if currency.is_fiat() => Ok(code),
        _ => Err(ConvertError::NotFiat(currency.clone())),
    }
}

/// Converts fiat amounts through a rate provider, remembering every rate in a [`RateCache`].
pub struct CurrencyConverter {
    provider: Box<dyn RateProvider>,
    cache: RateCache,
    target: Currency,
    cache_hits: usize,
    fetched: usize,
    finalized: bool,
}

impl CurrencyConverter {
    pub fn new(
        provider: Box<dyn RateProvider>,
        cache: RateCache,
        target: Currency,
    ) -> Result<Self, ConvertError> {
        fiat_code(&target)?;

        Ok(Self {
            provider,
            cache,
            target,
            cache_hits: 0,
            fetched: 0,
            finalized: false,
        })
    }

    pub fn target(&self) -> &Currency {
        &self.target
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// The rate from `from` to `to` on `date`, applicable to `amount`.
    ///
    /// Cached rates are returned without asking the provider. New rates are validated and cached.
    pub fn convert(
        &mut self,
        amount: Decimal,
        from: &Currency,
        to: &Currency,
        date: NaiveDate,
    ) -> Result<Decimal, ConvertError> {
        if amount <= Decimal::ZERO {
            return Err(ConvertError::InvalidAmount(amount));
        }
        let from_code = fiat_code(from)?;
        let to_code = fiat_code(to)?;

        if let Some(rate) = self.cache.get(from_code, to_code, date) {
            self.cache_hits += 1;
            return Ok(rate);
        }

        let rate = self
            .provider
            .fetch_rate(from_code, to_code, date)
            .map_err(|err| match err {
                ProviderError::NoData { .. } => ConvertError::RateNotFound {
                    from: from.clone(),
                    to: to.clone(),
                    date,
                },
                source => ConvertError::ProviderRequest {
                    from: from.clone(),
                    to: to.clone(),
                    date,
                    source,
                },
            })?;
        self.fetched += 1;

        if rate <= Decimal::ZERO {
            return Err(ConvertError::InvalidRate {
                from: from.clone(),
                to: to.clone(),
                date,
                rate,
            });
        }
        self.cache.insert(from_code, to_code, date, rate);

        Ok(rate)
    }

    /// Fill in the converted amounts of every purchase and sale whose fiat leg is not already in
    /// the target currency.
    ///
    /// Swaps and transactions in the target currency are left alone. A fiat leg without any
    /// currency converts to zero with no rate.
    pub fn process_transactions(&mut self, ledger: &mut [Transaction]) -> Result<(), ConvertError> {
        let target = self.target.clone();
        let mut converted = 0;

        for tx in ledger.iter_mut() {
            let tx_type = tx.tx_type();
            let Some(fiat) = tx.legs().fiat_currency().cloned() else {
                continue;
            };
            if tx_type == TxType::Swap || fiat == target {
                continue;
            }

            let amount = tx.legs().fiat_amount();
            let (converted_amount, exchange_rate) = if fiat.is_no_fiat() || amount.is_zero() {
                (Decimal::ZERO, None)
            } else {
                let date = tx.time().date_naive();
                let rate = self
                    .convert(amount, &fiat, &target, date)
                    .map_err(|err| ConvertError::Transaction(tx.to_string(), Box::new(err)))?;

                (amount * rate, Some(rate))
            };

            // A leg without a currency stays without one.
            let converted_currency = if fiat.is_no_fiat() {
                fiat.clone()
            } else {
                target.clone()
            };
            let mut legs = tx.legs().clone();
            match tx_type {
                TxType::Purchase => {
                    legs.sold_currency = converted_currency;
                    legs.sold_amount = converted_amount;
                }
                _ => {
                    legs.bought_currency = converted_currency;
                    legs.bought_amount = converted_amount;
                }
            }

            debug!(
                "Converted {tx}: {amount} {fiat} at {} = {converted_amount} {}",
                exchange_rate.map(|rate| rate.to_string()).unwrap_or_default(),
                self.target,
            );
            tx.set_converted(ConvertedAmounts {
                legs,
                exchange_rate,
            });
            converted += 1;
        }

        info!(
            "Converted {converted} transactions to {} with {}: {} cached rates, {} fetched",
            self.target,
            self.provider.name(),
            self.cache_hits,
            self.fetched,
        );

        Ok(())
    }

    /// Persist the rate cache. Only the first call writes.
    pub fn finalize(&mut self) -> Result<(), ConvertError> {
        if self.finalized {
            debug!("Rate cache already saved");
            return Ok(());
        }
        self.finalized = true;
        self.cache.save()?;

        Ok(())
    }

    pub fn cache(&self) -> &RateCache {
        &self.cache
    }
}

impl fmt::Debug for CurrencyConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CurrencyConverter")
            .field("provider", &self.provider.name())
            .field("cache", &self.cache)
            .field("target", &self.target)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::assemble;
    use crate::model::transaction::tests::{dec, purchase, sale, time};
    use std::cell::Cell;
    use std::rc::Rc;
    use tracing_test::traced_test;

    /// Answers every request with the same rate and counts the calls.
    struct MockProvider {
        rate: Option<Decimal>,
        calls: Rc<Cell<usize>>,
    }

    impl RateProvider for MockProvider {
        fn name(&self) -> &str {
            "mock"
        }

        fn fetch_rate(
            &self,
            from: &str,
            to: &str,
            date: NaiveDate,
        ) -> Result<Decimal, ProviderError> {
            self.calls.set(self.calls.get() + 1);

            self.rate.ok_or_else(|| ProviderError::NoData {
                from: from.to_string(),
                to: to.to_string(),
                date,
            })
        }
    }

    fn mock_converter(rate: Option<&str>, target: &str) -> (CurrencyConverter, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        let provider = MockProvider {
            rate: rate.map(dec),
            calls: calls.clone(),
        };
        let converter =
            CurrencyConverter::new(Box::new(provider), RateCache::in_memory(), Currency::fiat(target))
                .unwrap();

        (converter, calls)
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_convert_is_idempotent() {
        let (mut converter, calls) = mock_converter(Some("3.5"), "PLN");
        let usd = Currency::fiat("USD");
        let pln = Currency::fiat("PLN");

        let first = converter.convert(dec("100"), &usd, &pln, date("2018-01-05")).unwrap();
        let second = converter.convert(dec("7"), &usd, &pln, date("2018-01-05")).unwrap();
        assert_eq!(first, dec("3.5"));
        assert_eq!(first, second);
        assert_eq!(calls.get(), 1);

        converter.convert(dec("7"), &usd, &pln, date("2018-01-06")).unwrap();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_convert_validates_input() {
        let (mut converter, calls) = mock_converter(Some("3.5"), "PLN");
        let usd = Currency::fiat("USD");
        let pln = Currency::fiat("PLN");

        assert!(matches!(
            converter.convert(dec("0"), &usd, &pln, date("2018-01-05")),
            Err(ConvertError::InvalidAmount(_))
        ));
        assert!(matches!(
            converter.convert(dec("1"), &Currency::crypto("BTC"), &pln, date("2018-01-05")),
            Err(ConvertError::NotFiat(_))
        ));
        assert!(matches!(
            converter.convert(dec("1"), &Currency::no_fiat(), &pln, date("2018-01-05")),
            Err(ConvertError::NotFiat(_))
        ));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_provider_failures() {
        let (mut converter, _) = mock_converter(None, "PLN");
        assert!(matches!(
            converter.convert(
                dec("1"),
                &Currency::fiat("USD"),
                &Currency::fiat("PLN"),
                date("2018-01-05")
            ),
            Err(ConvertError::RateNotFound { .. })
        ));

        let (mut converter, _) = mock_converter(Some("0"), "PLN");
        assert!(matches!(
            converter.convert(
                dec("1"),
                &Currency::fiat("USD"),
                &Currency::fiat("PLN"),
                date("2018-01-05")
            ),
            Err(ConvertError::InvalidRate { .. })
        ));
        assert!(converter.cache().is_empty());
    }

    #[test]
    fn test_target_in_reporting_currency_is_not_converted() {
        let (mut converter, calls) = mock_converter(Some("4"), "USD");
        let mut ledger = assemble([vec![
            purchase("2018-01-01T00:00:00Z", "1", "10000"),
            purchase("2018-01-02T00:00:00Z", "1", "11000"),
        ]]);

        converter.process_transactions(&mut ledger).unwrap();

        assert!(ledger.iter().all(|tx| tx.converted().is_none()));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    #[traced_test]
    fn test_process_transactions() {
        let _ = tracing_log::LogTracer::init();

        let (mut converter, calls) = mock_converter(Some("4"), "PLN");
        let reward = Transaction::new(
            "test",
            time("2018-01-02T00:00:00Z"),
            Currency::crypto("NANO"),
            dec("5"),
            Currency::no_fiat(),
            dec("0"),
        )
        .unwrap();
        let swap = Transaction::new(
            "test",
            time("2018-01-03T00:00:00Z"),
            Currency::crypto("ETH"),
            dec("10"),
            Currency::crypto("BTC"),
            dec("0.5"),
        )
        .unwrap();
        let mut ledger = assemble([vec![
            purchase("2018-01-01T00:00:00Z", "1", "10000"),
            reward,
            swap,
            sale("2018-01-01T12:00:00Z", "0.5", "6000"),
        ]]);

        converter.process_transactions(&mut ledger).unwrap();

        // Both USD transactions fall on the same day.
        assert_eq!(calls.get(), 1);

        let bought = ledger[0].converted().unwrap();
        assert_eq!(bought.legs.sold_currency, Currency::fiat("PLN"));
        assert_eq!(bought.legs.sold_amount, dec("40000"));
        assert_eq!(bought.legs.bought_amount, dec("1"));
        assert_eq!(bought.exchange_rate, Some(dec("4")));

        let sold = ledger[1].converted().unwrap();
        assert_eq!(sold.legs.bought_currency, Currency::fiat("PLN"));
        assert_eq!(sold.legs.bought_amount, dec("24000"));

        let reward = ledger[2].converted().unwrap();
        assert_eq!(reward.legs.sold_amount, Decimal::ZERO);
        assert!(reward.legs.sold_currency.is_no_fiat());
        assert_eq!(reward.legs.price(), None);
        assert_eq!(reward.exchange_rate, None);

        assert!(ledger[3].converted().is_none());
        assert!(logs_contain("1 cached rates, 1 fetched"));
    }

    #[test]
    fn test_conversion_error_names_the_transaction() {
        let (mut converter, _) = mock_converter(None, "PLN");
        let mut ledger = assemble([vec![purchase("2018-01-01T00:00:00Z", "1", "10000")]]);

        let err = converter.process_transactions(&mut ledger).unwrap_err();
        match err {
            ConvertError::Transaction(tx, source) => {
                assert!(tx.starts_with("#1 test"));
                assert!(matches!(*source, ConvertError::RateNotFound { .. }));
            }
            err => panic!("Unexpected error: {err:?}"),
        }
    }

    #[test]
    fn test_registry() {
        let registry = ProviderRegistry::with_builtin();
        assert_eq!(registry.names().collect::<Vec<_>>(), ["exchangeratesapi", "nbp"]);
        assert_eq!(registry.create("nbp").unwrap().name(), "nbp");
        assert!(matches!(
            registry.create("fixer"),
            Err(ConvertError::UnknownProvider(_))
        ));
    }

    #[test]
    fn test_finalize_writes_once() {
        let path = std::env::temp_dir()
            .join(format!("coincount-convert-{}", std::process::id()))
            .join("mock.json");
        let calls = Rc::new(Cell::new(0));
        let provider = MockProvider {
            rate: Some(dec("4")),
            calls,
        };
        let mut converter = CurrencyConverter::new(
            Box::new(provider),
            RateCache::load(&path).unwrap(),
            Currency::fiat("PLN"),
        )
        .unwrap();

        converter
            .convert(dec("1"), &Currency::fiat("USD"), &Currency::fiat("PLN"), date("2018-01-05"))
            .unwrap();
        converter.finalize().unwrap();
        std::fs::remove_file(&path).unwrap();

        // The second call must not write the file again.
        converter.finalize().unwrap();
        assert!(!path.exists());
    }
}
