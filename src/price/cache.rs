//! Crypto prices learned in earlier runs.
//!
//! The file is a JSON object keyed by coin code, each holding an object from Unix timestamp (in
//! seconds) to price.

use crate::convert::cache::{save_json, CacheError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

type PriceMap = BTreeMap<String, BTreeMap<i64, Decimal>>;

#[derive(Debug, Default)]
pub struct PriceCache {
    path: Option<PathBuf>,
    prices: PriceMap,
}

impl PriceCache {
    /// Cache file for a price series, e.g. `prices-cryptowatch-kraken-usd.json`.
    pub fn file_name(provider: &str) -> String {
        format!("prices-{provider}.json")
    }

    /// A cache that is never persisted.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Read the cache file. A missing file is an empty cache.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let path = path.into();

        let prices = if path.exists() {
            let prices: PriceMap = serde_json::from_str(&fs::read_to_string(&path)?)?;
            info!(
                "Loaded {} cached prices from {path:?}",
                prices.values().map(BTreeMap::len).sum::<usize>()
            );

            prices
        } else {
            debug!("No price cache at {path:?}");
            PriceMap::new()
        };

        Ok(Self {
            path: Some(path),
            prices,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, coin: &str, time: DateTime<Utc>) -> Option<Decimal> {
        self.prices
            .get(&coin.to_uppercase())
            .and_then(|times| times.get(&time.timestamp()))
            .copied()
    }

    /// Store a price. An existing entry is never replaced.
    pub fn insert(&mut self, coin: &str, time: DateTime<Utc>, price: Decimal) {
        let coin = coin.to_uppercase();
        let times = self.prices.entry(coin.clone()).or_default();

        match times.get(&time.timestamp()) {
            Some(existing) if *existing != price => {
                warn!("Keeping cached {coin} price {existing} at {time}, ignoring {price}");
            }
            Some(_) => (),
            None => {
                times.insert(time.timestamp(), price);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.prices.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn save(&self) -> Result<(), CacheError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        save_json(path, &self.prices)?;
        info!("Saved {} prices to {path:?}", self.len());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::transaction::tests::{dec, time};

    fn utc(s: &str) -> DateTime<Utc> {
        time(s).with_timezone(&Utc)
    }

    #[test]
    fn test_save_and_reload() {
        let path = std::env::temp_dir()
            .join(format!("coincount-prices-{}", std::process::id()))
            .join(PriceCache::file_name("mock"));
        let mut cache = PriceCache::load(&path).unwrap();
        assert!(cache.is_empty());

        cache.insert("btc", utc("2018-02-01T12:00:00Z"), dec("9050.5"));
        cache.insert("BTC", utc("2018-02-01T12:00:00Z"), dec("1"));
        cache.insert("ETH", utc("2018-02-01T12:00:00Z"), dec("1030"));
        cache.save().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"1517486400\""));

        let reloaded = PriceCache::load(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(reloaded.len(), 2);
        assert_eq!(
            reloaded.get("BTC", utc("2018-02-01T12:00:00Z")),
            Some(dec("9050.5"))
        );
        assert_eq!(reloaded.get("BTC", utc("2018-02-01T12:00:01Z")), None);
    }
}
