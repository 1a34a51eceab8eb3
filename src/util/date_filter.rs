use crate::model::Transaction;
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DateFilterError {
    #[error("Unable to parse date filter bound `{0}`")]
    Parse(String),
}

/// Date range as written in the configuration file. Bounds are dates (`2017-01-01`) or full
/// timestamps with an offset.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct DateRangeDef {
    #[serde(default)]
    pub since: Option<String>,
    #[serde(default)]
    pub until: Option<String>,
}

/// Inclusive time range for selecting transactions from a source.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DateFilter {
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
}

impl DateFilter {
    /// Accept everything.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn from_def(def: &DateRangeDef) -> Result<Self, DateFilterError> {
        let since = def
            .since
            .as_deref()
            .map(|since| parse_bound(since, false))
            .transpose()?;
        let until = def
            .until
            .as_deref()
            .map(|until| parse_bound(until, true))
            .transpose()?;

        Ok(Self { since, until })
    }

    pub fn includes(&self, tx: &Transaction) -> bool {
        let time = tx.time().with_timezone(&Utc);

        !(self.since.is_some_and(|since| time < since)
            || self.until.is_some_and(|until| time > until))
    }
}

/// A bare date bound is taken in UTC. As an upper bound it covers the whole day.
fn parse_bound(s: &str, end_of_day: bool) -> Result<DateTime<Utc>, DateFilterError> {
    if let Ok(time) = crate::model::parse_time(s) {
        return Ok(time.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| DateFilterError::Parse(s.to_string()))?;
    let start = date.and_time(Default::default()).and_utc();

    if end_of_day {
        Ok(start + TimeDelta::days(1) - TimeDelta::nanoseconds(1))
    } else {
        Ok(start)
    }
}

/// Filter helper for a list of ranges: an empty list accepts everything.
pub(crate) fn any_includes(filters: &[DateFilter], tx: &Transaction) -> bool {
    filters.is_empty() || filters.iter().any(|filter| filter.includes(tx))
}
