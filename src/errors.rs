//! Every public error type, in one place.

pub use crate::basis::MatchError;
pub use crate::config::ConfigError;
pub use crate::convert::cache::CacheError;
pub use crate::convert::provider::ProviderError;
pub use crate::convert::ConvertError;
pub use crate::imports::ImportError;
pub use crate::ledger::{BuildError, ConfigurationError};
pub use crate::model::{CurrencyError, InvalidTransactionError};
pub use crate::price::PriceError;
pub use crate::report::ReportError;
pub use crate::util::date_filter::DateFilterError;
