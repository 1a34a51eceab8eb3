#![forbid(unsafe_code)]

pub mod basis;
pub mod config;
pub mod convert;
pub mod errors;
pub mod imports;
pub mod ledger;
pub mod model;
pub mod price;
pub mod report;
pub mod util;
