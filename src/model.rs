pub use self::{currency::*, transaction::*};

pub mod currency;
pub mod transaction;
