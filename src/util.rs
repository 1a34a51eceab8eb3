pub mod date_filter;
pub mod fifo;
pub mod year_ext;
