pub mod aggregation;
pub mod query;
pub mod query_parser;
pub mod request;
pub mod smart;
pub mod sort;
pub mod spatial;

mod error;

pub use error::{Error, Result};
