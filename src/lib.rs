pub mod csv_io;
pub mod error;
pub mod geocode;
pub mod http;
pub mod markers;
pub mod monitor;
pub mod property_search;
pub mod scraper;

pub use error::{EnrichError, Result};
