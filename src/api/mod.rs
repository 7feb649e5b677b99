pub mod error;
pub mod nse;
pub mod yahoo;

pub use error::DataError;
pub use nse::{normalize_column_name, NseClient};
pub use yahoo::YahooClient;
