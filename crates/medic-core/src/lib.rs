pub mod config;
pub mod error;
pub mod types;

pub use config::MedicConfig;
pub use error::{MedicError, Result};
pub use types::{Severity, Timestamp};
