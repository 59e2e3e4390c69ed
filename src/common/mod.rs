pub mod config;
pub mod error;

pub use config::{CheckConfig, DuplicateRootPolicy};
pub use error::StackcheckError;
