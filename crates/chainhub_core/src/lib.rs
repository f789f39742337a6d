pub mod config;
pub mod error_handler;
pub mod logging;

pub use config::ChainHubConfig;
pub use error_handler::{ClassifiedError, ErrorCategory, ErrorSeverity, classify_error};
