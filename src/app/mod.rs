//! Application module
//!
//! Binary-side glue for the `pulse` CLI:
//! - Configuration handling
//! - Logging setup
//! - Fatal error reporting

pub mod config;
pub mod error_handling;
pub mod logging;

pub use config::AppConfig;
pub use error_handling::handle_fatal_error;
pub use logging::init_logging;
