pub mod error;
pub mod logging;

pub use error::{AdapterError, ConfigError};
pub use logging::{LogLevel, init_logging};
