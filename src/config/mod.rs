//! Settings and the configurator that turns them into a pipeline

pub mod configurator;
pub mod settings;

pub use configurator::{setup_logger, LoggingConfigurator};
pub use settings::{DbSettings, HttpMethod, LogSettings, SinkType, SysLogSettings, DEFAULT_ENV_PREFIX};
