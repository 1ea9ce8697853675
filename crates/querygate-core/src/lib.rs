pub mod config;
pub mod errors;
pub mod model;

pub mod executor;
pub mod sanitize;
pub mod validate;

pub mod lifecycle;
pub mod providers;
pub mod report;
pub mod storage;

pub mod service;

pub use config::AppConfig;
pub use errors::{ConfigError, ExecutionError, GenerationError, LifecycleError, QueryError, ValidationError};
pub use service::{bootstrap, QueryService};
