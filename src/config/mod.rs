//! Configuration module for painel.
//!
//! Handles connection records, environment variables, and settings.

mod connection;
mod settings;

pub use connection::{ConnectionError, ConnectionRecord, Driver};
pub use settings::{
    expand_env_vars, CacheSettings, ConnectionSettings, ExecutorSettings, LoggingSettings,
    PoolSettings, ServerSettings, Settings, SettingsError, WorkerSettings,
};
