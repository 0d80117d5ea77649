//! # harbor-config
//!
//! Configuration system for Harbor (`harbor.toml`): typed schema with
//! defaults, env-var overrides, validation, and tracing setup.

pub mod loader;
pub mod logging;
pub mod schema;

pub use loader::ConfigLoader;
pub use logging::init_tracing;
pub use schema::{
    HarborConfig, IndexConfig, LoggingConfig, MemoryConfig, PipelineConfig, PolicyConfig,
    ServicesConfig,
};
