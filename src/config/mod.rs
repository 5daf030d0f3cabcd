//! Configuration module for the sync service.
//!
//! This module provides comprehensive configuration management with support for:
//! - JSON configuration files
//! - Environment variable overrides
//! - Stdin input
//! - Sensible defaults
//!
//! # Module Structure
//!
//! - [`crate::config::types`]: Root `Config` struct
//! - [`server`]: HTTP server and background-job settings
//! - [`platforms`]: Per-platform endpoints, TTLs, and freshness windows
//! - [`limits`]: Concurrency caps, bulk tuning, and rate-limit rules
//! - [`logging`]: Logging configuration
//! - [`crate::config::loader`]: Configuration loading functions
//! - [`crate::config::validation`]: Configuration validation functions
//! - [`crate::config::defaults`]: Default value functions

// Submodules
pub mod defaults;
pub mod limits;
pub mod loader;
pub mod logging;
pub mod platforms;
pub mod server;
pub mod types;
pub mod validation;

// Re-exports for convenience
pub use limits::{BulkConfig, ConcurrencyLimitsConfig, RateLimitConfig, RateLimitRule};

pub use loader::load;

pub use logging::{LogFormat, LogLevel, LoggingConfig};

pub use platforms::{PlatformTuning, PlatformsConfig};

pub use server::{ServerConfig, ValidatorConfig};

pub use types::Config;

pub use validation::validate_config;
