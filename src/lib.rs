#![cfg_attr(not(test), deny(clippy::panic))]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_excessive_bools,
    clippy::too_many_arguments,
    clippy::too_many_lines,
    clippy::similar_names
)]

//! # Stat Sync Server
//!
//! Platform statistics synchronization service for a social coding-practice
//! tracker: fetches and caches LeetCode / GitHub / Codeforces user stats,
//! rate-limits inbound refreshes, and bulk-refreshes room memberships with
//! bounded concurrency against flaky external APIs.

/// Platform statistics cache over the shared key-value store
pub mod cache;

/// Platform clients (LeetCode / GitHub / Codeforces)
pub mod clients;

/// Server configuration and environment variables
pub mod config;

/// Typed error taxonomy for platforms, storage, and orchestration
pub mod error;

/// Per-class concurrency limiting and bulk batch execution
pub mod limiter;

/// Structured logging configuration
pub mod logging;

/// Shared key-value store abstraction (in-memory implementation)
pub mod kv;

/// Core domain types: platforms, stats, identities
pub mod model;

/// Inbound fixed-window rate limiting (fail-open)
pub mod rate_limit;

/// Refresh orchestration: single-user, multi-platform, and bulk entry points
pub mod service;

/// Service-level metrics collection
pub mod stats;

/// User and room storage abstraction (in-memory implementation)
pub mod store;

/// Per-platform stats updater state machine
pub mod updater;

/// Username validator background job
pub mod validator;

/// HTTP surface exposed to controllers
pub mod web;
