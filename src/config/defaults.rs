//! Default value functions for configuration fields.
//!
//! This module contains all the default value functions used by serde's `#[serde(default = ...)]`
//! attributes throughout the configuration system. Functions are organized by category for
//! easier maintenance.

use super::logging::LogFormat;

// =============================================================================
// Port & Root Config
// =============================================================================

pub const fn default_port() -> u16 {
    8090
}

// =============================================================================
// Server Defaults
// =============================================================================

pub fn default_cors_origins() -> String {
    "http://localhost:3000,http://localhost:5173".to_string()
}

pub const fn default_kv_cleanup_interval_secs() -> u64 {
    60
}

// =============================================================================
// Platform Defaults
// =============================================================================

pub fn default_leetcode_base_url() -> String {
    "https://leetcode.com".to_string()
}

pub fn default_github_base_url() -> String {
    "https://api.github.com".to_string()
}

pub fn default_codeforces_base_url() -> String {
    "https://codeforces.com".to_string()
}

pub const fn default_cache_ttl_secs() -> u64 {
    1800 // 30 minutes
}

/// GitHub profile counters move slowly; a longer TTL spares the API quota.
pub const fn default_github_cache_ttl_secs() -> u64 {
    3600
}

pub const fn default_freshness_window_secs() -> u64 {
    3600 // 1 hour
}

pub const fn default_request_timeout_secs() -> u64 {
    12
}

pub const fn default_transport_retry_attempts() -> u32 {
    3
}

/// How long a confirmed-invalid username is trusted before re-verification.
pub const fn default_invalid_recheck_hours() -> u64 {
    24
}

// =============================================================================
// Concurrency Defaults
// =============================================================================

pub const fn default_platform_concurrency() -> usize {
    5
}

pub const fn default_database_concurrency() -> usize {
    10
}

pub const fn default_general_concurrency() -> usize {
    8
}

pub const fn default_external_concurrency() -> usize {
    3
}

// =============================================================================
// Bulk Operation Defaults
// =============================================================================

pub const fn default_bulk_batch_size() -> usize {
    10
}

pub const fn default_bulk_batch_delay_ms() -> u64 {
    500
}

pub const fn default_bulk_max_retries() -> u32 {
    2
}

pub const fn default_bulk_retry_delay_ms() -> u64 {
    250
}

// =============================================================================
// Rate Limit Defaults
// =============================================================================

pub const fn default_auth_rate_limit() -> u32 {
    10
}

pub const fn default_auth_rate_window_secs() -> u64 {
    60
}

pub const fn default_platform_refresh_rate_limit() -> u32 {
    6
}

pub const fn default_platform_refresh_rate_window_secs() -> u64 {
    300
}

pub const fn default_room_operations_rate_limit() -> u32 {
    3
}

pub const fn default_room_operations_rate_window_secs() -> u64 {
    600
}

pub const fn default_messaging_rate_limit() -> u32 {
    60
}

pub const fn default_messaging_rate_window_secs() -> u64 {
    60
}

pub const fn default_api_rate_limit() -> u32 {
    120
}

pub const fn default_api_rate_window_secs() -> u64 {
    60
}

// =============================================================================
// Username Validator Defaults
// =============================================================================

pub const fn default_validator_enabled() -> bool {
    true
}

pub const fn default_validator_interval_hours() -> u64 {
    24
}

pub const fn default_validator_recheck_days() -> u64 {
    7
}

// =============================================================================
// Logging Defaults
// =============================================================================

pub fn default_log_dir() -> String {
    "logs".to_string()
}

pub fn default_log_filename() -> String {
    "server.log".to_string()
}

pub fn default_rotation() -> String {
    "daily".to_string()
}

pub const fn default_enable_file_logging() -> bool {
    true
}

pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}
