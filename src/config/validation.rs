//! Configuration validation functions.

use super::limits::RateLimitRule;
use super::platforms::PlatformTuning;
use super::Config;
use crate::model::Platform;

/// Validate configuration sanity: reject zero-sized windows, caps, and
/// batches that would silently disable core behaviour, and malformed
/// platform base URLs before any client is built from them.
pub fn validate_config(config: &Config) -> anyhow::Result<()> {
    for platform in Platform::ALL {
        validate_platform_tuning(platform, config.platforms.tuning(platform))?;
    }

    if config.concurrency.platform == 0
        || config.concurrency.database == 0
        || config.concurrency.general == 0
        || config.concurrency.external == 0
    {
        anyhow::bail!("concurrency caps must all be at least 1");
    }

    if config.bulk.batch_size == 0 {
        anyhow::bail!("bulk.batch_size must be at least 1");
    }

    let rules = [
        ("rate_limit.auth", &config.rate_limit.auth),
        (
            "rate_limit.platform_refresh",
            &config.rate_limit.platform_refresh,
        ),
        (
            "rate_limit.room_operations",
            &config.rate_limit.room_operations,
        ),
        ("rate_limit.messaging", &config.rate_limit.messaging),
        ("rate_limit.api", &config.rate_limit.api),
    ];
    for (name, rule) in rules {
        validate_rate_limit_rule(name, rule)?;
    }

    if config.validator.enabled && config.validator.interval_hours == 0 {
        anyhow::bail!("validator.interval_hours must be at least 1 when the validator is enabled");
    }

    Ok(())
}

fn validate_platform_tuning(platform: Platform, tuning: &PlatformTuning) -> anyhow::Result<()> {
    let parsed = url::Url::parse(&tuning.base_url)
        .map_err(|e| anyhow::anyhow!("platforms.{platform}.base_url is not a valid URL: {e}"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!(
            "platforms.{platform}.base_url must use http or https, got {}",
            parsed.scheme()
        );
    }

    if tuning.cache_ttl_secs == 0 {
        anyhow::bail!("platforms.{platform}.cache_ttl_secs must be at least 1");
    }
    if tuning.freshness_window_secs == 0 {
        anyhow::bail!("platforms.{platform}.freshness_window_secs must be at least 1");
    }
    if tuning.request_timeout_secs == 0 {
        anyhow::bail!("platforms.{platform}.request_timeout_secs must be at least 1");
    }

    Ok(())
}

fn validate_rate_limit_rule(name: &str, rule: &RateLimitRule) -> anyhow::Result<()> {
    if rule.limit == 0 {
        anyhow::bail!("{name}.limit must be at least 1");
    }
    if rule.window_secs == 0 {
        anyhow::bail!("{name}.window_secs must be at least 1");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_rejects_bad_base_url() {
        let mut config = Config::default();
        config.platforms.leetcode.base_url = "not a url".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_rejects_non_http_scheme() {
        let mut config = Config::default();
        config.platforms.github.base_url = "ftp://api.github.com".to_string();
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("http or https"), "got: {err}");
    }

    #[test]
    fn test_rejects_zero_concurrency_cap() {
        let mut config = Config::default();
        config.concurrency.platform = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_rejects_zero_rate_limit_window() {
        let mut config = Config::default();
        config.rate_limit.platform_refresh.window_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_rejects_zero_batch_size() {
        let mut config = Config::default();
        config.bulk.batch_size = 0;
        assert!(validate_config(&config).is_err());
    }
}
