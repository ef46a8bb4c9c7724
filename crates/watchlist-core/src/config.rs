use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

/// Declared input bounds.
#[derive(Debug, Clone)]
pub struct Limits {
    pub max_name_len: usize,
    pub max_description_len: usize,
    pub max_note_len: usize,
    pub max_tags: usize,
    pub max_tag_len: usize,
    pub max_items_per_watchlist: usize,
    pub max_coin_id_len: usize,
    pub max_symbol_len: usize,
    pub max_coin_name_len: usize,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_name_len: 100,
            max_description_len: 500,
            max_note_len: 1000,
            max_tags: 10,
            max_tag_len: 50,
            max_items_per_watchlist: 100,
            max_coin_id_len: 100,
            max_symbol_len: 20,
            max_coin_name_len: 100,
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Calls allowed per (requester, action) within one window
    pub max_requests: u32,
    /// Calls allowed per action for all unauthenticated callers together
    pub anonymous_max_requests: u32,
    pub window: Duration,
    /// How often expired windows are purged
    pub cleanup_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 60,
            anonymous_max_requests: 300,
            window: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub environment: Environment,
    pub limits: Limits,
    pub rate_limit: RateLimitConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            limits: Limits::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl CoreConfig {
    /// Load `.env` if present, then read the environment.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    pub fn from_env() -> Result<Self> {
        let defaults = RateLimitConfig::default();

        let environment = env::var("APP_ENV")
            .map(|v| Environment::from_str(&v))
            .unwrap_or(Environment::Development);

        let max_requests = match env::var("RATE_LIMIT_MAX_REQUESTS") {
            Ok(v) => v
                .parse()
                .context("RATE_LIMIT_MAX_REQUESTS must be a positive integer")?,
            Err(_) => defaults.max_requests,
        };
        let anonymous_max_requests = match env::var("RATE_LIMIT_ANONYMOUS_MAX_REQUESTS") {
            Ok(v) => v
                .parse()
                .context("RATE_LIMIT_ANONYMOUS_MAX_REQUESTS must be a positive integer")?,
            Err(_) => defaults.anonymous_max_requests,
        };
        let window_secs: u64 = match env::var("RATE_LIMIT_WINDOW_SECS") {
            Ok(v) => v
                .parse()
                .context("RATE_LIMIT_WINDOW_SECS must be a positive integer")?,
            Err(_) => defaults.window.as_secs(),
        };
        let cleanup_secs: u64 = match env::var("RATE_LIMIT_CLEANUP_SECS") {
            Ok(v) => v
                .parse()
                .context("RATE_LIMIT_CLEANUP_SECS must be a positive integer")?,
            Err(_) => defaults.cleanup_interval.as_secs(),
        };

        let config = Self {
            environment,
            limits: Limits::default(),
            rate_limit: RateLimitConfig {
                max_requests,
                anonymous_max_requests,
                window: Duration::from_secs(window_secs),
                cleanup_interval: Duration::from_secs(cleanup_secs),
            },
        };
        config.validate()?;

        tracing::info!(
            "Watchlist core config: env={:?}, rate limit {} per {}s",
            config.environment,
            config.rate_limit.max_requests,
            window_secs
        );

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rate_limit.max_requests == 0 {
            anyhow::bail!("RATE_LIMIT_MAX_REQUESTS must be greater than 0");
        }
        if self.rate_limit.anonymous_max_requests == 0 {
            anyhow::bail!("RATE_LIMIT_ANONYMOUS_MAX_REQUESTS must be greater than 0");
        }
        if self.rate_limit.window.is_zero() {
            anyhow::bail!("RATE_LIMIT_WINDOW_SECS must be greater than 0");
        }
        if self.rate_limit.cleanup_interval.is_zero() {
            anyhow::bail!("RATE_LIMIT_CLEANUP_SECS must be greater than 0");
        }
        if self.limits.max_page_size == 0 {
            anyhow::bail!("max page size must be greater than 0");
        }
        if self.limits.default_page_size == 0
            || self.limits.default_page_size > self.limits.max_page_size
        {
            anyhow::bail!("default page size must be within 1..=max page size");
        }
        Ok(())
    }

    /// Whether internal error causes may be shown to callers.
    pub fn expose_internal_errors(&self) -> bool {
        !self.environment.is_production()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parse() {
        assert_eq!(Environment::from_str("production"), Environment::Production);
        assert_eq!(Environment::from_str(" PROD "), Environment::Production);
        assert_eq!(Environment::from_str("staging"), Environment::Development);
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = CoreConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.expose_internal_errors());
        assert_eq!(config.limits.max_items_per_watchlist, 100);
        assert_eq!(config.limits.max_page_size, 100);
    }

    #[test]
    fn test_zero_limit_rejected() {
        let mut config = CoreConfig::default();
        config.rate_limit.max_requests = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_page_size_and_anonymous_limit_rejected() {
        let mut config = CoreConfig::default();
        config.limits.max_page_size = 0;
        assert!(config.validate().is_err());

        let mut config = CoreConfig::default();
        config.rate_limit.anonymous_max_requests = 0;
        assert!(config.validate().is_err());
    }
}
