use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::{env, str::FromStr};

use crate::utils::cookies::{CookieOptions, SameSite};

/// Upper bound for either session lifetime: ten years.
pub const MAX_SESSION_TTL_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub bind_address: String,
    pub session_cookie_name: String,
    pub session_header_name: String,
    pub session_ttl_short_seconds: u64,
    pub session_ttl_long_seconds: u64,
    pub session_reaper_interval_seconds: u64,
    pub session_cache_ttl_seconds: u64,
    pub redis_url: Option<String>,
    pub redis_pool_size: u32,
    pub redis_connect_timeout: u64,
    pub cookie_secure: bool,
    pub cookie_same_site: SameSite,
    pub cors_allow_origins: Vec<String>,
}

/// Lifetimes chosen from the payload's persistence flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTtl {
    pub short_seconds: u64,
    pub long_seconds: u64,
}

impl SessionTtl {
    pub fn for_session(&self, persistent: bool) -> u64 {
        if persistent {
            self.long_seconds
        } else {
            self.short_seconds
        }
    }
}

impl Default for SessionTtl {
    fn default() -> Self {
        Self {
            short_seconds: 3600,
            long_seconds: 365 * 24 * 60 * 60,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = SessionTtl::default();

        let redis_url = env::var("REDIS_URL")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let cors_allow_origins = env::var("CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let config = Config {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/sessionkeeper".to_string()),
            database_max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 10)?,
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            session_cookie_name: env::var("SESSION_COOKIE_NAME").unwrap_or_else(|_| "sid".into()),
            session_header_name: env::var("SESSION_HEADER_NAME")
                .unwrap_or_else(|_| "x-session-token".into())
                .to_ascii_lowercase(),
            session_ttl_short_seconds: parse_env(
                "SESSION_TTL_SHORT_SECONDS",
                defaults.short_seconds,
            )?,
            session_ttl_long_seconds: parse_env("SESSION_TTL_LONG_SECONDS", defaults.long_seconds)?,
            session_reaper_interval_seconds: parse_env("SESSION_REAPER_INTERVAL_SECONDS", 300)?,
            session_cache_ttl_seconds: parse_env("SESSION_CACHE_TTL_SECONDS", 30)?,
            redis_url,
            redis_pool_size: parse_env("REDIS_POOL_SIZE", 10)?,
            redis_connect_timeout: parse_env("REDIS_CONNECT_TIMEOUT", 5)?,
            cookie_secure: parse_env("COOKIE_SECURE", false)?,
            cookie_same_site: parse_env("COOKIE_SAME_SITE", SameSite::Lax)?,
            cors_allow_origins,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.session_cookie_name.trim().is_empty() {
            return Err(anyhow!("SESSION_COOKIE_NAME must not be empty"));
        }
        if axum::http::HeaderName::from_bytes(self.session_header_name.as_bytes()).is_err() {
            return Err(anyhow!(
                "Invalid SESSION_HEADER_NAME value: {}",
                self.session_header_name
            ));
        }
        if self.session_ttl_short_seconds == 0 || self.session_ttl_long_seconds == 0 {
            return Err(anyhow!("Session TTLs must be greater than zero"));
        }
        if self.session_ttl_short_seconds > MAX_SESSION_TTL_SECONDS
            || self.session_ttl_long_seconds > MAX_SESSION_TTL_SECONDS
        {
            return Err(anyhow!(
                "Session TTLs must not exceed {MAX_SESSION_TTL_SECONDS} seconds"
            ));
        }
        if self.session_cache_ttl_seconds > MAX_SESSION_TTL_SECONDS {
            return Err(anyhow!(
                "SESSION_CACHE_TTL_SECONDS must not exceed {MAX_SESSION_TTL_SECONDS}"
            ));
        }
        Ok(())
    }

    pub fn session_ttl(&self) -> SessionTtl {
        SessionTtl {
            short_seconds: self.session_ttl_short_seconds,
            long_seconds: self.session_ttl_long_seconds,
        }
    }

    pub fn cookie_options(&self) -> CookieOptions {
        CookieOptions {
            secure: self.cookie_secure,
            same_site: self.cookie_same_site,
        }
    }
}

fn parse_env<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("Invalid {} value '{}': {}", key, raw, e)),
        _ => Ok(default),
    }
}
