//! Storefront configuration parsed from environment variables.

use std::path::PathBuf;

pub const DEFAULT_DATA_DIR: &str = ".storefront";
pub const DEFAULT_API_BASE_URL: &str = "https://fakestoreapi.com";
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 60 * 60;
pub const DEFAULT_TOKEN_SECRET: &str = "local-demo";
pub const DEFAULT_DELIVERY_FEE: f64 = 15.0;
pub const DEFAULT_DISCOUNT_PERCENT: f64 = 20.0;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config parse failed: {0}")]
    Parse(String),
}

/// Where credential checks happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    /// Secrets are verified against the local registry and tokens are issued locally.
    #[default]
    Local,
    /// Credential checks and account creation are delegated to the remote auth endpoint.
    Remote,
}

/// Totals pricing knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pricing {
    pub delivery_fee: f64,
    pub discount_percent: f64,
}

impl Default for Pricing {
    fn default() -> Self {
        Self { delivery_fee: DEFAULT_DELIVERY_FEE, discount_percent: DEFAULT_DISCOUNT_PERCENT }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StorefrontConfig {
    pub data_dir: PathBuf,
    pub auth_mode: AuthMode,
    pub api_base_url: String,
    pub token_ttl_secs: i64,
    pub token_secret: String,
    /// Infer `admin` for unassigned usernames containing "admin".
    pub admin_name_fallback: bool,
    pub pricing: Pricing,
    pub timeouts: HttpTimeouts,
}

impl Default for StorefrontConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            auth_mode: AuthMode::Local,
            api_base_url: DEFAULT_API_BASE_URL.to_owned(),
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            token_secret: DEFAULT_TOKEN_SECRET.to_owned(),
            admin_name_fallback: true,
            pricing: Pricing::default(),
            timeouts: HttpTimeouts::default(),
        }
    }
}

impl StorefrontConfig {
    /// Build typed config from environment variables.
    ///
    /// All optional:
    /// - `STOREFRONT_DATA_DIR`: record directory (default `.storefront`)
    /// - `STOREFRONT_AUTH_MODE`: `local` (default) or `remote`
    /// - `STOREFRONT_API_BASE_URL`: catalog/auth API base URL
    /// - `STOREFRONT_TOKEN_TTL_SECS`: default 3600
    /// - `STOREFRONT_TOKEN_SECRET`: demo signing secret
    /// - `STOREFRONT_ADMIN_NAME_FALLBACK`: default `true`
    /// - `STOREFRONT_DELIVERY_FEE`: default 15
    /// - `STOREFRONT_DISCOUNT_PERCENT`: default 20
    /// - `STOREFRONT_REQUEST_TIMEOUT_SECS`: default 15
    /// - `STOREFRONT_CONNECT_TIMEOUT_SECS`: default 5
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for an unknown auth mode.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`], reading values through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for an unknown auth mode.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let auth_mode = parse_auth_mode(lookup("STOREFRONT_AUTH_MODE").as_deref())?;
        let data_dir = lookup("STOREFRONT_DATA_DIR").map_or_else(|| PathBuf::from(DEFAULT_DATA_DIR), PathBuf::from);
        let api_base_url = lookup("STOREFRONT_API_BASE_URL")
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_owned())
            .trim_end_matches('/')
            .to_owned();
        let token_secret = lookup("STOREFRONT_TOKEN_SECRET").unwrap_or_else(|| DEFAULT_TOKEN_SECRET.to_owned());

        Ok(Self {
            data_dir,
            auth_mode,
            api_base_url,
            token_ttl_secs: parse_or(&lookup, "STOREFRONT_TOKEN_TTL_SECS", DEFAULT_TOKEN_TTL_SECS),
            token_secret,
            admin_name_fallback: parse_or(&lookup, "STOREFRONT_ADMIN_NAME_FALLBACK", true),
            pricing: Pricing {
                delivery_fee: parse_or(&lookup, "STOREFRONT_DELIVERY_FEE", DEFAULT_DELIVERY_FEE),
                discount_percent: parse_or(&lookup, "STOREFRONT_DISCOUNT_PERCENT", DEFAULT_DISCOUNT_PERCENT),
            },
            timeouts: HttpTimeouts {
                request_secs: parse_or(&lookup, "STOREFRONT_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
                connect_secs: parse_or(&lookup, "STOREFRONT_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
            },
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn parse_auth_mode(raw: Option<&str>) -> Result<AuthMode, ConfigError> {
    match raw.unwrap_or("local") {
        "local" => Ok(AuthMode::Local),
        "remote" => Ok(AuthMode::Remote),
        other => Err(ConfigError::Parse(format!(
            "unknown STOREFRONT_AUTH_MODE '{other}' (expected 'local' or 'remote')"
        ))),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
