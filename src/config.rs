//! Application configuration management.
//!
//! Configuration is read from environment variables with the `envy` crate,
//! after an optional `.env` file has been loaded by `dotenvy`.

use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `DATABASE_MAX_CONNECTIONS` (optional): pool size, defaults to 5
/// - `STRIPE_SECRET_KEY` (required): processor API secret key
/// - `STRIPE_API_BASE` (optional): defaults to `https://api.stripe.com`
/// - `STRIPE_API_VERSION` (optional): pinned API version header
/// - `STRIPE_TIMEOUT_SECS` (optional): per-request timeout, defaults to 10
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    pub stripe_secret_key: String,

    #[serde(default = "default_api_base")]
    pub stripe_api_base: String,

    #[serde(default)]
    pub stripe_api_version: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub stripe_timeout_secs: u64,
}

fn default_port() -> u16 {
    3000
}

fn default_max_connections() -> u32 {
    5
}

fn default_api_base() -> String {
    "https://api.stripe.com".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();

        // database_url -> DATABASE_URL
        envy::from_env::<Config>()
    }
}
