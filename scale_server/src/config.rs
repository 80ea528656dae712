//! Environment-driven server settings (spec §6 "Environment configuration").
use std::env;
use std::time::Duration;

/// Every field here is sourced from an environment variable at process
/// start; there is no config file on the server side (unlike the device,
/// which reads a TOML file).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Accepted for parity with the deployed Supabase project but not
    /// consulted by the direct Postgres connection below; logged (as a
    /// presence flag only) at startup so a missing value is visible.
    pub service_role_key: Option<String>,
    pub function_secret: Option<String>,
    pub function_secret_processor: Option<String>,
    pub default_household_id: Option<String>,
    pub bind_addr: String,
    pub db_timeout: Duration,
}

impl Config {
    pub fn from_env() -> eyre::Result<Self> {
        let database_url = env::var("SB_URL")
            .or_else(|_| env::var("SUPABASE_URL"))
            .map_err(|_| eyre::eyre!("SB_URL or SUPABASE_URL must be set"))?;

        let service_role_key = env::var("SB_SERVICE_ROLE_KEY")
            .or_else(|_| env::var("SUPABASE_SERVICE_ROLE_KEY"))
            .ok();

        Ok(Self {
            database_url,
            service_role_key,
            function_secret: env::var("FUNCTION_SECRET").ok(),
            function_secret_processor: env::var("FUNCTION_SECRET_PROCESSOR").ok(),
            default_household_id: env::var("DEFAULT_HOUSEHOLD_ID").ok(),
            bind_addr: env::var("SCALE_SERVER_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            db_timeout: Duration::from_secs(7),
        })
    }
}
