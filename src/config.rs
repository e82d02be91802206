//! Environment-driven configuration.
//!
//! Values come from the process environment, with a `.env` file in the
//! working directory loaded first when present.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{EchoError, Result};
use crate::groq::{DEFAULT_MODEL, GROQ_API_URL};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_MAX_DURATION_SECS: u64 = 30;
const DEFAULT_RING_DELAY_MS: u64 = 600;

#[derive(Debug, Clone)]
pub struct EchoConfig {
    // ── Provider
    pub groq_api_key: Option<String>,
    pub provider_url: String,
    pub model: String,

    // ── Server
    pub host: String,
    pub port: u16,
    pub max_duration: Duration,

    // ── Shell
    pub ring_delay: Duration,
    pub endpoint_url: Option<String>, // remote echo-server instead of the in-process engine
    pub data_dir: Option<PathBuf>,

    // ── Logging
    pub log_dir: Option<PathBuf>,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            groq_api_key: None,
            provider_url: GROQ_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_duration: Duration::from_secs(DEFAULT_MAX_DURATION_SECS),
            ring_delay: Duration::from_millis(DEFAULT_RING_DELAY_MS),
            endpoint_url: None,
            data_dir: None,
            log_dir: None,
        }
    }
}

impl EchoConfig {
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Ok(Self {
            groq_api_key: get("GROQ_API_KEY"),
            provider_url: get("ECHO_PROVIDER_URL").unwrap_or(defaults.provider_url),
            model: get("ECHO_MODEL").unwrap_or(defaults.model),
            host: get("ECHO_HOST").unwrap_or(defaults.host),
            port: parse_var(&get, "ECHO_PORT", DEFAULT_PORT)?,
            max_duration: Duration::from_secs(parse_var(
                &get,
                "ECHO_MAX_DURATION_SECS",
                DEFAULT_MAX_DURATION_SECS,
            )?),
            ring_delay: Duration::from_millis(parse_var(
                &get,
                "ECHO_RING_DELAY_MS",
                DEFAULT_RING_DELAY_MS,
            )?),
            endpoint_url: get("ECHO_ENDPOINT_URL"),
            data_dir: get("ECHO_DATA_DIR").map(PathBuf::from),
            log_dir: get("ECHO_LOG_DIR").map(PathBuf::from),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| EchoError::Config(format!("{} has an invalid value: {}", key, raw))),
        None => Ok(default),
    }
}
