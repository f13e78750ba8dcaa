use std::env;

use crate::sessions::DEFAULT_TTL;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    /// sqlite file for write-through persistence; `None` keeps everything in memory.
    pub database_url: Option<String>,
    pub seed_demo_data: bool,
    pub session_ttl_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            database_url: None,
            seed_demo_data: false,
            session_ttl_seconds: DEFAULT_TTL,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Config::default();

        let seed_demo_data = match env::var("SEED_DEMO_DATA") {
            Ok(raw) => parse_bool(&raw)
                .ok_or_else(|| anyhow::anyhow!("SEED_DEMO_DATA must be true or false, got '{}'", raw))?,
            Err(_) => defaults.seed_demo_data,
        };

        let session_ttl_seconds = match env::var("SESSION_TTL_SECONDS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|e| anyhow::anyhow!("SESSION_TTL_SECONDS must be a number of seconds: {}", e))?,
            Err(_) => defaults.session_ttl_seconds,
        };

        Ok(Config {
            bind_addr: env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            database_url: env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            seed_demo_data,
            session_ttl_seconds,
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
