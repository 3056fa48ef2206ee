//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

/// Server configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// WebSocket binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Laps per race
    pub total_laps: u32,
    /// Human player slots opened on the grid
    pub players: usize,
    /// AI opponents spawned on the grid
    pub ai_racers: usize,
    /// Fixed physics rate
    pub tick_hz: u32,
    /// Optional JSON track description; built-in oval when absent
    pub track_file: Option<String>,
    /// Skin pool drawn by AI racers
    pub skins: Vec<String>,
    /// Seed for roster draws (random when absent)
    pub rng_seed: Option<u64>,
}

const DEFAULT_SKINS: [&str; 6] = ["crimson", "cobalt", "lime", "amber", "violet", "graphite"];

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let server_addr = env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:9001".to_string());

        let config = Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress(server_addr.clone()))?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            total_laps: parse_var("TOTAL_LAPS", 3)?,
            players: parse_var("PLAYERS", 1)?,
            ai_racers: parse_var("AI_RACERS", 2)?,
            tick_hz: parse_var("TICK_HZ", 60)?,
            track_file: env::var("TRACK_FILE").ok().filter(|p| !p.is_empty()),
            skins: env::var("SKINS")
                .map(|raw| parse_list(&raw))
                .unwrap_or_else(|_| DEFAULT_SKINS.iter().map(|s| s.to_string()).collect()),
            rng_seed: match env::var("RNG_SEED") {
                Ok(raw) => Some(
                    raw.parse()
                        .map_err(|_| ConfigError::Invalid { var: "RNG_SEED", value: raw })?,
                ),
                Err(_) => None,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.total_laps == 0 {
            return Err(ConfigError::OutOfRange("TOTAL_LAPS must be at least 1"));
        }
        if self.tick_hz == 0 {
            return Err(ConfigError::OutOfRange("TICK_HZ must be at least 1"));
        }
        if self.players + self.ai_racers == 0 {
            return Err(ConfigError::OutOfRange("race needs at least one racer"));
        }
        if self.skins.is_empty() {
            return Err(ConfigError::OutOfRange("SKINS must list at least one skin"));
        }
        Ok(())
    }

    /// Seconds per physics tick
    pub fn tick_delta(&self) -> f32 {
        1.0 / self.tick_hz as f32
    }
}

fn parse_var<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
        Err(_) => Ok(default),
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server address format: {0}")]
    InvalidAddress(String),

    #[error("Invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },

    #[error("{0}")]
    OutOfRange(&'static str),
}
