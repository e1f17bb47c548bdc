//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;

use crate::game::room::{MAX_ROOM_SIZE, MIN_ROOM_SIZE};

const DEFAULT_SERVER_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_MAX_ROOMS: usize = 1000;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Directory holding the browser client
    pub static_dir: String,
    /// Allowed client origins for CORS; empty allows any origin
    pub client_origins: Vec<String>,
    /// Upper bound on concurrently open rooms
    pub max_rooms: usize,
    /// Capacity of rooms created by quick play
    pub quick_play_room_size: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = match lookup("PORT") {
            Some(port) => format!("0.0.0.0:{}", port.trim()),
            None => lookup("SERVER_ADDR").unwrap_or_else(|| DEFAULT_SERVER_ADDR.to_string()),
        };

        let client_origins = lookup("CLIENT_ORIGIN")
            .map(|origins| {
                origins
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let max_rooms = parse_or(&lookup, "MAX_ROOMS", DEFAULT_MAX_ROOMS)?;
        if max_rooms == 0 {
            return Err(ConfigError::Invalid {
                name: "MAX_ROOMS",
                value: max_rooms.to_string(),
            });
        }

        let quick_play_room_size = parse_or(&lookup, "QUICK_PLAY_ROOM_SIZE", MAX_ROOM_SIZE)?;
        if !(MIN_ROOM_SIZE..=MAX_ROOM_SIZE).contains(&quick_play_room_size) {
            return Err(ConfigError::Invalid {
                name: "QUICK_PLAY_ROOM_SIZE",
                value: quick_play_room_size.to_string(),
            });
        }

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress(server_addr.clone()))?,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            static_dir: lookup("STATIC_DIR").unwrap_or_else(|| "public".to_string()),
            client_origins,
            max_rooms,
            quick_play_room_size,
        })
    }
}

fn parse_or<F>(lookup: &F, name: &'static str, default: usize) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server address: {0}")]
    InvalidAddress(String),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}
