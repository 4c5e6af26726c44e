//! Server configuration
//!
//! Resolved from the command line and environment:
//! - bind address: first argument, `CHAT_RELAY_ADDR`, or `127.0.0.1:8443`
//! - default room: `CHAT_RELAY_DEFAULT_ROOM` or `lobby`
//! - TLS: `CHAT_RELAY_TLS_CERT` + `CHAT_RELAY_TLS_KEY` (both or neither)

use std::path::PathBuf;

use crate::error::AppError;
use crate::router::DEFAULT_ROOM;

/// Default server address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8443";

pub const ENV_ADDR: &str = "CHAT_RELAY_ADDR";
pub const ENV_DEFAULT_ROOM: &str = "CHAT_RELAY_DEFAULT_ROOM";
pub const ENV_TLS_CERT: &str = "CHAT_RELAY_TLS_CERT";
pub const ENV_TLS_KEY: &str = "CHAT_RELAY_TLS_KEY";

/// PEM certificate chain and private key locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub default_room: String,
    /// None runs the relay in plaintext
    pub tls: Option<TlsPaths>,
}

impl ServerConfig {
    /// Read the process arguments and environment
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_sources(std::env::args().skip(1), |key| std::env::var(key).ok())
    }

    /// Build from explicit sources
    ///
    /// `args` excludes the program name.
    pub fn from_sources<I, F>(mut args: I, env: F) -> Result<Self, AppError>
    where
        I: Iterator<Item = String>,
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = args
            .next()
            .or_else(|| env(ENV_ADDR))
            .unwrap_or_else(|| DEFAULT_ADDR.to_string());

        let default_room = env(ENV_DEFAULT_ROOM).unwrap_or_else(|| DEFAULT_ROOM.to_string());
        if default_room.trim().is_empty() {
            return Err(AppError::Config(format!("{} must not be empty", ENV_DEFAULT_ROOM)));
        }

        let tls = match (env(ENV_TLS_CERT), env(ENV_TLS_KEY)) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            (None, None) => None,
            _ => {
                return Err(AppError::Config(format!(
                    "{} and {} must be set together",
                    ENV_TLS_CERT, ENV_TLS_KEY
                )))
            }
        };

        Ok(Self {
            bind_addr,
            default_room,
            tls,
        })
    }
}
