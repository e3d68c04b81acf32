//! Network module - Talks to the port mapper daemon over TCP
//!
//! Provides:
//! - Connection for single framed request/response exchanges
//! - Registration sessions that hold the daemon connection open
//! - One-shot port lookups

mod connection;
mod lookup;
mod session;

pub use connection::*;
pub use lookup::*;
pub use session::*;

use std::fmt;

use crate::protocol::{DEFAULT_HOST, DEFAULT_PORT};

/// Address of a port mapper daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpmdAddr {
    pub host: String,
    pub port: u16,
}

impl Default for EpmdAddr {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl EpmdAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for EpmdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
