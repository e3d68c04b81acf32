//! Protocol module - Defines the EPMD wire protocol
//!
//! Every request is sent as a single frame:
//! - 2 bytes payload length (big-endian, excludes itself)
//! - 1 byte request code
//! - Request fields (big-endian)
//!
//! The daemon answers with a 1 byte response code followed by the
//! response body for that request kind.

mod message;
mod codec;

pub use message::*;
pub use codec::*;

/// Default host of the port mapper daemon
pub const DEFAULT_HOST: &str = "localhost";

/// Default port of the port mapper daemon
pub const DEFAULT_PORT: u16 = 4369;

/// ALIVE2_REQ request code
pub const ALIVE2_REQ: u8 = 120;

/// ALIVE2_RESP response code
pub const ALIVE2_RESP: u8 = 121;

/// PORT_PLEASE2_REQ request code
pub const PORT_PLEASE2_REQ: u8 = 122;

/// PORT2_RESP response code
pub const PORT2_RESP: u8 = 119;

/// Node type advertised for a normal node
pub const NODE_TYPE_NORMAL: u8 = 72;

/// Transport protocol: TCP/IPv4
pub const PROTOCOL_TCP_IPV4: u8 = 0;

/// Distribution protocol version advertised as both highest and lowest
pub const DISTRIBUTION_VERSION: u16 = 5;
