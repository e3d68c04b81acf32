//! epmd-client - Erlang Port Mapper Daemon client
//!
//! Registers a node name and port with a port mapper daemon and resolves
//! node names registered by others.

pub mod config;
pub mod network;
pub mod protocol;

pub use network::{
    lookup_port, port_please, AliveHandle, AliveSession, Connection, ConnectionError, EpmdAddr,
    SessionError, SessionState,
};
pub use protocol::{AliveRequest, AliveResponse, NodeInfo, PortLookupRequest, PortLookupResponse};
