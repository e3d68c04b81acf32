//! Protocol message definitions
//!
//! Defines the request and response types of the two EPMD exchanges.

use bytes::Bytes;
use serde::Serialize;

use super::{
    ALIVE2_REQ, ALIVE2_RESP, DISTRIBUTION_VERSION, NODE_TYPE_NORMAL, PORT2_RESP,
    PORT_PLEASE2_REQ, PROTOCOL_TCP_IPV4,
};

/// ALIVE2_REQ body: registers a node name and its listening port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliveRequest {
    /// Port the node accepts distribution connections on
    pub port: u16,
    pub node_type: u8,
    pub protocol: u8,
    pub highest_version: u16,
    pub lowest_version: u16,
    /// Node name without the `@host` part
    pub node_name: Bytes,
    /// Extra data, usually empty
    pub extra: Bytes,
}

impl AliveRequest {
    pub fn new(port: u16, node_name: impl Into<Bytes>) -> Self {
        Self {
            port,
            node_type: NODE_TYPE_NORMAL,
            protocol: PROTOCOL_TCP_IPV4,
            highest_version: DISTRIBUTION_VERSION,
            lowest_version: DISTRIBUTION_VERSION,
            node_name: node_name.into(),
            extra: Bytes::new(),
        }
    }

    pub fn with_extra(mut self, extra: impl Into<Bytes>) -> Self {
        self.extra = extra.into();
        self
    }
}

/// ALIVE2_RESP body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AliveResponse {
    /// 0 on success, anything else means the registration was refused
    pub result: u8,
    /// Incarnation token assigned by the daemon
    pub creation: u16,
}

impl AliveResponse {
    pub fn is_success(&self) -> bool {
        self.result == 0
    }
}

/// PORT_PLEASE2_REQ body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortLookupRequest {
    pub node_name: Bytes,
}

impl PortLookupRequest {
    pub fn new(node_name: impl Into<Bytes>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }
}

/// Registration details of a node as reported by the daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub port: u16,
    pub node_type: u8,
    pub protocol: u8,
    pub highest_version: u16,
    pub lowest_version: u16,
    pub node_name: Bytes,
    pub extra: Bytes,
}

impl NodeInfo {
    /// Printable view of this record
    pub fn summary(&self) -> NodeSummary {
        NodeSummary {
            name: String::from_utf8_lossy(&self.node_name).into_owned(),
            port: self.port,
            node_type: self.node_type,
            protocol: self.protocol,
            highest_version: self.highest_version,
            lowest_version: self.lowest_version,
            extra: String::from_utf8_lossy(&self.extra).into_owned(),
        }
    }
}

/// Lossy UTF-8 rendering of [`NodeInfo`] for display and JSON output
#[derive(Debug, Clone, Serialize)]
pub struct NodeSummary {
    pub name: String,
    pub port: u16,
    pub node_type: u8,
    pub protocol: u8,
    pub highest_version: u16,
    pub lowest_version: u16,
    pub extra: String,
}

/// PORT2_RESP body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortLookupResponse {
    /// The daemon knows the node (result byte 0)
    Found(NodeInfo),
    /// The daemon does not know the node; carries the nonzero result byte
    NotFound { result: u8 },
}

impl PortLookupResponse {
    /// Raw result byte as sent by the daemon
    pub fn result(&self) -> u8 {
        match self {
            PortLookupResponse::Found(_) => 0,
            PortLookupResponse::NotFound { result } => *result,
        }
    }

    pub fn node(&self) -> Option<&NodeInfo> {
        match self {
            PortLookupResponse::Found(info) => Some(info),
            PortLookupResponse::NotFound { .. } => None,
        }
    }

    pub fn into_node(self) -> Option<NodeInfo> {
        match self {
            PortLookupResponse::Found(info) => Some(info),
            PortLookupResponse::NotFound { .. } => None,
        }
    }
}

/// All requests a client can send to the daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Alive2(AliveRequest),
    PortPlease2(PortLookupRequest),
}

impl Request {
    /// Code written as the first payload byte
    pub fn request_code(&self) -> u8 {
        match self {
            Request::Alive2(_) => ALIVE2_REQ,
            Request::PortPlease2(_) => PORT_PLEASE2_REQ,
        }
    }

    /// Code the daemon must answer with
    pub fn response_code(&self) -> u8 {
        match self {
            Request::Alive2(_) => ALIVE2_RESP,
            Request::PortPlease2(_) => PORT2_RESP,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Request::Alive2(_) => "ALIVE2_REQ",
            Request::PortPlease2(_) => "PORT_PLEASE2_REQ",
        }
    }
}

impl From<AliveRequest> for Request {
    fn from(req: AliveRequest) -> Self {
        Request::Alive2(req)
    }
}

impl From<PortLookupRequest> for Request {
    fn from(req: PortLookupRequest) -> Self {
        Request::PortPlease2(req)
    }
}
