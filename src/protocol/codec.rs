//! Protocol codec for encoding/decoding messages
//!
//! Pure functions over byte buffers. Nothing here touches a socket.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::{
    AliveRequest, AliveResponse, NodeInfo, PortLookupRequest, PortLookupResponse, Request,
};

/// Largest value a `u16` length field can carry
pub const MAX_FIELD_LEN: usize = u16::MAX as usize;

/// Size of the outer length prefix
pub const LENGTH_PREFIX_SIZE: usize = 2;

/// ALIVE2_RESP body: result(1) + creation(2)
pub const ALIVE_RESPONSE_SIZE: usize = 3;

/// PORT2_RESP fixed fields after the result byte:
/// port(2) + node_type(1) + protocol(1) + highest(2) + lowest(2)
pub const NODE_INFO_FIXED_SIZE: usize = 8;

/// Fixed part of the ALIVE2_REQ payload, excluding name and extra
const ALIVE_REQUEST_FIXED_SIZE: usize = 13;

/// Codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Field '{field}' too long: {len} bytes (max: {max})")]
    FieldOverflow {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("Frame too large: {len} bytes (max: {max})")]
    FrameTooLarge { len: usize, max: usize },

    #[error("Truncated response: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
}

pub type CodecResult<T> = Result<T, CodecError>;

fn check_field(field: &'static str, value: &[u8]) -> CodecResult<()> {
    if value.len() > MAX_FIELD_LEN {
        return Err(CodecError::FieldOverflow {
            field,
            len: value.len(),
            max: MAX_FIELD_LEN,
        });
    }
    Ok(())
}

fn check_frame(len: usize) -> CodecResult<()> {
    if len > MAX_FIELD_LEN {
        return Err(CodecError::FrameTooLarge {
            len,
            max: MAX_FIELD_LEN,
        });
    }
    Ok(())
}

/// Encode a request as `u16 length || payload`
pub fn encode_frame(request: &Request) -> CodecResult<BytesMut> {
    match request {
        Request::Alive2(req) => encode_alive(request.request_code(), req),
        Request::PortPlease2(req) => encode_port_please(request.request_code(), req),
    }
}

fn encode_alive(code: u8, req: &AliveRequest) -> CodecResult<BytesMut> {
    check_field("node_name", &req.node_name)?;
    check_field("extra", &req.extra)?;

    let len = ALIVE_REQUEST_FIXED_SIZE + req.node_name.len() + req.extra.len();
    check_frame(len)?;

    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + len);
    buf.put_u16(len as u16);
    buf.put_u8(code);
    buf.put_u16(req.port);
    buf.put_u8(req.node_type);
    buf.put_u8(req.protocol);
    buf.put_u16(req.highest_version);
    buf.put_u16(req.lowest_version);
    buf.put_u16(req.node_name.len() as u16);
    buf.put_slice(&req.node_name);
    buf.put_u16(req.extra.len() as u16);
    buf.put_slice(&req.extra);
    Ok(buf)
}

fn encode_port_please(code: u8, req: &PortLookupRequest) -> CodecResult<BytesMut> {
    check_field("node_name", &req.node_name)?;

    // Name runs to the end of the frame
    let len = 1 + req.node_name.len();
    check_frame(len)?;

    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + len);
    buf.put_u16(len as u16);
    buf.put_u8(code);
    buf.put_slice(&req.node_name);
    Ok(buf)
}

fn ensure(src: &[u8], needed: usize, consumed: usize) -> CodecResult<()> {
    if src.remaining() < needed {
        return Err(CodecError::Truncated {
            expected: consumed + needed,
            actual: consumed + src.remaining(),
        });
    }
    Ok(())
}

/// Decode the ALIVE2_RESP body (response code already consumed)
pub fn decode_alive_response(bytes: &[u8]) -> CodecResult<AliveResponse> {
    let mut src = bytes;
    ensure(src, ALIVE_RESPONSE_SIZE, 0)?;

    Ok(AliveResponse {
        result: src.get_u8(),
        creation: src.get_u16(),
    })
}

/// Decode the PORT2_RESP body (response code already consumed)
///
/// A nonzero result byte ends the response; no further fields are defined.
pub fn decode_port_lookup_response(bytes: &[u8]) -> CodecResult<PortLookupResponse> {
    let mut src = bytes;
    ensure(src, 1, 0)?;

    let result = src.get_u8();
    if result != 0 {
        return Ok(PortLookupResponse::NotFound { result });
    }

    ensure(src, NODE_INFO_FIXED_SIZE, bytes.len() - src.len())?;
    let port = src.get_u16();
    let node_type = src.get_u8();
    let protocol = src.get_u8();
    let highest_version = src.get_u16();
    let lowest_version = src.get_u16();

    let node_name = read_prefixed(&mut src, bytes.len())?;
    let extra = read_prefixed(&mut src, bytes.len())?;

    Ok(PortLookupResponse::Found(NodeInfo {
        port,
        node_type,
        protocol,
        highest_version,
        lowest_version,
        node_name,
        extra,
    }))
}

/// Read a `u16` length followed by that many bytes
fn read_prefixed(src: &mut &[u8], total: usize) -> CodecResult<Bytes> {
    ensure(*src, 2, total - src.len())?;
    let len = src.get_u16() as usize;

    ensure(*src, len, total - src.len())?;
    Ok(src.copy_to_bytes(len))
}
