//! Connection handling for the port mapper daemon
//!
//! A connection carries strictly half-duplex exchanges:
//! - The request frame is fully written and flushed
//! - One response code byte is read and checked
//! - The response body is read field by field and decoded

use bytes::{Bytes, BytesMut};
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use super::EpmdAddr;
use crate::protocol::{
    decode_alive_response, decode_port_lookup_response, encode_frame, AliveRequest,
    AliveResponse, CodecError, PortLookupRequest, PortLookupResponse, Request,
    ALIVE_RESPONSE_SIZE, NODE_INFO_FIXED_SIZE,
};

/// Connection errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Could not connect to EPMD at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("Unexpected response code: got {actual}, expected {expected}")]
    UnexpectedResponseCode { actual: u8, expected: u8 },

    #[error("Protocol error: {0}")]
    Codec(#[from] CodecError),

    #[error("Connection closed")]
    Closed,
}

pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Connection statistics
#[derive(Debug, Default, Clone)]
pub struct ConnectionStats {
    /// Requests sent
    pub messages_sent: u64,
    /// Responses fully decoded
    pub messages_received: u64,
    /// Bytes sent
    pub bytes_sent: u64,
    /// Bytes consumed from the socket
    pub bytes_received: u64,
}

/// Fail unless the daemon answered with the code the request expects.
///
/// Must run before any response body byte is read: after a mismatch the
/// rest of the stream cannot be interpreted.
pub fn expect_response_code(actual: u8, expected: u8) -> ConnectionResult<()> {
    if actual != expected {
        return Err(ConnectionError::UnexpectedResponseCode { actual, expected });
    }
    Ok(())
}

/// Represents one connection to a port mapper daemon
pub struct Connection<S = TcpStream> {
    /// Daemon address, for logging
    peer: String,
    /// The stream; `None` once closed
    stream: Option<S>,
    /// Statistics
    stats: ConnectionStats,
}

impl Connection<TcpStream> {
    /// Connect to the daemon. No retry.
    pub async fn open(addr: &EpmdAddr) -> ConnectionResult<Self> {
        let stream = TcpStream::connect((addr.host.as_str(), addr.port))
            .await
            .map_err(|source| ConnectionError::Connect {
                addr: addr.to_string(),
                source,
            })?;

        tracing::debug!("Connected to EPMD at {}", addr);
        Ok(Self::new(stream, addr.to_string()))
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an established stream
    pub fn new(stream: S, peer: impl Into<String>) -> Self {
        Self {
            peer: peer.into(),
            stream: Some(stream),
            stats: ConnectionStats::default(),
        }
    }

    /// Get the daemon address this connection talks to
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Get connection statistics
    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    /// Check if the socket has not been closed yet
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn stream_mut(&mut self) -> ConnectionResult<&mut S> {
        self.stream.as_mut().ok_or(ConnectionError::Closed)
    }

    /// Write one framed request and read the response code
    pub async fn send_request(&mut self, request: &Request) -> ConnectionResult<u8> {
        let frame = encode_frame(request)?;

        let stream = self.stream_mut()?;
        stream.write_all(&frame).await?;
        stream.flush().await?;

        self.stats.messages_sent += 1;
        self.stats.bytes_sent += frame.len() as u64;
        tracing::debug!(
            "Sent {} ({} bytes) to {}",
            request.name(),
            frame.len(),
            self.peer
        );

        let code = self.read_exact(1).await?;
        Ok(code[0])
    }

    /// Read exactly `n` bytes, across as many socket reads as needed
    pub async fn read_exact(&mut self, n: usize) -> ConnectionResult<Bytes> {
        let mut buf = BytesMut::zeroed(n);

        let stream = self.stream_mut()?;
        stream.read_exact(&mut buf).await?;

        self.stats.bytes_received += n as u64;
        Ok(buf.freeze())
    }

    /// ALIVE2 exchange
    pub async fn alive2(&mut self, request: AliveRequest) -> ConnectionResult<AliveResponse> {
        let request = Request::Alive2(request);
        let code = self.send_request(&request).await?;
        expect_response_code(code, request.response_code())?;

        let body = self.read_exact(ALIVE_RESPONSE_SIZE).await?;
        let response = decode_alive_response(&body)?;

        self.stats.messages_received += 1;
        Ok(response)
    }

    /// PORT_PLEASE2 exchange
    pub async fn port_please2(
        &mut self,
        request: PortLookupRequest,
    ) -> ConnectionResult<PortLookupResponse> {
        let request = Request::PortPlease2(request);
        let code = self.send_request(&request).await?;
        expect_response_code(code, request.response_code())?;

        let mut body = BytesMut::new();
        let result = self.read_exact(1).await?;
        body.extend_from_slice(&result);

        if result[0] == 0 {
            let fixed = self.read_exact(NODE_INFO_FIXED_SIZE).await?;
            body.extend_from_slice(&fixed);
            self.read_prefixed_into(&mut body).await?; // name
            self.read_prefixed_into(&mut body).await?; // extra
        }

        let response = decode_port_lookup_response(&body)?;
        self.stats.messages_received += 1;
        Ok(response)
    }

    async fn read_prefixed_into(&mut self, body: &mut BytesMut) -> ConnectionResult<()> {
        let len = self.read_exact(2).await?;
        body.extend_from_slice(&len);

        let value = self.read_exact(u16::from_be_bytes([len[0], len[1]]) as usize).await?;
        body.extend_from_slice(&value);
        Ok(())
    }

    /// Park until the daemon closes the socket or it breaks.
    ///
    /// Nothing is expected on the wire here; stray bytes are logged and dropped.
    pub async fn wait_closed(&mut self) -> ConnectionResult<()> {
        let mut buf = [0u8; 256];
        loop {
            let stream = self.stream_mut()?;
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                return Ok(());
            }

            self.stats.bytes_received += n as u64;
            tracing::warn!("Discarding {} unexpected bytes from {}", n, self.peer);
        }
    }

    /// Close the connection. Safe to call more than once.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                tracing::debug!("Shutdown of connection to {} failed: {}", self.peer, e);
            }
            tracing::debug!("Closed connection to {}", self.peer);
        }
    }
}
