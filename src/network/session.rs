//! Node registration session
//!
//! Registers a node name and port with ALIVE2_REQ, then keeps the
//! connection open. The daemon treats the open socket as the registration:
//! once it closes, the node is unregistered.

use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

use super::connection::{Connection, ConnectionError};
use super::EpmdAddr;
use crate::protocol::AliveRequest;

/// Session errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("EPMD rejected registration of node '{node}' (result {result})")]
    Rejected { node: String, result: u8 },

    #[error("Session already started")]
    AlreadyStarted,
}

pub type SessionResult<T> = Result<T, SessionError>;

/// State of a registration session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not started yet
    Idle,
    /// Opening the daemon connection
    Connecting,
    /// ALIVE2_REQ sent, waiting for ALIVE2_RESP
    AwaitingAck,
    /// Registered; the connection is being held open
    Registered,
    /// Connection released after a successful registration
    Closed,
    /// Registration failed; terminal
    Failed,
}

/// A single-use registration of one node with one daemon
pub struct AliveSession {
    node_name: Bytes,
    port: u16,
    extra: Bytes,
    daemon: EpmdAddr,
    state: Arc<RwLock<SessionState>>,
}

impl AliveSession {
    /// Create a session advertising `port` under `node_name`
    pub fn new(node_name: impl Into<Bytes>, port: u16, daemon: EpmdAddr) -> Self {
        Self {
            node_name: node_name.into(),
            port,
            extra: Bytes::new(),
            daemon,
            state: Arc::new(RwLock::new(SessionState::Idle)),
        }
    }

    pub fn with_extra(mut self, extra: impl Into<Bytes>) -> Self {
        self.extra = extra.into();
        self
    }

    /// Get the current state
    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    pub fn daemon(&self) -> &EpmdAddr {
        &self.daemon
    }

    fn node_display(&self) -> String {
        String::from_utf8_lossy(&self.node_name).into_owned()
    }

    async fn set_state(&self, state: SessionState) {
        *self.state.write().await = state;
    }

    /// Idle -> Connecting, once
    async fn begin(&self) -> SessionResult<Pending> {
        let mut state = self.state.write().await;
        if *state != SessionState::Idle {
            return Err(SessionError::AlreadyStarted);
        }
        *state = SessionState::Connecting;
        Ok(Pending {
            state: self.state.clone(),
            registered: false,
        })
    }

    /// Connect to the daemon and register
    pub async fn register(&self) -> SessionResult<AliveHandle> {
        let pending = self.begin().await?;

        let conn = match Connection::open(&self.daemon).await {
            Ok(conn) => conn,
            Err(e) => {
                self.set_state(SessionState::Failed).await;
                tracing::error!(
                    "Could not connect to EPMD at {}:{} to register node '{}': {}",
                    self.daemon.host,
                    self.daemon.port,
                    self.node_display(),
                    e
                );
                return Err(e.into());
            }
        };

        self.exchange(conn, pending).await
    }

    /// Register over an already established connection
    pub async fn register_on<S>(&self, conn: Connection<S>) -> SessionResult<AliveHandle>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let pending = self.begin().await?;
        self.exchange(conn, pending).await
    }

    async fn exchange<S>(
        &self,
        mut conn: Connection<S>,
        mut pending: Pending,
    ) -> SessionResult<AliveHandle>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        self.set_state(SessionState::AwaitingAck).await;

        let request = AliveRequest::new(self.port, self.node_name.clone())
            .with_extra(self.extra.clone());

        let response = match conn.alive2(request).await {
            Ok(response) => response,
            Err(e) => {
                conn.close().await;
                self.set_state(SessionState::Failed).await;
                tracing::error!(
                    "Could not register node '{}' with EPMD at {}:{}: {}",
                    self.node_display(),
                    self.daemon.host,
                    self.daemon.port,
                    e
                );
                return Err(e.into());
            }
        };

        if !response.is_success() {
            conn.close().await;
            self.set_state(SessionState::Failed).await;
            tracing::error!(
                "EPMD at {}:{} rejected node '{}' (result {})",
                self.daemon.host,
                self.daemon.port,
                self.node_display(),
                response.result
            );
            return Err(SessionError::Rejected {
                node: self.node_display(),
                result: response.result,
            });
        }

        self.set_state(SessionState::Registered).await;
        pending.registered = true;
        tracing::info!(
            "Registered node \"{}\" with port {} to EPMD at \"{}:{}\" (creation {})",
            self.node_display(),
            self.port,
            self.daemon.host,
            self.daemon.port,
            response.creation
        );

        Ok(AliveHandle::spawn(conn, response.creation, self.state.clone()))
    }
}

/// Marks the session `Failed` when registration is dropped before reaching
/// `Registered`, e.g. when the caller cancels `register` on a timeout.
struct Pending {
    state: Arc<RwLock<SessionState>>,
    registered: bool,
}

impl Drop for Pending {
    fn drop(&mut self) {
        if self.registered {
            return;
        }
        if let Ok(mut state) = self.state.try_write() {
            *state = SessionState::Failed;
        }
    }
}

/// Keeps a registration alive.
///
/// Dropping the handle signals the holding task, which closes the socket
/// and only then reports `Closed`.
pub struct AliveHandle {
    creation: u16,
    state: Arc<RwLock<SessionState>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl AliveHandle {
    fn spawn<S>(mut conn: Connection<S>, creation: u16, state: Arc<RwLock<SessionState>>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let task_state = state.clone();

        let task = tokio::spawn(async move {
            let reason = tokio::select! {
                result = conn.wait_closed() => match result {
                    Ok(()) => "Connection closed by EPMD".to_string(),
                    Err(e) => format!("Error: {}", e),
                },
                _ = shutdown_rx.recv() => "Session close requested".to_string(),
            };

            conn.close().await;
            *task_state.write().await = SessionState::Closed;
            tracing::info!("Registration with {} ended: {}", conn.peer(), reason);
        });

        Self {
            creation,
            state,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        }
    }

    /// Creation token assigned by the daemon
    pub fn creation(&self) -> u16 {
        self.creation
    }

    /// Get the current session state
    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    /// Wait until the connection ends on its own
    pub async fn closed(&mut self) {
        if let Some(task) = self.task.as_mut() {
            if let Err(e) = task.await {
                tracing::debug!("Registration task ended abnormally: {}", e);
            }
            self.task = None;
            self.shutdown_tx = None;
        }
    }

    /// Release the registration. Safe to call more than once.
    pub async fn close(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        self.closed().await;
    }
}

impl Drop for AliveHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.try_send(());
        }
    }
}
