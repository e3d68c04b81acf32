//! EPMD integration tests
//!
//! Runs registration and lookups against a fake port mapper daemon over TCP.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Notify};
use tokio::time::timeout;

use epmd_client::network::{lookup_port, AliveSession, EpmdAddr, SessionError, SessionState};

/// Registered nodes: name -> (port, creation)
type Registry = Arc<Mutex<HashMap<Vec<u8>, (u16, u16)>>>;

/// Minimal port mapper: answers ALIVE2 and PORT_PLEASE2, forgets a node
/// when its registration socket closes
struct FakeEpmd {
    port: u16,
    registry: Registry,
    unregistered: Arc<Notify>,
}

impl FakeEpmd {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let registry: Registry = Arc::new(Mutex::new(HashMap::new()));
        let unregistered = Arc::new(Notify::new());

        let reg = registry.clone();
        let notify = unregistered.clone();
        tokio::spawn(async move {
            let mut next_creation = 1u16;
            loop {
                let (socket, _) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(_) => break,
                };
                tokio::spawn(handle(socket, reg.clone(), notify.clone(), next_creation));
                next_creation += 1;
            }
        });

        Self {
            port,
            registry,
            unregistered,
        }
    }

    fn addr(&self) -> EpmdAddr {
        EpmdAddr::new("127.0.0.1", self.port)
    }

    async fn is_registered(&self, name: &[u8]) -> bool {
        self.registry.lock().await.contains_key(name)
    }
}

async fn handle(mut socket: TcpStream, registry: Registry, unregistered: Arc<Notify>, creation: u16) {
    let len = socket.read_u16().await.unwrap() as usize;
    let mut payload = vec![0u8; len];
    socket.read_exact(&mut payload).await.unwrap();

    match payload[0] {
        120 => {
            let port = u16::from_be_bytes([payload[1], payload[2]]);
            let name_len = u16::from_be_bytes([payload[9], payload[10]]) as usize;
            let name = payload[11..11 + name_len].to_vec();

            let taken = {
                let mut registry = registry.lock().await;
                if registry.contains_key(&name) {
                    true
                } else {
                    registry.insert(name.clone(), (port, creation));
                    false
                }
            };

            if taken {
                socket.write_all(&[121, 1, 0, 0]).await.unwrap();
                return;
            }

            let mut reply = vec![121, 0];
            reply.extend_from_slice(&creation.to_be_bytes());
            socket.write_all(&reply).await.unwrap();

            // Registration lives as long as the socket
            let mut rest = Vec::new();
            let _ = socket.read_to_end(&mut rest).await;
            registry.lock().await.remove(&name);
            unregistered.notify_one();
        }
        122 => {
            let name = payload[1..].to_vec();
            let entry = registry.lock().await.get(&name).copied();
            let reply = match entry {
                Some((port, _)) => {
                    let mut reply = vec![119, 0];
                    reply.extend_from_slice(&port.to_be_bytes());
                    reply.extend_from_slice(&[72, 0, 0, 5, 0, 5]);
                    reply.extend_from_slice(&(name.len() as u16).to_be_bytes());
                    reply.extend_from_slice(&name);
                    reply.extend_from_slice(&[0, 0]);
                    reply
                }
                None => vec![119, 1],
            };
            socket.write_all(&reply).await.unwrap();
        }
        other => panic!("unexpected request code {}", other),
    }
}

#[tokio::test]
async fn test_register_lookup_unregister() {
    let epmd = FakeEpmd::start().await;
    let addr = epmd.addr();

    let session = AliveSession::new("foo", 9999, addr.clone());
    let mut handle = session.register().await.unwrap();
    assert_eq!(handle.creation(), 1);
    assert_eq!(session.state().await, SessionState::Registered);

    let resp = lookup_port("foo", &addr.host, addr.port).await.unwrap();
    let info = resp.node().expect("foo should be registered");
    assert_eq!(info.port, 9999);
    assert_eq!(info.node_type, 72);
    assert_eq!(info.protocol, 0);
    assert_eq!(info.highest_version, 5);
    assert_eq!(info.lowest_version, 5);
    assert_eq!(&info.node_name[..], b"foo");
    assert!(info.extra.is_empty());

    handle.close().await;
    timeout(Duration::from_secs(1), epmd.unregistered.notified())
        .await
        .expect("daemon did not see the registration close");
    assert!(!epmd.is_registered(b"foo").await);

    let resp = lookup_port("foo", &addr.host, addr.port).await.unwrap();
    assert_ne!(resp.result(), 0);
}

#[tokio::test]
async fn test_duplicate_name_rejected() {
    let epmd = FakeEpmd::start().await;

    let first = AliveSession::new("dup", 4000, epmd.addr());
    let _handle = first.register().await.unwrap();

    let second = AliveSession::new("dup", 4001, epmd.addr());
    let err = second.register().await.err().unwrap();
    assert!(matches!(err, SessionError::Rejected { result: 1, .. }));
    assert_eq!(second.state().await, SessionState::Failed);
}

#[tokio::test]
async fn test_dropped_handle_unregisters() {
    let epmd = FakeEpmd::start().await;

    let session = AliveSession::new("gone", 5000, epmd.addr());
    let handle = session.register().await.unwrap();
    assert!(epmd.is_registered(b"gone").await);

    drop(handle);
    timeout(Duration::from_secs(1), epmd.unregistered.notified())
        .await
        .expect("daemon did not see the registration close");
    assert!(!epmd.is_registered(b"gone").await);
}

#[tokio::test]
async fn test_concurrent_lookups() {
    let epmd = FakeEpmd::start().await;
    let addr = epmd.addr();

    let a = AliveSession::new("alpha", 7001, addr.clone());
    let b = AliveSession::new("beta", 7002, addr.clone());
    let _ha = a.register().await.unwrap();
    let _hb = b.register().await.unwrap();

    let (ra, rb, rc) = tokio::join!(
        lookup_port("alpha", &addr.host, addr.port),
        lookup_port("beta", &addr.host, addr.port),
        lookup_port("gamma", &addr.host, addr.port),
    );

    assert_eq!(ra.unwrap().node().unwrap().port, 7001);
    assert_eq!(rb.unwrap().node().unwrap().port, 7002);
    assert_eq!(rc.unwrap().result(), 1);
}
