//! Datagram endpoint for the command channel.
//!
//! Exactly one transport is chosen at startup:
//!
//! - **Local**: a Unix datagram socket at a well-known path under `/tmp`,
//!   for a frontend on the same host.
//! - **Udp**: a UDP socket on the command port, bound to all interfaces,
//!   for a remote frontend.
//!
//! Replies always go back to the address captured from the receive call.
//! The socket file of a local endpoint is unlinked before bind (a previous
//! instance may have crashed) and removed again on drop.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use tokio::net::{UdpSocket, UnixDatagram};
use tracing::debug;

/// Well-known socket path for the local transport, derived from the
/// command port so multiple brokers can coexist.
pub fn local_socket_path(port: u16) -> PathBuf {
    PathBuf::from(format!("/tmp/airwire-{port}.sock"))
}

/// Address a datagram was received from, echoed back for the reply.
#[derive(Debug, Clone)]
pub enum PeerAddr {
    /// Unix peer; `None` when the sender bound no path (unreachable for
    /// replies).
    Local(Option<PathBuf>),
    /// UDP peer.
    Inet(SocketAddr),
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerAddr::Local(Some(path)) => write!(f, "local:{}", path.display()),
            PeerAddr::Local(None) => write!(f, "local:<unbound>"),
            PeerAddr::Inet(addr) => write!(f, "udp:{addr}"),
        }
    }
}

/// The bound command endpoint.
pub enum Endpoint {
    /// Unix datagram socket.
    Local {
        socket: UnixDatagram,
        path: PathBuf,
    },
    /// UDP socket on all interfaces.
    Udp { socket: UdpSocket },
}

impl Endpoint {
    /// Bind a Unix datagram socket at `path`, unlinking any stale socket
    /// file first.
    pub fn bind_local(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        let socket = UnixDatagram::bind(&path)?;
        debug!(path = %path.display(), "local endpoint bound");
        Ok(Endpoint::Local { socket, path })
    }

    /// Bind a UDP socket on `0.0.0.0:port`.
    pub async fn bind_udp(port: u16) -> io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port)).await?;
        debug!(addr = %socket.local_addr()?, "udp endpoint bound");
        Ok(Endpoint::Udp { socket })
    }

    /// Receive one datagram, capturing the sender's address.
    pub async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, PeerAddr)> {
        match self {
            Endpoint::Local { socket, .. } => {
                let (n, addr) = socket.recv_from(buf).await?;
                let peer = PeerAddr::Local(addr.as_pathname().map(Path::to_path_buf));
                Ok((n, peer))
            }
            Endpoint::Udp { socket } => {
                let (n, addr) = socket.recv_from(buf).await?;
                Ok((n, PeerAddr::Inet(addr)))
            }
        }
    }

    /// Send a datagram back to a previously captured peer address.
    pub async fn send_to(&self, buf: &[u8], peer: &PeerAddr) -> io::Result<usize> {
        match (self, peer) {
            (Endpoint::Local { socket, .. }, PeerAddr::Local(Some(path))) => {
                socket.send_to(buf, path).await
            }
            (Endpoint::Local { .. }, PeerAddr::Local(None)) => Err(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                "peer socket has no name to reply to",
            )),
            (Endpoint::Udp { socket }, PeerAddr::Inet(addr)) => socket.send_to(buf, addr).await,
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "peer address does not match the bound transport",
            )),
        }
    }

    /// Human-readable description of the bound address, for startup logs.
    pub fn describe(&self) -> String {
        match self {
            Endpoint::Local { path, .. } => format!("local socket {}", path.display()),
            Endpoint::Udp { socket } => match socket.local_addr() {
                Ok(addr) => format!("udp {addr}"),
                Err(_) => "udp".to_string(),
            },
        }
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        if let Endpoint::Local { path, .. } = self {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(tag: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        PathBuf::from(format!(
            "/tmp/airwire-test-{tag}-{}-{nanos:x}.sock",
            std::process::id()
        ))
    }

    #[test]
    fn test_local_socket_path_includes_port() {
        let path = local_socket_path(51280);
        assert_eq!(path, PathBuf::from("/tmp/airwire-51280.sock"));
    }

    #[tokio::test]
    async fn test_udp_roundtrip_replies_to_sender() {
        let endpoint = Endpoint::bind_udp(0).await.unwrap();
        let server_addr = match &endpoint {
            Endpoint::Udp { socket } => socket.local_addr().unwrap(),
            _ => unreachable!(),
        };

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_target = SocketAddr::from(([127, 0, 0, 1], server_addr.port()));
        client.send_to(b"ping", server_target).await.unwrap();

        let mut buf = [0u8; 16];
        let (n, peer) = endpoint.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping");

        endpoint.send_to(b"pong", &peer).await.unwrap();
        let (n, _) = client.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"pong");
    }

    #[tokio::test]
    async fn test_local_roundtrip_replies_to_sender() {
        let server_path = scratch_path("server");
        let client_path = scratch_path("client");

        let endpoint = Endpoint::bind_local(&server_path).unwrap();
        let client = UnixDatagram::bind(&client_path).unwrap();
        client.send_to(b"ping", &server_path).await.unwrap();

        let mut buf = [0u8; 16];
        let (n, peer) = endpoint.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping");

        endpoint.send_to(b"pong", &peer).await.unwrap();
        let (n, _) = client.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"pong");

        let _ = std::fs::remove_file(&client_path);
    }

    #[tokio::test]
    async fn test_bind_local_unlinks_stale_socket() {
        let path = scratch_path("stale");
        let first = Endpoint::bind_local(&path).unwrap();
        // Simulate a crashed predecessor: the file is still there.
        std::mem::forget(first);
        assert!(path.exists());

        let second = Endpoint::bind_local(&path).unwrap();
        drop(second);
        assert!(!path.exists(), "socket file must be removed on drop");
    }

    #[tokio::test]
    async fn test_reply_to_unbound_local_peer_fails() {
        let path = scratch_path("unbound");
        let endpoint = Endpoint::bind_local(&path).unwrap();
        let err = endpoint
            .send_to(b"x", &PeerAddr::Local(None))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AddrNotAvailable);
    }
}
