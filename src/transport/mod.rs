//! Transport module - the datagram command endpoint.
//!
//! Provides abstraction over:
//! - Unix datagram sockets (same-host frontend)
//! - UDP (remote frontend)

mod endpoint;

pub use endpoint::{local_socket_path, Endpoint, PeerAddr};
