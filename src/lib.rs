//! # airwire-broker
//!
//! Local broker process between a controlling frontend and the platform
//! Wi-Fi stack. The frontend drives discovery and pairing workflows for a
//! peer device through a small fixed-format datagram protocol, without ever
//! touching Wi-Fi APIs itself.
//!
//! ## Architecture
//!
//! - **Data plane** (datagram socket): fixed-size binary command/response
//!   frames, local Unix socket or UDP
//! - **Diagnostics** (stderr): structured logs and the `READY` startup
//!   marker; never mixed into the data channel
//!
//! ```text
//! frontend ──frame──▶ protocol (decode) ──▶ broker ──▶ session (validate)
//!                                             │
//!                                             ▼
//!                                      wifi provider (scan/associate/...)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use airwire_broker::{config, Broker};
//! use airwire_broker::transport::Endpoint;
//! use airwire_broker::wifi::{NmcliProvider, WifiProvider};
//! use std::sync::atomic::AtomicBool;
//! use std::sync::Arc;
//!
//! let mut provider = NmcliProvider::new();
//! provider.init(None).await?;
//! let endpoint = Endpoint::bind_udp(config::DEFAULT_CMD_PORT).await?;
//! let shutdown = Arc::new(AtomicBool::new(false));
//!
//! let mut broker = Broker::new(endpoint, provider, config::discovery_matcher(), shutdown);
//! broker.run().await?;
//! broker.shutdown().await;
//! ```

pub mod broker;
pub mod config;
pub mod error;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod wifi;

pub use broker::Broker;
pub use error::{BrokerError, Result};
