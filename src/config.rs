//! Startup configuration and command-line surface.
//!
//! The broker serves exactly one transport, chosen at startup: a local Unix
//! datagram socket for a same-host frontend, or UDP for a remote one. An
//! optional positional argument names the wireless interface; otherwise the
//! platform default is used.

use clap::{ArgGroup, Parser};

use crate::wifi::TargetMatcher;

/// Well-known command port. The local socket path is derived from it too,
/// so one host can run brokers for several ports side by side.
pub const DEFAULT_CMD_PORT: u16 = 51280;

/// SSID prefix the target device announces itself under.
pub const TARGET_SSID_PREFIX: &str = "AirwireAP";

/// Which datagram transport the broker serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// Unix datagram socket under `/tmp`.
    Local,
    /// UDP on the command port, all interfaces.
    Udp,
}

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(
    name = "airwire-broker",
    about = "Brokers a connection between a frontend and the platform Wi-Fi stack",
    group(ArgGroup::new("transport").required(true).args(["local", "udp"]))
)]
pub struct Cli {
    /// Serve a same-host frontend over a local Unix datagram socket
    #[arg(long)]
    pub local: bool,

    /// Serve a (possibly remote) frontend over UDP
    #[arg(long)]
    pub udp: bool,

    /// Wireless interface to control (platform default when omitted)
    pub interface: Option<String>,
}

impl Cli {
    /// The selected transport. The arg group guarantees exactly one flag.
    pub fn transport(&self) -> TransportMode {
        if self.local {
            TransportMode::Local
        } else {
            TransportMode::Udp
        }
    }
}

/// The scan predicate used for discovery (`sync`) scans.
pub fn discovery_matcher() -> TargetMatcher {
    TargetMatcher::Prefix(TARGET_SSID_PREFIX.to_string())
}
