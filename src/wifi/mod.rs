//! Wi-Fi capability provider abstraction.
//!
//! The broker core never touches platform Wi-Fi APIs directly; it drives a
//! [`WifiProvider`] through the connection lifecycle and maps the outcomes
//! onto the wire status vocabulary. The trait keeps the core testable with a
//! scripted provider while [`NmcliProvider`] does the real work through
//! NetworkManager.
//!
//! The provider is a single exclusively-owned resource: every method takes
//! `&mut self` and the broker never issues concurrent calls.

mod nmcli;

pub use nmcli::NmcliProvider;

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

/// A MAC address (BSSID) as six octets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    /// Wrap raw octets.
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// The raw octets.
    pub fn octets(&self) -> &[u8; 6] {
        &self.0
    }

    /// Parse the conventional `AA:BB:CC:DD:EE:FF` form (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');
        for octet in octets.iter_mut() {
            *octet = u8::from_str_radix(parts.next()?, 16).ok()?;
        }
        if parts.next().is_some() {
            return None;
        }
        Some(Self(octets))
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

/// Identity of a network discovered by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkId {
    /// Network name.
    pub ssid: String,
    /// Physical address of the access point, when the scan reported one.
    pub bssid: Option<MacAddr>,
}

/// Name predicate used to pick the target network out of scan results.
#[derive(Debug, Clone)]
pub enum TargetMatcher {
    /// Match any SSID starting with the given prefix (discovery scans; the
    /// target device announces itself under a fixed naming convention).
    Prefix(String),
    /// Match one SSID exactly (connect-time scans).
    Exact(String),
}

impl TargetMatcher {
    /// Whether the given SSID satisfies the predicate.
    pub fn matches(&self, ssid: &str) -> bool {
        match self {
            TargetMatcher::Prefix(prefix) => ssid.starts_with(prefix.as_str()),
            TargetMatcher::Exact(name) => ssid == name,
        }
    }
}

impl fmt::Display for TargetMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetMatcher::Prefix(prefix) => write!(f, "ssid prefix \"{prefix}\""),
            TargetMatcher::Exact(name) => write!(f, "ssid \"{name}\""),
        }
    }
}

/// Errors surfaced by a capability provider.
///
/// None of these cross the wire; the broker recovers every one of them into
/// a status code.
#[derive(Debug, Error)]
pub enum WifiError {
    /// No network matching the predicate was seen in range.
    #[error("no network matching the target convention in range")]
    NotFound,

    /// The Wi-Fi interface could not be brought under control.
    #[error("wi-fi interface initialization failed: {0}")]
    InitFailed(String),

    /// Association with the target network failed.
    #[error("association failed: {0}")]
    AssociationFailed(String),

    /// A platform tool exited unsuccessfully.
    #[error("{program} failed ({status}): {stderr}")]
    CommandFailed {
        program: &'static str,
        status: std::process::ExitStatus,
        stderr: String,
    },

    /// Connected but no IPv4 address has been assigned yet.
    #[error("no IPv4 address assigned")]
    NoAddress,

    /// Underlying I/O failure (e.g. the platform tool is missing).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Platform Wi-Fi management contract consumed by the broker core.
///
/// Implementations own all OS-level Wi-Fi state. `disassociate` must be
/// idempotent: calling it while not associated is not an error.
#[async_trait]
pub trait WifiProvider: Send {
    /// Bring the wireless interface under control.
    ///
    /// `interface` selects a specific interface; `None` uses the platform
    /// default.
    async fn init(&mut self, interface: Option<&str>) -> Result<(), WifiError>;

    /// Scan and return the first network satisfying the predicate.
    async fn scan_for_target(&mut self, matcher: &TargetMatcher) -> Result<NetworkId, WifiError>;

    /// Associate with the named network, forwarding the secret opaquely.
    async fn associate(
        &mut self,
        ssid: &str,
        bssid: Option<&MacAddr>,
        psk: &[u8],
    ) -> Result<(), WifiError>;

    /// Drop the current association. Safe to call when not associated.
    async fn disassociate(&mut self) -> Result<(), WifiError>;

    /// Whether the interface currently holds a link.
    async fn is_connected(&mut self) -> bool;

    /// The interface's current IPv4 address.
    async fn get_ip_address(&mut self) -> Result<String, WifiError>;

    /// Release the interface. Called exactly once at shutdown.
    async fn cleanup(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_addr_display() {
        let mac = MacAddr::new([0xaa, 0xbb, 0x0c, 0x1d, 0x2e, 0x3f]);
        assert_eq!(mac.to_string(), "AA:BB:0C:1D:2E:3F");
    }

    #[test]
    fn test_mac_addr_parse_roundtrip() {
        let mac = MacAddr::parse("aa:bb:0c:1d:2e:3f").unwrap();
        assert_eq!(mac.octets(), &[0xaa, 0xbb, 0x0c, 0x1d, 0x2e, 0x3f]);
        assert_eq!(MacAddr::parse(&mac.to_string()), Some(mac));
    }

    #[test]
    fn test_mac_addr_parse_rejects_garbage() {
        assert_eq!(MacAddr::parse(""), None);
        assert_eq!(MacAddr::parse("aa:bb:cc"), None);
        assert_eq!(MacAddr::parse("aa:bb:cc:dd:ee:ff:00"), None);
        assert_eq!(MacAddr::parse("zz:bb:cc:dd:ee:ff"), None);
    }

    #[test]
    fn test_matcher_prefix() {
        let matcher = TargetMatcher::Prefix("AirwireAP".into());
        assert!(matcher.matches("AirwireAP-7f21"));
        assert!(matcher.matches("AirwireAP"));
        assert!(!matcher.matches("HomeNet"));
        assert!(!matcher.matches("airwireap-7f21"));
    }

    #[test]
    fn test_matcher_exact() {
        let matcher = TargetMatcher::Exact("AirwireAP-7f21".into());
        assert!(matcher.matches("AirwireAP-7f21"));
        assert!(!matcher.matches("AirwireAP-7f22"));
        assert!(!matcher.matches("AirwireAP"));
    }
}
