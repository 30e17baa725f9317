//! NetworkManager-backed capability provider.
//!
//! Drives Wi-Fi through `nmcli`, NetworkManager's command-line front door.
//! Association delegates DHCP and route setup to NetworkManager itself, so
//! the broker never configures addresses.
//!
//! Parsing targets `nmcli -t` (terse) output, where fields are separated by
//! `:` and literal colons inside a value (BSSIDs, some SSIDs) are escaped
//! with a backslash.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{MacAddr, NetworkId, TargetMatcher, WifiError, WifiProvider};

/// Capability provider backed by NetworkManager's `nmcli`.
#[derive(Debug, Default)]
pub struct NmcliProvider {
    /// Resolved wireless interface name, set by `init`.
    interface: Option<String>,
}

impl NmcliProvider {
    /// Create an uninitialized provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// The interface resolved by `init`, if any.
    pub fn interface(&self) -> Option<&str> {
        self.interface.as_deref()
    }

    async fn run(&self, args: &[&str]) -> Result<String, WifiError> {
        debug!(?args, "running nmcli");
        let output = Command::new("nmcli").args(args).output().await?;
        if !output.status.success() {
            return Err(WifiError::CommandFailed {
                program: "nmcli",
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl WifiProvider for NmcliProvider {
    async fn init(&mut self, interface: Option<&str>) -> Result<(), WifiError> {
        let listing = self
            .run(&["-t", "-f", "DEVICE,TYPE", "device", "status"])
            .await
            .map_err(|e| WifiError::InitFailed(e.to_string()))?;

        let resolved = match interface {
            Some(name) => {
                if !wifi_devices(&listing).any(|dev| dev == name) {
                    return Err(WifiError::InitFailed(format!(
                        "{name} is not a managed wi-fi device"
                    )));
                }
                name.to_string()
            }
            None => wifi_devices(&listing)
                .next()
                .map(str::to_string)
                .ok_or_else(|| WifiError::InitFailed("no wi-fi device found".to_string()))?,
        };

        info!(interface = %resolved, "wi-fi interface under control");
        self.interface = Some(resolved);
        Ok(())
    }

    async fn scan_for_target(&mut self, matcher: &TargetMatcher) -> Result<NetworkId, WifiError> {
        let mut args = vec![
            "-t",
            "-f",
            "SSID,BSSID",
            "device",
            "wifi",
            "list",
            "--rescan",
            "yes",
        ];
        if let Some(iface) = self.interface.as_deref() {
            args.extend(["ifname", iface]);
        }
        let listing = self.run(&args).await?;
        find_target(&listing, matcher).ok_or(WifiError::NotFound)
    }

    async fn associate(
        &mut self,
        ssid: &str,
        bssid: Option<&MacAddr>,
        psk: &[u8],
    ) -> Result<(), WifiError> {
        // The secret-encoding contract lives here: the broker hands the psk
        // bytes through untouched and this backend renders them as a UTF-8
        // passphrase for NetworkManager.
        let args = associate_args(ssid, bssid, psk, self.interface.as_deref());
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        match self.run(&args).await {
            Ok(_) => Ok(()),
            Err(WifiError::CommandFailed { stderr, .. }) => {
                Err(WifiError::AssociationFailed(stderr))
            }
            Err(e) => Err(e),
        }
    }

    async fn disassociate(&mut self) -> Result<(), WifiError> {
        let Some(iface) = self.interface.clone() else {
            return Ok(());
        };
        match self.run(&["device", "disconnect", &iface]).await {
            Ok(_) => Ok(()),
            // Disconnecting an already-idle device is not an error: the
            // contract requires idempotence.
            Err(WifiError::CommandFailed { stderr, .. }) if is_not_active(&stderr) => {
                debug!(interface = %iface, "already disconnected");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn is_connected(&mut self) -> bool {
        let Some(iface) = self.interface.clone() else {
            return false;
        };
        match self
            .run(&["-t", "-f", "GENERAL.STATE", "device", "show", &iface])
            .await
        {
            Ok(output) => device_connected(&output),
            Err(e) => {
                warn!(error = %e, "link state query failed");
                false
            }
        }
    }

    async fn get_ip_address(&mut self) -> Result<String, WifiError> {
        let Some(iface) = self.interface.clone() else {
            return Err(WifiError::NoAddress);
        };
        let output = self
            .run(&["-t", "-f", "IP4.ADDRESS", "device", "show", &iface])
            .await?;
        first_ip_address(&output).ok_or(WifiError::NoAddress)
    }

    async fn cleanup(&mut self) {
        // NetworkManager keeps owning the device; nothing to release beyond
        // forgetting the interface.
        debug!(interface = ?self.interface, "releasing wi-fi control");
        self.interface = None;
    }
}

/// Split one `nmcli -t` line into fields, honoring backslash escapes.
fn split_terse(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            ':' => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// Names of managed wi-fi devices from `nmcli -t -f DEVICE,TYPE device status` output.
fn wifi_devices(listing: &str) -> impl Iterator<Item = &str> {
    listing.lines().filter_map(|line| {
        let (device, ty) = line.split_once(':')?;
        (ty == "wifi" && !device.is_empty()).then_some(device)
    })
}

/// First scan result satisfying the matcher, from `SSID,BSSID` terse output.
fn find_target(listing: &str, matcher: &TargetMatcher) -> Option<NetworkId> {
    listing.lines().find_map(|line| {
        let fields = split_terse(line);
        let ssid = fields.first().filter(|s| !s.is_empty())?;
        if !matcher.matches(ssid) {
            return None;
        }
        Some(NetworkId {
            ssid: ssid.clone(),
            bssid: fields.get(1).and_then(|b| MacAddr::parse(b)),
        })
    })
}

/// Argument vector for `nmcli device wifi connect`.
fn associate_args(
    ssid: &str,
    bssid: Option<&MacAddr>,
    psk: &[u8],
    interface: Option<&str>,
) -> Vec<String> {
    let mut args: Vec<String> = ["device", "wifi", "connect", ssid]
        .into_iter()
        .map(str::to_string)
        .collect();
    if !psk.is_empty() {
        args.push("password".to_string());
        args.push(String::from_utf8_lossy(psk).into_owned());
    }
    if let Some(bssid) = bssid {
        args.push("bssid".to_string());
        args.push(bssid.to_string());
    }
    if let Some(iface) = interface {
        args.push("ifname".to_string());
        args.push(iface.to_string());
    }
    args
}

/// Whether a `GENERAL.STATE` terse line reports a connected device.
fn device_connected(output: &str) -> bool {
    output
        .lines()
        .any(|line| line.starts_with("GENERAL.STATE") && line.contains("(connected)"))
}

/// First IPv4 address (without prefix length) from `IP4.ADDRESS` terse output.
fn first_ip_address(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let fields = split_terse(line);
        if !fields.first()?.starts_with("IP4.ADDRESS") {
            return None;
        }
        let value = fields.get(1)?;
        let address = value.split('/').next()?;
        (!address.is_empty()).then(|| address.to_string())
    })
}

/// Whether a disconnect failure means the device was already idle.
fn is_not_active(stderr: &str) -> bool {
    let lower = stderr.to_ascii_lowercase();
    lower.contains("not active") || lower.contains("not connected")
}
