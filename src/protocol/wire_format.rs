//! Wire format constants and vocabularies.
//!
//! Every datagram on the command channel is exactly [`FRAME_SIZE`] bytes:
//!
//! ```text
//! ┌──────────────┬────────────────────────────────────────────────┐
//! │ Control code │ Payload area                                   │
//! │ 1 byte       │ 105 bytes (sized to the largest variant,       │
//! │              │ zero-padded)                                   │
//! └──────────────┴────────────────────────────────────────────────┘
//! ```
//!
//! The payload area is a union: a status reply uses the first 4 bytes, a
//! connect request uses all 105. All multi-byte integers are network byte
//! order (Big Endian).

use thiserror::Error;

/// Size of the leading control code byte.
pub const CONTROL_CODE_SIZE: usize = 1;

/// Maximum SSID length in bytes (802.11 limit).
pub const SSID_MAX: usize = 32;

/// Length of a BSSID (MAC address).
pub const BSSID_LEN: usize = 6;

/// Maximum pre-shared secret length in bytes.
///
/// Covers both a WPA passphrase (8-63 chars) and a hex-encoded 256-bit key
/// (64 chars). The broker never interprets these bytes.
pub const PSK_MAX: usize = 64;

/// Size of the connect payload: ssid length + ssid + bssid presence flag +
/// bssid + psk length + psk.
pub const CONNECT_PAYLOAD_SIZE: usize = 1 + SSID_MAX + 1 + BSSID_LEN + 1 + PSK_MAX;

/// Size of the status payload: one `u32` in network byte order.
pub const STATUS_PAYLOAD_SIZE: usize = 4;

/// Size of the payload area (largest variant wins).
pub const PAYLOAD_SIZE: usize = CONNECT_PAYLOAD_SIZE;

/// Total frame size, fixed and known at compile time.
pub const FRAME_SIZE: usize = CONTROL_CODE_SIZE + PAYLOAD_SIZE;

/// Control codes for the command channel (closed set).
pub mod control_code {
    /// Frontend → broker: scan for the target device's network.
    pub const SYNC: u8 = 0x01;
    /// Frontend → broker: associate using the carried credentials.
    pub const CONNECT: u8 = 0x02;
    /// Frontend → broker: drop the current association.
    pub const UNBIND: u8 = 0x03;
    /// Frontend → broker: shut the broker down.
    pub const QUIT: u8 = 0x04;
    /// Broker → frontend: status reply.
    pub const STATUS: u8 = 0x05;
    /// Broker → frontend: connect request acknowledged, association started.
    pub const BIND_ACK: u8 = 0x06;
}

/// Status values carried in a `STATUS` reply (closed vocabulary).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Status {
    /// Operation completed.
    Success = 0,
    /// Operation failed; no further detail crosses the wire.
    ErrGeneric = 1,
    /// The requested network was not seen in a scan.
    ErrNotFound = 2,
    /// Command not valid in the current session state.
    ErrInvalidState = 3,
}

impl Status {
    /// Wire representation (host order; callers apply byte order).
    #[inline]
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Parse a wire value back into the vocabulary.
    ///
    /// Returns `None` for values outside the closed set.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Status::Success),
            1 => Some(Status::ErrGeneric),
            2 => Some(Status::ErrNotFound),
            3 => Some(Status::ErrInvalidState),
            _ => None,
        }
    }
}

/// Errors produced while decoding an inbound datagram.
///
/// All of these are non-fatal: the event loop logs the packet and drops it
/// without replying, so the broker cannot be used as a reflection vector.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Datagram length does not match the fixed frame size.
    #[error("malformed frame: expected {expected} bytes, got {actual}")]
    MalformedFrame { expected: usize, actual: usize },

    /// Frame-sized datagram with a control code outside the inbound set.
    #[error("unknown control code {0:#04x}")]
    UnknownCommand(u8),

    /// Recognized control code but the payload fields are out of range.
    #[error("invalid payload: {0}")]
    InvalidPayload(&'static str),
}
