//! Protocol module - fixed-size command/response frames.
//!
//! Implements the datagram wire protocol:
//! - frame geometry and the closed control-code/status vocabularies
//! - [`Command`] decode (frontend → broker), [`Response`] encode (broker →
//!   frontend), plus the reverse direction for frontends and tests

mod frame;
mod wire_format;

pub use frame::{Command, ConnectRequest, Response};
pub use wire_format::{
    control_code, DecodeError, Status, BSSID_LEN, CONNECT_PAYLOAD_SIZE, CONTROL_CODE_SIZE,
    FRAME_SIZE, PAYLOAD_SIZE, PSK_MAX, SSID_MAX, STATUS_PAYLOAD_SIZE,
};
