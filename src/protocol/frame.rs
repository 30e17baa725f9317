//! Typed command and response frames.
//!
//! [`Command`] is the frontend → broker direction, [`Response`] the broker →
//! frontend direction. Decoding is fallible and never panics on garbled
//! input; encoding is total and always yields exactly [`FRAME_SIZE`] bytes.
//!
//! Both directions implement both operations so a frontend (and the test
//! suite) can speak the protocol with the same types.

use crate::wifi::MacAddr;

use super::wire_format::{
    control_code, DecodeError, Status, BSSID_LEN, CONTROL_CODE_SIZE, FRAME_SIZE, PSK_MAX, SSID_MAX,
};

// Connect payload offsets, relative to the start of the payload area.
const OFF_SSID_LEN: usize = 0;
const OFF_SSID: usize = OFF_SSID_LEN + 1;
const OFF_BSSID_SET: usize = OFF_SSID + SSID_MAX;
const OFF_BSSID: usize = OFF_BSSID_SET + 1;
const OFF_PSK_LEN: usize = OFF_BSSID + BSSID_LEN;
const OFF_PSK: usize = OFF_PSK_LEN + 1;

/// Credentials for a target network, received opaquely from the wire.
///
/// The broker passes the secret bytes through to the capability provider
/// without interpreting them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Network name (UTF-8, at most [`SSID_MAX`] bytes).
    pub ssid: String,
    /// Physical address of the access point, when the frontend pins one.
    pub bssid: Option<MacAddr>,
    /// Pre-shared secret, at most [`PSK_MAX`] bytes, opaque to the broker.
    pub psk: Vec<u8>,
}

impl ConnectRequest {
    /// Build a request, validating the wire limits.
    pub fn new(
        ssid: impl Into<String>,
        bssid: Option<MacAddr>,
        psk: impl Into<Vec<u8>>,
    ) -> Result<Self, DecodeError> {
        let ssid = ssid.into();
        let psk = psk.into();
        if ssid.is_empty() || ssid.len() > SSID_MAX {
            return Err(DecodeError::InvalidPayload("ssid length out of range"));
        }
        if psk.len() > PSK_MAX {
            return Err(DecodeError::InvalidPayload("psk length out of range"));
        }
        Ok(Self { ssid, bssid, psk })
    }
}

/// A decoded inbound command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Scan for the target device's network.
    Sync,
    /// Associate with the named network.
    Connect(ConnectRequest),
    /// Drop the current association.
    Unbind,
    /// Shut the broker down.
    Quit,
}

impl Command {
    /// The control code this command travels under.
    pub fn control_code(&self) -> u8 {
        match self {
            Command::Sync => control_code::SYNC,
            Command::Connect(_) => control_code::CONNECT,
            Command::Unbind => control_code::UNBIND,
            Command::Quit => control_code::QUIT,
        }
    }

    /// Decode a received datagram.
    ///
    /// The buffer must be exactly [`FRAME_SIZE`] bytes; anything else is a
    /// [`DecodeError::MalformedFrame`]. The broker→frontend codes (`STATUS`,
    /// `BIND_ACK`) are not valid inbound and decode as
    /// [`DecodeError::UnknownCommand`].
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() != FRAME_SIZE {
            return Err(DecodeError::MalformedFrame {
                expected: FRAME_SIZE,
                actual: buf.len(),
            });
        }

        match buf[0] {
            control_code::SYNC => Ok(Command::Sync),
            control_code::CONNECT => {
                Self::decode_connect(&buf[CONTROL_CODE_SIZE..]).map(Command::Connect)
            }
            control_code::UNBIND => Ok(Command::Unbind),
            control_code::QUIT => Ok(Command::Quit),
            other => Err(DecodeError::UnknownCommand(other)),
        }
    }

    fn decode_connect(payload: &[u8]) -> Result<ConnectRequest, DecodeError> {
        let ssid_len = payload[OFF_SSID_LEN] as usize;
        if ssid_len == 0 || ssid_len > SSID_MAX {
            return Err(DecodeError::InvalidPayload("ssid length out of range"));
        }
        let ssid = std::str::from_utf8(&payload[OFF_SSID..OFF_SSID + ssid_len])
            .map_err(|_| DecodeError::InvalidPayload("ssid is not valid UTF-8"))?
            .to_string();

        let bssid = match payload[OFF_BSSID_SET] {
            0 => None,
            1 => {
                let mut octets = [0u8; BSSID_LEN];
                octets.copy_from_slice(&payload[OFF_BSSID..OFF_BSSID + BSSID_LEN]);
                Some(MacAddr::new(octets))
            }
            _ => return Err(DecodeError::InvalidPayload("bssid flag out of range")),
        };

        let psk_len = payload[OFF_PSK_LEN] as usize;
        if psk_len > PSK_MAX {
            return Err(DecodeError::InvalidPayload("psk length out of range"));
        }
        let psk = payload[OFF_PSK..OFF_PSK + psk_len].to_vec();

        Ok(ConnectRequest { ssid, bssid, psk })
    }

    /// Encode into a wire frame.
    ///
    /// Total for any value built through [`ConnectRequest::new`]; oversized
    /// fields are truncated at the wire limit.
    pub fn encode(&self) -> [u8; FRAME_SIZE] {
        let mut buf = [0u8; FRAME_SIZE];
        buf[0] = self.control_code();

        if let Command::Connect(req) = self {
            let payload = &mut buf[CONTROL_CODE_SIZE..];

            let ssid = req.ssid.as_bytes();
            debug_assert!(ssid.len() <= SSID_MAX);
            let ssid_len = ssid.len().min(SSID_MAX);
            payload[OFF_SSID_LEN] = ssid_len as u8;
            payload[OFF_SSID..OFF_SSID + ssid_len].copy_from_slice(&ssid[..ssid_len]);

            if let Some(bssid) = &req.bssid {
                payload[OFF_BSSID_SET] = 1;
                payload[OFF_BSSID..OFF_BSSID + BSSID_LEN].copy_from_slice(bssid.octets());
            }

            debug_assert!(req.psk.len() <= PSK_MAX);
            let psk_len = req.psk.len().min(PSK_MAX);
            payload[OFF_PSK_LEN] = psk_len as u8;
            payload[OFF_PSK..OFF_PSK + psk_len].copy_from_slice(&req.psk[..psk_len]);
        }

        buf
    }
}

/// A broker → frontend reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// Status reply carrying a value from the closed vocabulary.
    Status(Status),
    /// Connect acknowledged; association is starting.
    BindAck,
}

impl Response {
    /// The control code this response travels under.
    pub fn control_code(&self) -> u8 {
        match self {
            Response::Status(_) => control_code::STATUS,
            Response::BindAck => control_code::BIND_ACK,
        }
    }

    /// Encode into a wire frame. Total: every response value encodes to
    /// exactly [`FRAME_SIZE`] bytes, status in network byte order, the rest
    /// of the payload area zeroed.
    pub fn encode(&self) -> [u8; FRAME_SIZE] {
        let mut buf = [0u8; FRAME_SIZE];
        buf[0] = self.control_code();
        if let Response::Status(status) = self {
            buf[CONTROL_CODE_SIZE..CONTROL_CODE_SIZE + 4]
                .copy_from_slice(&status.as_u32().to_be_bytes());
        }
        buf
    }

    /// Decode a response frame (frontend side).
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() != FRAME_SIZE {
            return Err(DecodeError::MalformedFrame {
                expected: FRAME_SIZE,
                actual: buf.len(),
            });
        }

        match buf[0] {
            control_code::STATUS => {
                let raw = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
                let status = Status::from_u32(raw)
                    .ok_or(DecodeError::InvalidPayload("status outside vocabulary"))?;
                Ok(Response::Status(status))
            }
            control_code::BIND_ACK => Ok(Response::BindAck),
            other => Err(DecodeError::UnknownCommand(other)),
        }
    }
}
