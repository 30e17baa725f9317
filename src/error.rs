//! Error types for the broker.

use thiserror::Error;

/// Top-level error for broker startup and runtime failures.
///
/// Per-packet problems (decode failures, state violations, provider
/// hiccups) never surface here; they are recovered inside the event loop
/// and turned into wire status codes or dropped. What remains is fatal:
/// the process exits non-zero after best-effort cleanup.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Socket bind or other unrecoverable I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Capability provider failed to initialize or release.
    #[error("wi-fi error: {0}")]
    Wifi(#[from] crate::wifi::WifiError),
}

/// Result type alias using [`BrokerError`].
pub type Result<T> = std::result::Result<T, BrokerError>;
