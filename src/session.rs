//! Session lifecycle state machine.
//!
//! A [`Session`] is the broker's single in-memory record of where the Wi-Fi
//! lifecycle stands. It is created once at startup, mutated only by the
//! event loop, and enforces which commands are legal in which state:
//!
//! ```text
//! Idle ──sync──▶ Scanning ──▶ Idle
//! Idle ──connect──▶ Associated ──unbind──▶ Idle
//! any ──quit──▶ ShuttingDown (terminal)
//! ```
//!
//! `Scanning` is transient: it is entered and left within a single command,
//! so no frame ever observes it from outside.

use thiserror::Error;

/// Lifecycle states of the broker session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No association, ready for commands.
    Idle,
    /// A discovery scan is in progress (transient).
    Scanning,
    /// Associated with a target network.
    Associated,
    /// Quit received; no further commands are processed.
    ShuttingDown,
}

/// A command arrived in a state where it is not legal.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{command} not valid while {state:?}")]
pub struct StateError {
    /// The offending command, by wire name.
    pub command: &'static str,
    /// The state the session was in.
    pub state: SessionState,
}

/// The broker's session record: lifecycle state plus the currently
/// associated network, if any.
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    /// Where a transient scan started, so a failed scan can fall back.
    scan_origin: SessionState,
    current_network: Option<String>,
}

impl Session {
    /// A fresh idle session.
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            scan_origin: SessionState::Idle,
            current_network: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Name of the currently associated network.
    pub fn current_network(&self) -> Option<&str> {
        self.current_network.as_deref()
    }

    /// Whether a quit has been accepted.
    pub fn is_shutting_down(&self) -> bool {
        self.state == SessionState::ShuttingDown
    }

    /// Enter the transient scanning state. Legal from `Idle` and
    /// `Associated`.
    pub fn begin_scan(&mut self) -> Result<(), StateError> {
        match self.state {
            SessionState::Idle | SessionState::Associated => {
                self.scan_origin = self.state;
                self.state = SessionState::Scanning;
                Ok(())
            }
            state => Err(StateError {
                command: "sync",
                state,
            }),
        }
    }

    /// Leave a successful scan. The session settles in `Idle`: discovery
    /// hands the found network to the frontend, which is expected to bind
    /// explicitly afterwards.
    pub fn scan_succeeded(&mut self) {
        debug_assert_eq!(self.state, SessionState::Scanning);
        self.state = SessionState::Idle;
        self.current_network = None;
    }

    /// Leave a failed scan, falling back to the state it started from.
    pub fn scan_failed(&mut self) {
        debug_assert_eq!(self.state, SessionState::Scanning);
        self.state = self.scan_origin;
    }

    /// Whether an association attempt may start now. Legal from `Idle` only.
    pub fn connect_allowed(&self) -> Result<(), StateError> {
        match self.state {
            SessionState::Idle => Ok(()),
            state => Err(StateError {
                command: "connect",
                state,
            }),
        }
    }

    /// Record a completed association.
    pub fn mark_associated(&mut self, ssid: impl Into<String>) {
        debug_assert_eq!(self.state, SessionState::Idle);
        self.state = SessionState::Associated;
        self.current_network = Some(ssid.into());
    }

    /// Force the session back to `Idle`, dropping any association record.
    /// Used by unbind and by association failure cleanup; legal regardless
    /// of prior state (idempotent).
    pub fn force_idle(&mut self) {
        if self.state != SessionState::ShuttingDown {
            self.state = SessionState::Idle;
        }
        self.current_network = None;
    }

    /// Enter the terminal state. Legal from any state.
    pub fn begin_shutdown(&mut self) {
        self.state = SessionState::ShuttingDown;
        self.current_network = None;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
