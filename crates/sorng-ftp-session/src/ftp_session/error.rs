//! Session-level error type.
//!
//! Lifecycle and argument failures are returned synchronously to the
//! caller; transport failures of queued operations only ever travel inside
//! the end-of-operation [`QueueEvent`](crate::ftp_session::types::QueueEvent).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Categorised session error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionError {
    pub kind: SessionErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionErrorKind {
    /// A command was issued while no session is running.
    NotConnected,
    /// `start_session` called while a session is already active.
    AlreadyRunning,
    /// `init` called twice.
    AlreadyInitialized,
    /// The session has not been bound to a host yet.
    NotInitialized,
    /// The transport client could not be created or cloned.
    ConnectionSetupFailed,
    /// Missing source or target.
    InvalidArgument,
    /// A cached parent was listed and the requested child is not in it.
    PathNotFound,
    /// The user refused to close a session with transfers pending.
    TerminationDeclined,
    /// A path is not covered by any cache mapping.
    CacheMiss,
    /// No profile owns the given cache path.
    NoMatchingProfile,
    /// TCP / DNS / login failure reported by the transport.
    ConnectionFailed,
    /// Server refused a command.
    CommandRejected,
    /// Transfer incomplete or rejected.
    TransferFailed,
    /// The operation observed an abort request.
    Aborted,
    /// Local I/O error.
    IoError,
    /// Operation timed out.
    Timeout,
    /// Catch-all.
    Unknown,
}

pub type SessionResult<T> = Result<T, SessionError>;

// ── Construction helpers ─────────────────────────────────────────────

impl SessionError {
    pub fn new(kind: SessionErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
        }
    }

    pub fn not_connected() -> Self {
        Self::new(SessionErrorKind::NotConnected, "No FTP session is running")
    }

    pub fn already_running() -> Self {
        Self::new(
            SessionErrorKind::AlreadyRunning,
            "An FTP session is already running",
        )
    }

    pub fn already_initialized() -> Self {
        Self::new(
            SessionErrorKind::AlreadyInitialized,
            "Session is already bound to a host",
        )
    }

    pub fn not_initialized() -> Self {
        Self::new(
            SessionErrorKind::NotInitialized,
            "Session has not been bound to a host",
        )
    }

    pub fn connection_setup(msg: impl Into<String>) -> Self {
        Self::new(SessionErrorKind::ConnectionSetupFailed, msg)
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::new(SessionErrorKind::InvalidArgument, msg)
    }

    pub fn path_not_found(path: &str) -> Self {
        Self::new(
            SessionErrorKind::PathNotFound,
            format!("'{}' does not exist in the listed parent", path),
        )
    }

    pub fn termination_declined(pending: usize) -> Self {
        Self::new(
            SessionErrorKind::TerminationDeclined,
            format!("Close cancelled with {} transfer(s) pending", pending),
        )
    }

    pub fn cache_miss(msg: impl Into<String>) -> Self {
        Self::new(SessionErrorKind::CacheMiss, msg)
    }

    pub fn no_matching_profile(msg: impl Into<String>) -> Self {
        Self::new(SessionErrorKind::NoMatchingProfile, msg)
    }

    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::new(SessionErrorKind::ConnectionFailed, msg)
    }

    pub fn command_rejected(msg: impl Into<String>) -> Self {
        Self::new(SessionErrorKind::CommandRejected, msg)
    }

    pub fn transfer_failed(msg: impl Into<String>) -> Self {
        Self::new(SessionErrorKind::TransferFailed, msg)
    }

    pub fn aborted(msg: impl Into<String>) -> Self {
        Self::new(SessionErrorKind::Aborted, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(SessionErrorKind::IoError, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(SessionErrorKind::Timeout, msg)
    }

    /// Whether the error was produced before anything was queued.
    pub fn is_synchronous(&self) -> bool {
        matches!(
            self.kind,
            SessionErrorKind::NotConnected
                | SessionErrorKind::AlreadyRunning
                | SessionErrorKind::AlreadyInitialized
                | SessionErrorKind::NotInitialized
                | SessionErrorKind::ConnectionSetupFailed
                | SessionErrorKind::InvalidArgument
                | SessionErrorKind::PathNotFound
                | SessionErrorKind::TerminationDeclined
                | SessionErrorKind::CacheMiss
                | SessionErrorKind::NoMatchingProfile
        )
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[FTP session {:?}] {}", self.kind, self.message)
    }
}

impl std::error::Error for SessionError {}

impl From<std::io::Error> for SessionError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut => Self::timeout(format!("I/O timeout: {}", e)),
            std::io::ErrorKind::Interrupted => Self::aborted(e.to_string()),
            _ => Self::io_error(e.to_string()),
        }
    }
}

impl From<SessionError> for String {
    fn from(e: SessionError) -> String {
        e.message
    }
}
