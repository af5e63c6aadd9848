//! Shared types for the session engine.

use crate::ftp_session::error::SessionError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Transfer ────────────────────────────────────────────────────────

/// Transfer type applied to a single upload or download.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TransferMode {
    Ascii,
    Binary,
}

impl Default for TransferMode {
    fn default() -> Self {
        Self::Binary
    }
}

// ─── Directory Listing ───────────────────────────────────────────────

/// Type of a remote filesystem entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RemoteEntryKind {
    File,
    Directory,
    Symlink,
    Unknown,
}

/// One entry of a directory listing as reported by the transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntry {
    pub name: String,
    pub kind: RemoteEntryKind,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub modified: Option<DateTime<Utc>>,
}

impl RemoteEntry {
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            kind: RemoteEntryKind::File,
            size,
            modified: None,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: RemoteEntryKind::Directory,
            size: 0,
            modified: None,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == RemoteEntryKind::Directory
    }
}

/// The contents of one remote directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryListing {
    pub path: String,
    pub entries: Vec<RemoteEntry>,
}

// ─── Queue events ────────────────────────────────────────────────────

/// Which variant of queued work an event refers to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum OperationType {
    Connect,
    Disconnect,
    GetDir,
    MkDir,
    RmDir,
    MkFile,
    DeleteFile,
    Rename,
    Upload,
    Download,
    NoOp,
}

/// Cloneable description of a queued operation, carried by every event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OperationInfo {
    pub id: String,
    pub op_type: OperationType,
    /// Remote path the operation targets (listing dir, transfer source or
    /// target, rename source).
    pub remote_path: Option<String>,
    /// Local file for path-based transfers.
    pub local_path: Option<String>,
    /// Rename destination.
    pub new_path: Option<String>,
    /// Ancestors listed ahead of the target of a directory fetch.
    #[serde(default)]
    pub parents: Vec<String>,
    /// Transfer goes through a host-supplied reader/writer.
    #[serde(default)]
    pub via_handle: bool,
    /// Host-defined code echoed back untouched.
    #[serde(default)]
    pub code: i32,
    pub queued_at: DateTime<Utc>,
}

/// What a successful operation produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum OperationOutput {
    None,
    /// Prefetched ancestors first, the requested directory last.
    Listings { listings: Vec<DirectoryListing> },
    Transferred { bytes: u64 },
    Created { path: String },
    Removed { path: String },
    Renamed { from: String, to: String },
}

/// Start or end of an operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum QueuePhase {
    Start,
    End {
        result: Result<OperationOutput, SessionError>,
    },
}

/// Notification posted to the host for every executed operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueueEvent {
    pub info: OperationInfo,
    pub phase: QueuePhase,
    pub timestamp: DateTime<Utc>,
}

impl QueueEvent {
    pub fn start(info: OperationInfo) -> Self {
        Self {
            info,
            phase: QueuePhase::Start,
            timestamp: Utc::now(),
        }
    }

    pub fn end(info: OperationInfo, result: Result<OperationOutput, SessionError>) -> Self {
        Self {
            info,
            phase: QueuePhase::End { result },
            timestamp: Utc::now(),
        }
    }

    pub fn is_start(&self) -> bool {
        matches!(self.phase, QueuePhase::Start)
    }

    pub fn is_end(&self) -> bool {
        matches!(self.phase, QueuePhase::End { .. })
    }

    /// The outcome, for end events.
    pub fn result(&self) -> Option<&Result<OperationOutput, SessionError>> {
        match &self.phase {
            QueuePhase::End { result } => Some(result),
            QueuePhase::Start => None,
        }
    }
}
