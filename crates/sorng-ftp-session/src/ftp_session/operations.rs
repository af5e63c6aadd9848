//! Queued units of work.
//!
//! A [`QueueOperation`] is built by the session, handed to a queue, bound
//! to that queue's client right before it runs, and consumed by
//! [`QueueOperation::run`]. Every run posts exactly one Start and one End
//! event to the notification sink.

use crate::ftp_session::error::{SessionError, SessionResult};
use crate::ftp_session::host::NotificationSink;
use crate::ftp_session::transport::TransportClient;
use crate::ftp_session::types::*;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

/// Payload of a queued operation.
pub enum OperationKind {
    Connect,
    Disconnect,
    /// List `parents` in order, then `path`.
    GetDir {
        path: String,
        parents: Vec<String>,
    },
    MkDir {
        path: String,
    },
    RmDir {
        path: String,
    },
    MkFile {
        path: String,
    },
    DeleteFile {
        path: String,
    },
    Rename {
        from: String,
        to: String,
    },
    Upload {
        local: PathBuf,
        remote: String,
        mode: TransferMode,
    },
    UploadHandle {
        reader: Box<dyn AsyncRead + Send + Unpin>,
        remote: String,
        mode: TransferMode,
    },
    Download {
        remote: String,
        local: PathBuf,
        mode: TransferMode,
    },
    DownloadHandle {
        remote: String,
        writer: Box<dyn AsyncWrite + Send + Unpin>,
        mode: TransferMode,
    },
    NoOp,
}

impl OperationKind {
    pub fn op_type(&self) -> OperationType {
        match self {
            Self::Connect => OperationType::Connect,
            Self::Disconnect => OperationType::Disconnect,
            Self::GetDir { .. } => OperationType::GetDir,
            Self::MkDir { .. } => OperationType::MkDir,
            Self::RmDir { .. } => OperationType::RmDir,
            Self::MkFile { .. } => OperationType::MkFile,
            Self::DeleteFile { .. } => OperationType::DeleteFile,
            Self::Rename { .. } => OperationType::Rename,
            Self::Upload { .. } | Self::UploadHandle { .. } => OperationType::Upload,
            Self::Download { .. } | Self::DownloadHandle { .. } => OperationType::Download,
            Self::NoOp => OperationType::NoOp,
        }
    }

    fn remote_path(&self) -> Option<&str> {
        match self {
            Self::GetDir { path, .. }
            | Self::MkDir { path }
            | Self::RmDir { path }
            | Self::MkFile { path }
            | Self::DeleteFile { path } => Some(path.as_str()),
            Self::Rename { from, .. } => Some(from.as_str()),
            Self::Upload { remote, .. }
            | Self::UploadHandle { remote, .. }
            | Self::Download { remote, .. }
            | Self::DownloadHandle { remote, .. } => Some(remote.as_str()),
            Self::Connect | Self::Disconnect | Self::NoOp => None,
        }
    }

    fn local_path(&self) -> Option<&Path> {
        match self {
            Self::Upload { local, .. } | Self::Download { local, .. } => Some(local.as_path()),
            _ => None,
        }
    }

    /// Run the payload against a client.
    pub async fn execute(self, client: &dyn TransportClient) -> SessionResult<OperationOutput> {
        match self {
            Self::Connect => {
                client.connect().await?;
                Ok(OperationOutput::None)
            }
            Self::Disconnect => {
                client.disconnect().await?;
                Ok(OperationOutput::None)
            }
            Self::GetDir { path, parents } => {
                let mut listings = Vec::with_capacity(parents.len() + 1);
                for dir in parents.into_iter().chain(std::iter::once(path)) {
                    let entries = client.list(&dir).await?;
                    listings.push(DirectoryListing { path: dir, entries });
                }
                Ok(OperationOutput::Listings { listings })
            }
            Self::MkDir { path } => {
                client.mkdir(&path).await?;
                Ok(OperationOutput::Created { path })
            }
            Self::RmDir { path } => {
                client.rmdir(&path).await?;
                Ok(OperationOutput::Removed { path })
            }
            Self::MkFile { path } => {
                client.create_file(&path).await?;
                Ok(OperationOutput::Created { path })
            }
            Self::DeleteFile { path } => {
                client.delete_file(&path).await?;
                Ok(OperationOutput::Removed { path })
            }
            Self::Rename { from, to } => {
                client.rename(&from, &to).await?;
                Ok(OperationOutput::Renamed { from, to })
            }
            Self::Upload {
                local,
                remote,
                mode,
            } => {
                let bytes = client.upload(&local, &remote, mode).await?;
                Ok(OperationOutput::Transferred { bytes })
            }
            Self::UploadHandle {
                mut reader,
                remote,
                mode,
            } => {
                let bytes = client.upload_from(&mut *reader, &remote, mode).await?;
                Ok(OperationOutput::Transferred { bytes })
            }
            Self::Download {
                remote,
                local,
                mode,
            } => {
                if let Some(parent) = local.parent() {
                    fs::create_dir_all(parent).await?;
                }
                let bytes = client.download(&remote, &local, mode).await?;
                Ok(OperationOutput::Transferred { bytes })
            }
            Self::DownloadHandle {
                remote,
                mut writer,
                mode,
            } => {
                let bytes = client.download_to(&remote, &mut *writer, mode).await?;
                writer.flush().await?;
                Ok(OperationOutput::Transferred { bytes })
            }
            Self::NoOp => {
                client.noop().await?;
                Ok(OperationOutput::None)
            }
        }
    }
}

impl fmt::Debug for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("OperationKind");
        d.field("type", &self.op_type());
        if let Some(remote) = self.remote_path() {
            d.field("remote", &remote);
        }
        if let Some(local) = self.local_path() {
            d.field("local", &local);
        }
        d.finish()
    }
}

// ─── Queue operation ─────────────────────────────────────────────────

/// One enqueued operation.
pub struct QueueOperation {
    id: String,
    code: i32,
    sink: Arc<dyn NotificationSink>,
    client: Option<Arc<dyn TransportClient>>,
    kind: OperationKind,
    queued_at: DateTime<Utc>,
}

impl QueueOperation {
    pub fn new(sink: Arc<dyn NotificationSink>, kind: OperationKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            code: 0,
            sink,
            client: None,
            kind,
            queued_at: Utc::now(),
        }
    }

    /// Attach a host-defined code echoed back in every event.
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = code;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn op_type(&self) -> OperationType {
        self.kind.op_type()
    }

    /// Snapshot carried by the events of this operation.
    pub fn info(&self) -> OperationInfo {
        let (new_path, parents) = match &self.kind {
            OperationKind::Rename { to, .. } => (Some(to.clone()), Vec::new()),
            OperationKind::GetDir { parents, .. } => (None, parents.clone()),
            _ => (None, Vec::new()),
        };
        OperationInfo {
            id: self.id.clone(),
            op_type: self.kind.op_type(),
            remote_path: self.kind.remote_path().map(str::to_string),
            local_path: self
                .kind
                .local_path()
                .map(|p| p.to_string_lossy().into_owned()),
            new_path,
            parents,
            via_handle: matches!(
                self.kind,
                OperationKind::UploadHandle { .. } | OperationKind::DownloadHandle { .. }
            ),
            code: self.code,
            queued_at: self.queued_at,
        }
    }

    /// Bind the client the operation will run on.
    pub fn set_client(&mut self, client: Arc<dyn TransportClient>) {
        self.client = Some(client);
    }

    /// Post Start, execute, post End. The outcome is also returned to the
    /// caller.
    pub async fn run(self) -> SessionResult<OperationOutput> {
        let info = self.info();
        self.sink.post(QueueEvent::start(info.clone()));

        let result = match self.client {
            Some(client) => self.kind.execute(client.as_ref()).await,
            None => Err(SessionError::not_connected()),
        };

        self.sink.post(QueueEvent::end(info, result.clone()));
        result
    }
}

impl fmt::Debug for QueueOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueOperation")
            .field("id", &self.id)
            .field("code", &self.code)
            .field("kind", &self.kind)
            .field("bound", &self.client.is_some())
            .finish()
    }
}
