//! The wire-protocol client the session drives.
//!
//! The session never speaks FTP or SFTP itself. It only sequences calls on
//! a [`TransportClient`]; the concrete client (FTP, FTPS, SFTP) is produced
//! by a [`TransportFactory`] from the profile.

use crate::ftp_session::error::SessionResult;
use crate::ftp_session::profile::FtpProfile;
use crate::ftp_session::types::{RemoteEntry, TransferMode};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

/// DER-encoded certificates the user has chosen to trust.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustedCertificates {
    pub der: Vec<Vec<u8>>,
}

impl TrustedCertificates {
    pub fn new(der: Vec<Vec<u8>>) -> Self {
        Self { der }
    }
}

/// One remote connection.
///
/// All methods take `&self` so that [`abort`](TransportClient::abort) can
/// be signalled from the host while a queue worker is inside a transfer.
#[async_trait]
pub trait TransportClient: Send + Sync {
    async fn connect(&self) -> SessionResult<()>;
    async fn disconnect(&self) -> SessionResult<()>;

    async fn cwd(&self, path: &str) -> SessionResult<()>;
    async fn pwd(&self) -> SessionResult<String>;
    async fn list(&self, path: &str) -> SessionResult<Vec<RemoteEntry>>;

    async fn mkdir(&self, path: &str) -> SessionResult<()>;
    async fn rmdir(&self, path: &str) -> SessionResult<()>;
    async fn create_file(&self, path: &str) -> SessionResult<()>;
    async fn delete_file(&self, path: &str) -> SessionResult<()>;
    async fn rename(&self, from: &str, to: &str) -> SessionResult<()>;

    /// Upload a local file; returns the number of bytes sent.
    async fn upload(&self, local: &Path, remote: &str, mode: TransferMode) -> SessionResult<u64>;

    async fn upload_from(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        remote: &str,
        mode: TransferMode,
    ) -> SessionResult<u64>;

    /// Download into a local file; returns the number of bytes received.
    async fn download(&self, remote: &str, local: &Path, mode: TransferMode)
        -> SessionResult<u64>;

    async fn download_to(
        &self,
        remote: &str,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
        mode: TransferMode,
    ) -> SessionResult<u64>;

    async fn noop(&self) -> SessionResult<()>;

    /// Ask the in-flight command to stop. Advisory: the running call
    /// returns an `Aborted` error when it notices.
    fn abort(&self);

    /// A second, independent client for the same profile.
    fn try_clone(&self) -> SessionResult<Arc<dyn TransportClient>>;

    fn set_certificates(&self, certificates: Arc<TrustedCertificates>);

    /// Seconds since the last command went over the wire (0 = never used).
    fn seconds_since_last_action(&self) -> u64;
}

/// Builds the transport client for a profile.
pub trait TransportFactory: Send + Sync {
    fn create(&self, profile: &FtpProfile) -> SessionResult<Arc<dyn TransportClient>>;
}
