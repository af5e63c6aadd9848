//! # FTP session engine
//!
//! Architecture:
//! - `types`: events, listings, transfer mode
//! - `error`: session error type
//! - `paths`: remote path helpers
//! - `profile`: connection profiles, cache mapping, global settings
//! - `host`: notification sink and confirmation prompt traits
//! - `transport`: the wire client trait and its factory
//! - `tree`: cached remote directory tree
//! - `operations`: queued units of work
//! - `queue`: serial worker queue bound to one client
//! - `keepalive`: NOOP timer
//! - `session`: lifecycle and command surface

pub mod types;
pub mod error;
pub mod paths;
pub mod profile;
pub mod host;
pub mod transport;
pub mod tree;
pub mod operations;
pub mod queue;
pub mod keepalive;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{SessionError, SessionErrorKind, SessionResult};
pub use host::{ConfirmPrompt, NotificationSink, SessionHost};
pub use profile::{CacheMap, FtpProfile, FtpSecurityMode, FtpSettings, GlobalCache, TransferModeRules};
pub use session::FtpSession;
pub use transport::{TransportClient, TransportFactory, TrustedCertificates};
pub use tree::{FileNode, FileTree, NodeId, ROOT};
pub use types::*;
