//! # sorng-ftp-session: FTP/SFTP session and queue engine
//!
//! Owns one remote connection at a time, serialises file and directory
//! commands into a control queue and a transfer queue, keeps the link alive
//! with NOOPs and mirrors the remote tree for fast lookups. The wire
//! protocol, the UI and settings persistence are supplied by the host
//! through the traits in [`ftp_session::transport`] and
//! [`ftp_session::host`].

pub mod ftp_session;

pub use ftp_session::*;
