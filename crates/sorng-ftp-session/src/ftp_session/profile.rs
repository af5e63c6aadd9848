//! Connection profiles and global settings consumed by the session.
//!
//! Persistence lives with the host; these types only describe the data
//! and the policies derived from it (cache path mapping, transfer mode).

use crate::ftp_session::error::{SessionError, SessionResult};
use crate::ftp_session::paths;
use crate::ftp_session::types::TransferMode;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::sync::{PoisonError, RwLock};

// ─── Profile ─────────────────────────────────────────────────────────

/// Protocol and channel security for a profile.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FtpSecurityMode {
    /// Plain-text FTP (port 21).
    Ftp,
    /// Explicit FTPS, AUTH TLS on the plain port.
    FtpsExplicit,
    /// Implicit FTPS, TLS from the first byte (port 990).
    FtpsImplicit,
    /// SFTP over SSH (port 22).
    Sftp,
}

impl Default for FtpSecurityMode {
    fn default() -> Self {
        Self::Ftp
    }
}

impl FtpSecurityMode {
    pub fn default_port(self) -> u16 {
        match self {
            Self::Ftp | Self::FtpsExplicit => 21,
            Self::FtpsImplicit => 990,
            Self::Sftp => 22,
        }
    }
}

/// Maps a local folder onto a remote folder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CacheMap {
    pub local: PathBuf,
    pub external: String,
}

/// File-name rules deciding ASCII vs binary transfers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransferModeRules {
    /// Glob patterns transferred as ASCII (e.g. `*.txt`).
    #[serde(default)]
    pub ascii_patterns: Vec<String>,
    /// Glob patterns transferred as binary.
    #[serde(default)]
    pub binary_patterns: Vec<String>,
    #[serde(default)]
    pub default_mode: TransferMode,
}

impl Default for TransferModeRules {
    fn default() -> Self {
        Self {
            ascii_patterns: Vec::new(),
            binary_patterns: Vec::new(),
            default_mode: TransferMode::Binary,
        }
    }
}

impl TransferModeRules {
    /// Pick the mode for `file_name`. ASCII rules win over binary ones;
    /// unparseable patterns are ignored.
    pub fn mode_for(&self, file_name: &str) -> TransferMode {
        let matches = |patterns: &[String]| {
            patterns.iter().any(|p| {
                glob::Pattern::new(p)
                    .map(|pat| pat.matches(file_name))
                    .unwrap_or(false)
            })
        };
        if matches(&self.ascii_patterns) {
            TransferMode::Ascii
        } else if matches(&self.binary_patterns) {
            TransferMode::Binary
        } else {
            self.default_mode
        }
    }
}

/// A saved FTP/SFTP connection profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FtpProfile {
    pub name: String,
    pub hostname: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub security: FtpSecurityMode,
    /// Remote directory to open after connecting. Ignored unless absolute.
    #[serde(default)]
    pub initial_directory: String,
    /// Keep-alive interval in seconds (0 = disabled).
    #[serde(default)]
    pub noop_interval_secs: u64,
    #[serde(default)]
    pub cache_maps: Vec<CacheMap>,
    #[serde(default)]
    pub transfer_rules: TransferModeRules,
}

fn default_port() -> u16 {
    21
}

impl Default for FtpProfile {
    fn default() -> Self {
        Self {
            name: String::new(),
            hostname: String::new(),
            port: default_port(),
            username: "anonymous".into(),
            password: String::new(),
            security: FtpSecurityMode::Ftp,
            initial_directory: String::new(),
            noop_interval_secs: 0,
            cache_maps: Vec::new(),
            transfer_rules: TransferModeRules::default(),
        }
    }
}

impl FtpProfile {
    /// Transfer mode for a file name according to the profile rules.
    pub fn transfer_mode_for(&self, file_name: &str) -> TransferMode {
        self.transfer_rules.mode_for(file_name)
    }

    /// Whether two profiles point at the same account.
    pub fn same_account(&self, other: &FtpProfile) -> bool {
        self.hostname == other.hostname && self.username == other.username
    }

    /// Local cache file for a remote path. Profile mappings are tried first,
    /// then the global cache folder of this account.
    pub fn cache_local(&self, external: &str, cache: &GlobalCache) -> SessionResult<PathBuf> {
        if paths::segments(external).any(|seg| seg == "." || seg == "..") {
            return Err(SessionError::invalid_argument(format!(
                "Relative segments are not allowed in '{}'",
                external
            )));
        }
        let external = paths::normalize(external);
        for map in &self.cache_maps {
            if let Some(rest) = paths::strip_prefix(&external, &map.external) {
                return Ok(append_remote(&map.local, rest));
            }
        }
        let dir = cache.account_dir(&self.hostname, &self.username);
        Ok(append_remote(&dir, external.trim_start_matches('/')))
    }

    /// Remote path for a local cache file.
    pub fn cache_external(&self, local: &Path, cache: &GlobalCache) -> SessionResult<String> {
        for map in &self.cache_maps {
            if let Ok(rest) = local.strip_prefix(&map.local) {
                return append_local(&paths::normalize(&map.external), rest);
            }
        }
        let dir = cache.account_dir(&self.hostname, &self.username);
        match local.strip_prefix(&dir) {
            Ok(rest) => append_local("/", rest),
            Err(_) => Err(SessionError::cache_miss(format!(
                "'{}' is not inside any cache folder of {}@{}",
                local.display(),
                self.username,
                self.hostname
            ))),
        }
    }
}

fn append_remote(base: &Path, rest: &str) -> PathBuf {
    paths::segments(rest).fold(base.to_path_buf(), |acc, seg| acc.join(seg))
}

fn append_local(base: &str, rest: &Path) -> SessionResult<String> {
    let mut out = base.to_string();
    for component in rest.components() {
        match component {
            Component::Normal(seg) => out = paths::join(&out, &seg.to_string_lossy()),
            _ => {
                return Err(SessionError::cache_miss(format!(
                    "'{}' leaves the cache folder",
                    rest.display()
                )))
            }
        }
    }
    Ok(out)
}

// ─── Settings ────────────────────────────────────────────────────────

/// Account the global cache is currently scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEnvironment {
    pub hostname: String,
    pub username: String,
}

/// Shared cache folder; one sub-folder per `user@host`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalCache {
    #[serde(default = "default_cache_root")]
    pub root: PathBuf,
    #[serde(skip)]
    environment: RwLock<Option<CacheEnvironment>>,
}

fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("sortofremote-ng")
        .join("ftp-cache")
}

impl Default for GlobalCache {
    fn default() -> Self {
        Self::new(default_cache_root())
    }
}

impl GlobalCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            environment: RwLock::new(None),
        }
    }

    /// Scope the cache to the account of the session being started.
    pub fn set_environment(&self, hostname: &str, username: &str) {
        let mut env = self
            .environment
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *env = Some(CacheEnvironment {
            hostname: hostname.to_string(),
            username: username.to_string(),
        });
    }

    pub fn environment(&self) -> Option<CacheEnvironment> {
        self.environment
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Cache folder of one account.
    pub fn account_dir(&self, hostname: &str, username: &str) -> PathBuf {
        self.root.join(format!("{}@{}", username, hostname))
    }

    /// Cache folder of the current environment, if one is set.
    pub fn environment_dir(&self) -> Option<PathBuf> {
        self.environment()
            .map(|env| self.account_dir(&env.hostname, &env.username))
    }
}

/// Global plugin settings shared by every session.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FtpSettings {
    #[serde(default)]
    pub global_cache: GlobalCache,
}

impl FtpSettings {
    pub fn with_cache_root(root: impl Into<PathBuf>) -> Self {
        Self {
            global_cache: GlobalCache::new(root),
        }
    }
}
