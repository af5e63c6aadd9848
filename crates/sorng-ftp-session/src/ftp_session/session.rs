//! The FTP session: one remote connection and its two work queues.
//!
//! Commands are split over two queues that progress independently:
//! directory and housekeeping commands go to the *control* queue on the
//! main client, uploads and downloads go to the *transfer* queue on a clone
//! of it. Every enqueue returns immediately; results come back to the host
//! through its [`NotificationSink`](crate::ftp_session::host::NotificationSink)
//! and are folded into the cached tree with [`FtpSession::apply_event`].

use crate::ftp_session::error::{SessionError, SessionResult};
use crate::ftp_session::host::SessionHost;
use crate::ftp_session::keepalive::{spawn_keepalive, KeepAliveMonitor};
use crate::ftp_session::operations::{OperationKind, QueueOperation};
use crate::ftp_session::paths;
use crate::ftp_session::profile::{FtpProfile, FtpSettings};
use crate::ftp_session::queue::OperationQueue;
use crate::ftp_session::transport::{TransportClient, TransportFactory, TrustedCertificates};
use crate::ftp_session::tree::{FileTree, NodeId, ROOT};
use crate::ftp_session::types::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Everything that only exists while a session is running.
struct ActiveSession {
    profile: Arc<FtpProfile>,
    host: SessionHost,
    settings: Arc<FtpSettings>,
    runtime: Handle,
    main: Arc<dyn TransportClient>,
    transfer: Arc<dyn TransportClient>,
    control_queue: OperationQueue,
    transfer_queue: OperationQueue,
    tree: FileTree,
    keepalive: Option<JoinHandle<()>>,
}

impl ActiveSession {
    fn op(&self, kind: OperationKind) -> QueueOperation {
        QueueOperation::new(self.host.sink.clone(), kind)
    }

    fn enqueue_control(&self, kind: OperationKind) -> String {
        self.control_queue.add(self.op(kind))
    }

    fn enqueue_transfer(&self, kind: OperationKind, code: i32) -> String {
        self.transfer_queue.add(self.op(kind).with_code(code))
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        if let Some(timer) = self.keepalive.take() {
            timer.abort();
        }
    }
}

pub struct FtpSession {
    factory: Arc<dyn TransportFactory>,
    host: Option<SessionHost>,
    settings: Option<Arc<FtpSettings>>,
    certificates: Arc<TrustedCertificates>,
    active: Option<ActiveSession>,
}

impl FtpSession {
    pub fn new(factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            factory,
            host: None,
            settings: None,
            certificates: Arc::new(TrustedCertificates::default()),
            active: None,
        }
    }

    // ─── Lifecycle ───────────────────────────────────────────────────

    /// Bind the host collaborators and global settings.
    pub fn init(&mut self, host: SessionHost, settings: Arc<FtpSettings>) -> SessionResult<()> {
        if self.host.is_some() {
            return Err(SessionError::already_initialized());
        }
        self.host = Some(host);
        self.settings = Some(settings);
        Ok(())
    }

    /// Unbind the host. A running session keeps the collaborators it was
    /// started with.
    pub fn deinit(&mut self) {
        self.host = None;
        self.settings = None;
    }

    pub fn is_initialized(&self) -> bool {
        self.host.is_some()
    }

    /// Certificates handed to every transport created from now on.
    pub fn set_certificates(&mut self, certificates: TrustedCertificates) {
        self.certificates = Arc::new(certificates);
    }

    /// Create both clients and queues for `profile`. Must be called from
    /// within a Tokio runtime; nothing is sent to the server until
    /// [`connect`](Self::connect).
    pub fn start_session(&mut self, profile: Arc<FtpProfile>) -> SessionResult<()> {
        if self.active.is_some() {
            return Err(SessionError::already_running());
        }
        let host = self.host.clone().ok_or_else(SessionError::not_initialized)?;
        let settings = self
            .settings
            .clone()
            .ok_or_else(SessionError::not_initialized)?;
        let runtime = Handle::try_current().map_err(|e| {
            SessionError::connection_setup(format!("No Tokio runtime available: {}", e))
        })?;

        settings
            .global_cache
            .set_environment(&profile.hostname, &profile.username);

        let main = self.factory.create(&profile).map_err(|e| {
            SessionError::connection_setup(format!(
                "Unable to create a client for profile '{}': {}",
                profile.name, e.message
            ))
        })?;
        main.set_certificates(self.certificates.clone());
        let transfer = main.try_clone().map_err(|e| {
            SessionError::connection_setup(format!(
                "Unable to create the transfer client for profile '{}': {}",
                profile.name, e.message
            ))
        })?;

        let mut control_queue = OperationQueue::new("control", main.clone());
        let mut transfer_queue = OperationQueue::new("transfer", transfer.clone());
        control_queue.initialize()?;
        transfer_queue.initialize()?;

        log::info!(
            "FTP session started for '{}' ({}@{}:{})",
            profile.name,
            profile.username,
            profile.hostname,
            profile.port
        );

        self.active = Some(ActiveSession {
            profile,
            host,
            settings,
            runtime,
            main,
            transfer,
            control_queue,
            transfer_queue,
            tree: FileTree::new(),
            keepalive: None,
        });
        Ok(())
    }

    /// Queue a connect on the control queue and (re)arm the keep-alive
    /// timer when the profile asks for one.
    pub fn connect(&mut self) -> SessionResult<String> {
        let active = self.active_mut()?;
        let id = active.enqueue_control(OperationKind::Connect);
        log::info!("FTP connect queued for {}", active.profile.hostname);

        let interval = active.profile.noop_interval_secs;
        if interval == 0 {
            return Ok(id);
        }
        if let Some(old) = active.keepalive.take() {
            log::warn!("Keep-alive timer already running, re-arming it");
            old.abort();
        }
        let monitor = KeepAliveMonitor::new(interval);
        log::info!("Keep-alive armed every {:?}", monitor.period());
        active.keepalive = Some(spawn_keepalive(
            &active.runtime,
            monitor,
            active.main.clone(),
            active.transfer.clone(),
            active.control_queue.handle(),
            active.host.sink.clone(),
        ));
        Ok(id)
    }

    /// Tear the session down.
    ///
    /// With transfers still queued the host is asked first; a refusal
    /// leaves the session untouched and returns `TerminationDeclined`.
    pub async fn terminate_session(&mut self) -> SessionResult<()> {
        let pending = match &self.active {
            Some(active) => active.transfer_queue.size(),
            None => {
                log::debug!("No FTP session running, nothing to terminate");
                return Ok(());
            }
        };
        if pending > 0 {
            let confirmed = self
                .active
                .as_ref()
                .map_or(true, |a| a.host.prompt.confirm_terminate(pending));
            if !confirmed {
                return Err(SessionError::termination_declined(pending));
            }
        }

        let Some(mut active) = self.active.take() else {
            return Ok(());
        };
        log::info!("Terminating FTP session for '{}'", active.profile.name);

        if let Some(timer) = active.keepalive.take() {
            timer.abort();
        }
        active.control_queue.clear();
        active.transfer_queue.clear();
        active.transfer.abort();
        active.main.abort();
        active.transfer_queue.deinitialize().await;
        active.control_queue.deinitialize().await;

        // Disconnect runs on both clients, connected or not.
        for client in [active.transfer.clone(), active.main.clone()] {
            let mut op = active.op(OperationKind::Disconnect);
            op.set_client(client);
            if let Err(e) = op.run().await {
                log::warn!("Disconnect failed during teardown: {}", e);
            }
        }

        drop(active);
        log::info!("FTP session terminated");
        Ok(())
    }

    // ─── State ───────────────────────────────────────────────────────

    pub fn is_connected(&self) -> bool {
        self.active.is_some()
    }

    pub fn current_profile(&self) -> Option<Arc<FtpProfile>> {
        self.active.as_ref().map(|a| a.profile.clone())
    }

    pub fn tree(&self) -> SessionResult<&FileTree> {
        Ok(&self.active()?.tree)
    }

    /// Mutable tree access, for the host to attach UI data to nodes.
    pub fn tree_mut(&mut self) -> SessionResult<&mut FileTree> {
        Ok(&mut self.active_mut()?.tree)
    }

    /// Size of the control queue (0 when idle).
    pub fn control_queue_size(&self) -> usize {
        self.active.as_ref().map_or(0, |a| a.control_queue.size())
    }

    /// Size of the transfer queue (0 when idle).
    pub fn transfer_queue_size(&self) -> usize {
        self.active.as_ref().map_or(0, |a| a.transfer_queue.size())
    }

    fn active(&self) -> SessionResult<&ActiveSession> {
        self.active.as_ref().ok_or_else(SessionError::not_connected)
    }

    fn active_mut(&mut self) -> SessionResult<&mut ActiveSession> {
        self.active.as_mut().ok_or_else(SessionError::not_connected)
    }

    // ─── Directory commands ──────────────────────────────────────────

    pub fn get_directory(&self, path: &str) -> SessionResult<String> {
        let active = self.active()?;
        Ok(active.enqueue_control(OperationKind::GetDir {
            path: paths::normalize(path),
            parents: Vec::new(),
        }))
    }

    /// List `path` together with the ancestors the tree does not know yet.
    /// Fails with `PathNotFound` (and queues nothing) when a listed
    /// ancestor lacks the next segment.
    pub fn get_directory_hierarchy(&self, path: &str) -> SessionResult<String> {
        let active = self.active()?;
        let parents = active.tree.prefetch_ancestors(path)?;
        log::debug!("Directory hierarchy for {}: prefetch {:?}", path, parents);
        Ok(active.enqueue_control(OperationKind::GetDir {
            path: paths::normalize(path),
            parents,
        }))
    }

    pub fn mkdir(&self, path: &str) -> SessionResult<String> {
        let active = self.active()?;
        Ok(active.enqueue_control(OperationKind::MkDir {
            path: path.to_string(),
        }))
    }

    pub fn rmdir(&self, path: &str) -> SessionResult<String> {
        let active = self.active()?;
        Ok(active.enqueue_control(OperationKind::RmDir {
            path: path.to_string(),
        }))
    }

    pub fn mkfile(&self, path: &str) -> SessionResult<String> {
        let active = self.active()?;
        Ok(active.enqueue_control(OperationKind::MkFile {
            path: path.to_string(),
        }))
    }

    pub fn delete_file(&self, path: &str) -> SessionResult<String> {
        let active = self.active()?;
        Ok(active.enqueue_control(OperationKind::DeleteFile {
            path: path.to_string(),
        }))
    }

    pub fn rename(&self, from: &str, to: &str) -> SessionResult<String> {
        let active = self.active()?;
        Ok(active.enqueue_control(OperationKind::Rename {
            from: from.to_string(),
            to: to.to_string(),
        }))
    }

    pub fn noop(&self) -> SessionResult<String> {
        let active = self.active()?;
        Ok(active.enqueue_control(OperationKind::NoOp))
    }

    // ─── Transfers ───────────────────────────────────────────────────

    /// Download a remote file into its place in the local cache.
    pub fn download_file_cache(&self, remote: &str) -> SessionResult<String> {
        let active = self.active()?;
        let local = active
            .profile
            .cache_local(remote, &active.settings.global_cache)?;
        self.download_file(remote, &local, false, 0)
    }

    /// Download `remote` to `local`. With `target_is_dir` the file keeps its
    /// remote name inside the `local` directory.
    pub fn download_file(
        &self,
        remote: &str,
        local: &Path,
        target_is_dir: bool,
        code: i32,
    ) -> SessionResult<String> {
        let active = self.active()?;
        if remote.is_empty() || local.as_os_str().is_empty() {
            return Err(SessionError::invalid_argument(
                "Download needs a remote source and a local target",
            ));
        }
        let name = paths::file_name(remote);
        let target = if target_is_dir {
            if name.is_empty() {
                return Err(SessionError::invalid_argument(format!(
                    "'{}' has no file name",
                    remote
                )));
            }
            local.join(name)
        } else {
            local.to_path_buf()
        };
        let mode = active.profile.transfer_mode_for(name);
        Ok(active.enqueue_transfer(
            OperationKind::Download {
                remote: remote.to_string(),
                local: target,
                mode,
            },
            code,
        ))
    }

    /// Download `remote` into a host-supplied writer.
    pub fn download_file_handle<W>(&self, remote: &str, writer: W) -> SessionResult<String>
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let active = self.active()?;
        if remote.is_empty() {
            return Err(SessionError::invalid_argument("Download needs a remote source"));
        }
        let mode = active.profile.transfer_mode_for(paths::file_name(remote));
        Ok(active.enqueue_transfer(
            OperationKind::DownloadHandle {
                remote: remote.to_string(),
                writer: Box::new(writer),
                mode,
            },
            0,
        ))
    }

    /// Upload a cached local file back to the remote path it mirrors.
    pub fn upload_file_cache(&self, local: &Path) -> SessionResult<String> {
        let active = self.active()?;
        let remote = active
            .profile
            .cache_external(local, &active.settings.global_cache)?;
        self.upload_file(local, &remote, false, 0)
    }

    /// Upload `local` to `remote`. With `target_is_dir` the file keeps its
    /// local name inside the `remote` directory.
    pub fn upload_file(
        &self,
        local: &Path,
        remote: &str,
        target_is_dir: bool,
        code: i32,
    ) -> SessionResult<String> {
        let active = self.active()?;
        if remote.is_empty() || local.as_os_str().is_empty() {
            return Err(SessionError::invalid_argument(
                "Upload needs a local source and a remote target",
            ));
        }
        let name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                SessionError::invalid_argument(format!("'{}' has no file name", local.display()))
            })?;
        let target = if target_is_dir {
            paths::join(remote, &name)
        } else {
            remote.to_string()
        };
        let mode = active.profile.transfer_mode_for(&name);
        Ok(active.enqueue_transfer(
            OperationKind::Upload {
                local: PathBuf::from(local),
                remote: target,
                mode,
            },
            code,
        ))
    }

    /// Upload everything `reader` yields to `remote`.
    pub fn upload_file_handle<R>(&self, reader: R, remote: &str) -> SessionResult<String>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let active = self.active()?;
        if remote.is_empty() {
            return Err(SessionError::invalid_argument("Upload needs a remote target"));
        }
        let mode = active.profile.transfer_mode_for(paths::file_name(remote));
        Ok(active.enqueue_transfer(
            OperationKind::UploadHandle {
                reader: Box::new(reader),
                remote: remote.to_string(),
                mode,
            },
            0,
        ))
    }

    // ─── Abort / cancel ──────────────────────────────────────────────

    /// Ask the main client to stop its current command.
    pub fn abort_operation(&self) -> SessionResult<()> {
        self.active()?.main.abort();
        Ok(())
    }

    /// Ask the transfer client to stop the running transfer.
    pub fn abort_transfer(&self) -> SessionResult<()> {
        self.active()?.transfer.abort();
        Ok(())
    }

    /// Drop a transfer that has not started yet.
    pub fn cancel_operation(&self, id: &str) -> bool {
        self.active
            .as_ref()
            .map_or(false, |a| a.transfer_queue.cancel(id))
    }

    // ─── Tree ────────────────────────────────────────────────────────

    pub fn find_path_object(&self, path: &str) -> SessionResult<Option<NodeId>> {
        Ok(self.active()?.tree.find_path(path))
    }

    /// Resolve the starting directory and graft it under the root.
    ///
    /// Tries the profile's initial directory (absolute paths only), then
    /// the server's working directory. Always returns the root.
    pub async fn get_root_object(&mut self) -> SessionResult<NodeId> {
        let active = self.active_mut()?;
        let main = active.main.clone();
        let initial = active.profile.initial_directory.clone();

        let mut dir = None;
        if !initial.is_empty() && paths::is_absolute(&initial) {
            match main.cwd(&initial).await {
                Ok(()) => dir = Some(initial),
                Err(e) => log::debug!("Initial directory {} unusable: {}", initial, e),
            }
        }
        if dir.is_none() {
            match main.pwd().await {
                Ok(pwd) => dir = Some(pwd),
                Err(e) => log::debug!("PWD failed: {}", e),
            }
        }

        let active = self.active_mut()?;
        if let Some(dir) = dir.filter(|d| d.len() > 1) {
            active.tree.graft_path(&dir)?;
        }
        Ok(ROOT)
    }

    /// Fold a finished operation into the tree. Start events and failures
    /// are ignored.
    pub fn apply_event(&mut self, event: &QueueEvent) -> SessionResult<()> {
        let tree = &mut self.active_mut()?.tree;
        let Some(Ok(output)) = event.result() else {
            return Ok(());
        };

        match (event.info.op_type, output) {
            (_, OperationOutput::Listings { listings }) => {
                for listing in listings {
                    let dir = tree.ensure_path(&listing.path)?;
                    tree.merge_listing(dir, &listing.entries)?;
                }
            }
            (OperationType::MkDir, OperationOutput::Created { path }) => {
                add_under_known_parent(tree, path, true)?;
            }
            (OperationType::MkFile, OperationOutput::Created { path }) => {
                add_under_known_parent(tree, path, false)?;
            }
            (_, OperationOutput::Removed { path }) => {
                if let Some(id) = tree.find_path(path) {
                    tree.remove(id);
                }
            }
            (_, OperationOutput::Renamed { from, to }) => {
                if let Some(id) = tree.find_path(from) {
                    match tree.find_path(&paths::parent(to)) {
                        Some(parent) => tree.rename(id, parent, paths::file_name(to))?,
                        None => {
                            tree.remove(id);
                        }
                    }
                }
            }
            (OperationType::Upload, OperationOutput::Transferred { .. }) => {
                if let Some(remote) = &event.info.remote_path {
                    add_under_known_parent(tree, remote, false)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    // ─── Save hook ───────────────────────────────────────────────────

    /// Upload a saved cache file to the profile that owns it, switching
    /// sessions if another account is currently connected.
    pub async fn save_to_remote(
        &mut self,
        profiles: &[Arc<FtpProfile>],
        local: &Path,
    ) -> SessionResult<String> {
        let settings = match &self.active {
            Some(active) => active.settings.clone(),
            None => self
                .settings
                .clone()
                .ok_or_else(SessionError::not_initialized)?,
        };
        let cache = &settings.global_cache;
        let owner = profiles
            .iter()
            .find(|p| local.starts_with(cache.account_dir(&p.hostname, &p.username)))
            .cloned()
            .ok_or_else(|| {
                SessionError::no_matching_profile(format!(
                    "No profile owns '{}'",
                    local.display()
                ))
            })?;

        if let Some(active) = &self.active {
            if active.profile.same_account(&owner) {
                return self.upload_file_cache(local);
            }
            log::info!(
                "'{}' belongs to profile '{}', switching sessions",
                local.display(),
                owner.name
            );
            self.terminate_session().await?;
        }

        self.start_session(owner)?;
        self.connect()?;
        self.upload_file_cache(local)
    }
}

fn add_under_known_parent(tree: &mut FileTree, path: &str, is_dir: bool) -> SessionResult<()> {
    let name = paths::file_name(path);
    if name.is_empty() {
        return Ok(());
    }
    if let Some(parent) = tree.find_path(&paths::parent(path)) {
        tree.add_child(parent, name, is_dir)?;
    }
    Ok(())
}
