//! Scripted collaborators shared by the unit tests.

use crate::ftp_session::error::{SessionError, SessionResult};
use crate::ftp_session::host::{ConfirmPrompt, NotificationSink};
use crate::ftp_session::profile::FtpProfile;
use crate::ftp_session::transport::{TransportClient, TransportFactory, TrustedCertificates};
use crate::ftp_session::types::{QueueEvent, RemoteEntry, TransferMode};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{Notify, Semaphore};

/// Poll `check` until it holds; panics after ~5 s.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

// ─── Transport ───────────────────────────────────────────────────────

/// State shared by a mock client and all of its clones.
#[derive(Default)]
struct MockScript {
    journal: StdMutex<Vec<String>>,
    listings: StdMutex<HashMap<String, Vec<RemoteEntry>>>,
    failing: StdMutex<HashSet<String>>,
    cwd_fails: AtomicBool,
    pwd: StdMutex<Option<String>>,
    clone_fails: AtomicBool,
    instances: StdMutex<Vec<Weak<MockTransport>>>,
}

pub struct MockTransport {
    name: String,
    script: Arc<MockScript>,
    gate: StdMutex<Option<Arc<Semaphore>>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    idle_secs: AtomicU64,
    abort_requested: AtomicBool,
    abort_signal: Notify,
    certificates: StdMutex<Option<Arc<TrustedCertificates>>>,
}

impl MockTransport {
    pub fn new(name: &str) -> Arc<Self> {
        Self::with_script(name, Arc::new(MockScript::default()))
    }

    fn with_script(name: &str, script: Arc<MockScript>) -> Arc<Self> {
        let client = Arc::new(Self {
            name: name.to_string(),
            script,
            gate: StdMutex::new(None),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            idle_secs: AtomicU64::new(0),
            abort_requested: AtomicBool::new(false),
            abort_signal: Notify::new(),
            certificates: StdMutex::new(None),
        });
        client
            .script
            .instances
            .lock()
            .unwrap()
            .push(Arc::downgrade(&client));
        client
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Calls made on this client and its clones, as `name:call args`.
    pub fn journal(&self) -> Vec<String> {
        self.script.journal.lock().unwrap().clone()
    }

    pub fn set_listing(&self, path: &str, entries: Vec<RemoteEntry>) {
        self.script
            .listings
            .lock()
            .unwrap()
            .insert(path.to_string(), entries);
    }

    /// Any call touching `path` fails with `CommandRejected`.
    pub fn fail_on(&self, path: &str) {
        self.script.failing.lock().unwrap().insert(path.to_string());
    }

    pub fn set_cwd_fails(&self, fails: bool) {
        self.script.cwd_fails.store(fails, Ordering::SeqCst);
    }

    /// Working directory reported by `pwd`; `None` makes it fail.
    pub fn set_pwd(&self, pwd: Option<&str>) {
        *self.script.pwd.lock().unwrap() = pwd.map(str::to_string);
    }

    pub fn set_clone_fails(&self, fails: bool) {
        self.script.clone_fails.store(fails, Ordering::SeqCst);
    }

    pub fn set_idle(&self, secs: u64) {
        self.idle_secs.store(secs, Ordering::SeqCst);
    }

    /// Block every following call until [`open`](Self::open) or an abort.
    pub fn hold(&self) {
        *self.gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn open(&self) {
        if let Some(gate) = self.gate.lock().unwrap().take() {
            gate.close();
        }
    }

    /// Calls currently inside this client.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn certificates(&self) -> Option<Arc<TrustedCertificates>> {
        self.certificates.lock().unwrap().clone()
    }

    /// Live clients sharing this script, in creation order.
    pub fn instances(&self) -> Vec<Arc<MockTransport>> {
        self.script
            .instances
            .lock()
            .unwrap()
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    async fn step(&self, call: String, path: Option<&str>) -> SessionResult<()> {
        self.script
            .journal
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.name, call));

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        let gate = self.gate.lock().unwrap().clone();
        let outcome = match gate {
            Some(gate) => {
                let notified = self.abort_signal.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.abort_requested.swap(false, Ordering::SeqCst) {
                    Err(SessionError::aborted(format!("{} aborted", call)))
                } else {
                    tokio::select! {
                        _ = gate.acquire() => Ok(()),
                        _ = &mut notified => Err(SessionError::aborted(format!("{} aborted", call))),
                    }
                }
            }
            None => Ok(()),
        };

        self.abort_requested.store(false, Ordering::SeqCst);
        self.active.fetch_sub(1, Ordering::SeqCst);
        outcome?;

        if let Some(p) = path {
            if self.script.failing.lock().unwrap().contains(p) {
                return Err(SessionError::command_rejected(format!("550 {}", p)));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TransportClient for MockTransport {
    async fn connect(&self) -> SessionResult<()> {
        self.step("connect".into(), None).await
    }

    async fn disconnect(&self) -> SessionResult<()> {
        self.step("disconnect".into(), None).await
    }

    async fn cwd(&self, path: &str) -> SessionResult<()> {
        self.step(format!("cwd {}", path), Some(path)).await?;
        if self.script.cwd_fails.load(Ordering::SeqCst) {
            return Err(SessionError::command_rejected("550 cwd"));
        }
        *self.script.pwd.lock().unwrap() = Some(path.to_string());
        Ok(())
    }

    async fn pwd(&self) -> SessionResult<String> {
        self.step("pwd".into(), None).await?;
        self.script
            .pwd
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| SessionError::command_rejected("550 pwd"))
    }

    async fn list(&self, path: &str) -> SessionResult<Vec<RemoteEntry>> {
        self.step(format!("list {}", path), Some(path)).await?;
        Ok(self
            .script
            .listings
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .unwrap_or_default())
    }

    async fn mkdir(&self, path: &str) -> SessionResult<()> {
        self.step(format!("mkdir {}", path), Some(path)).await
    }

    async fn rmdir(&self, path: &str) -> SessionResult<()> {
        self.step(format!("rmdir {}", path), Some(path)).await
    }

    async fn create_file(&self, path: &str) -> SessionResult<()> {
        self.step(format!("mkfile {}", path), Some(path)).await
    }

    async fn delete_file(&self, path: &str) -> SessionResult<()> {
        self.step(format!("delete {}", path), Some(path)).await
    }

    async fn rename(&self, from: &str, to: &str) -> SessionResult<()> {
        self.step(format!("rename {} {}", from, to), Some(from)).await
    }

    async fn upload(&self, local: &Path, remote: &str, mode: TransferMode) -> SessionResult<u64> {
        self.step(
            format!("upload {} -> {} {:?}", local.display(), remote, mode),
            Some(remote),
        )
        .await?;
        Ok(tokio::fs::metadata(local).await.map(|m| m.len()).unwrap_or(0))
    }

    async fn upload_from(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        remote: &str,
        mode: TransferMode,
    ) -> SessionResult<u64> {
        self.step(format!("upload_from {} {:?}", remote, mode), Some(remote))
            .await?;
        Ok(tokio::io::copy(reader, &mut tokio::io::sink()).await?)
    }

    async fn download(&self, remote: &str, local: &Path, mode: TransferMode) -> SessionResult<u64> {
        self.step(
            format!("download {} -> {} {:?}", remote, local.display(), mode),
            Some(remote),
        )
        .await?;
        Ok(0)
    }

    async fn download_to(
        &self,
        remote: &str,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
        mode: TransferMode,
    ) -> SessionResult<u64> {
        self.step(format!("download_to {} {:?}", remote, mode), Some(remote))
            .await?;
        let body = format!("contents of {}", remote);
        writer.write_all(body.as_bytes()).await?;
        Ok(body.len() as u64)
    }

    async fn noop(&self) -> SessionResult<()> {
        self.step("noop".into(), None).await
    }

    /// Interrupts the call in flight and lifts the gate for later calls.
    fn abort(&self) {
        if self.active.load(Ordering::SeqCst) > 0 {
            self.gate.lock().unwrap().take();
            self.abort_requested.store(true, Ordering::SeqCst);
            self.abort_signal.notify_waiters();
        }
    }

    fn try_clone(&self) -> SessionResult<Arc<dyn TransportClient>> {
        if self.script.clone_fails.load(Ordering::SeqCst) {
            return Err(SessionError::connection_failed("clone refused"));
        }
        let clone = MockTransport::with_script("clone", self.script.clone());
        *clone.certificates.lock().unwrap() = self.certificates();
        Ok(clone)
    }

    fn set_certificates(&self, certificates: Arc<TrustedCertificates>) {
        *self.certificates.lock().unwrap() = Some(certificates);
    }

    fn seconds_since_last_action(&self) -> u64 {
        self.idle_secs.load(Ordering::SeqCst)
    }
}

/// Hands out `main` clients that share one script.
pub struct MockFactory {
    template: Arc<MockTransport>,
    fails: AtomicBool,
    created: AtomicUsize,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            template: MockTransport::new("template"),
            fails: AtomicBool::new(false),
            created: AtomicUsize::new(0),
        })
    }

    /// Configure the script every created client will follow.
    pub fn script(&self) -> &MockTransport {
        &self.template
    }

    pub fn set_fails(&self, fails: bool) {
        self.fails.store(fails, Ordering::SeqCst);
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Live client with the given name (`main` or `clone`).
    pub fn client(&self, name: &str) -> Option<Arc<MockTransport>> {
        self.template
            .instances()
            .into_iter()
            .rev()
            .find(|c| c.name() == name)
    }
}

impl TransportFactory for MockFactory {
    fn create(&self, profile: &FtpProfile) -> SessionResult<Arc<dyn TransportClient>> {
        if self.fails.load(Ordering::SeqCst) {
            return Err(SessionError::connection_failed(format!(
                "no transport for {}",
                profile.hostname
            )));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(MockTransport::with_script("main", self.template.script.clone()))
    }
}

// ─── Host ────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    events: StdMutex<Vec<QueueEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<QueueEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn end_count(&self) -> usize {
        self.events.lock().unwrap().iter().filter(|e| e.is_end()).count()
    }
}

impl NotificationSink for RecordingSink {
    fn post(&self, event: QueueEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub struct RecordingPrompt {
    answer: AtomicBool,
    calls: AtomicUsize,
    last_pending: AtomicUsize,
}

impl RecordingPrompt {
    pub fn answering(answer: bool) -> Arc<Self> {
        Arc::new(Self {
            answer: AtomicBool::new(answer),
            calls: AtomicUsize::new(0),
            last_pending: AtomicUsize::new(0),
        })
    }

    pub fn set_answer(&self, answer: bool) {
        self.answer.store(answer, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_pending(&self) -> usize {
        self.last_pending.load(Ordering::SeqCst)
    }
}

impl ConfirmPrompt for RecordingPrompt {
    fn confirm_terminate(&self, pending_transfers: usize) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_pending.store(pending_transfers, Ordering::SeqCst);
        self.answer.load(Ordering::SeqCst)
    }
}
