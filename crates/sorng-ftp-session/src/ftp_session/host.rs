//! Callbacks into the embedding application.

use crate::ftp_session::types::QueueEvent;
use std::fmt;
use std::sync::Arc;

/// Receives Start/End notifications for every executed operation.
///
/// `post` is called from queue worker tasks; implementations must hand the
/// event over to the host thread and return quickly.
pub trait NotificationSink: Send + Sync {
    fn post(&self, event: QueueEvent);
}

/// Asks the user whether a session with pending transfers may be closed.
pub trait ConfirmPrompt: Send + Sync {
    fn confirm_terminate(&self, pending_transfers: usize) -> bool;
}

/// Host collaborators handed to [`FtpSession::init`](crate::ftp_session::session::FtpSession::init).
#[derive(Clone)]
pub struct SessionHost {
    pub sink: Arc<dyn NotificationSink>,
    pub prompt: Arc<dyn ConfirmPrompt>,
}

impl SessionHost {
    pub fn new(sink: Arc<dyn NotificationSink>, prompt: Arc<dyn ConfirmPrompt>) -> Self {
        Self { sink, prompt }
    }
}

impl fmt::Debug for SessionHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHost").finish_non_exhaustive()
    }
}
