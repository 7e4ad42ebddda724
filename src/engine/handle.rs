use tokio::sync::{broadcast, mpsc, oneshot};

use crate::engine::events::{EngineCommand, EngineEvent, HostEvent, Reply};
use crate::engine::rules::RuleId;
use crate::session::{Session, SessionId, SessionPatch};
use crate::tab::{TabBinding, TabId};
use crate::EngineError;

/// Cloneable handle to a running [`SessionEngine`](crate::SessionEngine).
///
/// Host integrations feed [`HostEvent`]s through [`dispatch`](Self::dispatch);
/// the UI side uses the control-surface methods, each of which waits for the
/// engine's answer.
#[derive(Clone)]
pub struct EngineHandle {
    /// Engine-wide command sender
    cmd_tx: mpsc::Sender<EngineCommand>,
    /// Event sender to forward engine events to the caller
    event_tx: broadcast::Sender<EngineEvent>,
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("cmd_tx", &self.cmd_tx)
            .field("subscribers", &self.event_tx.receiver_count())
            .finish()
    }
}

impl EngineHandle {
    pub(crate) fn new(cmd_tx: mpsc::Sender<EngineCommand>, event_tx: broadcast::Sender<EngineEvent>) -> Self {
        Self { cmd_tx, event_tx }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    /// Queue a host event without waiting for it to be processed.
    pub async fn dispatch(&self, event: HostEvent) -> Result<(), EngineError> {
        self.send(EngineCommand::Event { event, ack: None }).await
    }

    /// Queue a host event and wait until the engine has fully processed it.
    pub async fn dispatch_and_wait(&self, event: HostEvent) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.send(EngineCommand::Event { event, ack: Some(tx) }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    pub async fn get_sessions(&self) -> Result<Vec<Session>, EngineError> {
        self.request(|reply| EngineCommand::GetSessions { reply }).await
    }

    pub async fn get_tab_session(&self, tab_id: TabId) -> Result<SessionId, EngineError> {
        self.request(|reply| EngineCommand::GetTabSession { tab_id, reply }).await
    }

    pub async fn get_tab_session_info(&self) -> Result<Vec<TabBinding>, EngineError> {
        self.request(|reply| EngineCommand::GetTabSessionInfo { reply }).await
    }

    /// Moves a tab to another session. Returns the rule ids now installed for it.
    pub async fn set_tab_session(
        &self,
        tab_id: TabId,
        session_id: SessionId,
        reload: bool,
    ) -> Result<Vec<RuleId>, EngineError> {
        self.request(|reply| EngineCommand::SetTabSession { tab_id, session_id, reload, reply })
            .await
    }

    pub async fn add_session(&self, session: Session) -> Result<Session, EngineError> {
        self.request(|reply| EngineCommand::AddSession { session, reply }).await
    }

    pub async fn update_session(&self, session_id: SessionId, patch: SessionPatch) -> Result<Session, EngineError> {
        self.request(|reply| EngineCommand::UpdateSession { session_id, patch, reply })
            .await
    }

    pub async fn delete_session(&self, session_id: SessionId) -> Result<(), EngineError> {
        self.request(|reply| EngineCommand::DeleteSession { session_id, reply }).await
    }

    /// Drops every cookie of a session. Returns how many were removed.
    pub async fn clear_session_cookies(&self, session_id: SessionId) -> Result<usize, EngineError> {
        self.request(|reply| EngineCommand::ClearSessionCookies { session_id, reply })
            .await
    }

    /// Gracefully shutdown the engine, waiting for all tab workers to finish.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.send(EngineCommand::Shutdown { reply: tx }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    async fn send(&self, cmd: EngineCommand) -> Result<(), EngineError> {
        self.cmd_tx.send(cmd).await.map_err(|_| EngineError::ChannelClosed)
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> EngineCommand) -> Result<T, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx)).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}
