//! Engine event types and commands.
//!
//! This module defines the messages flowing in and out of the engine:
//!
//! - [`HostEvent`]: browser lifecycle and traffic notifications fed into the engine.
//! - [`UserAction`]: control-surface mutations that can also arrive as host events.
//! - [`EngineCommand`]: what an [`EngineHandle`](crate::handle::EngineHandle) sends to the engine loop.
//! - [`EngineEvent`]: notifications the engine publishes on its broadcast bus.

use http::HeaderMap;
use tokio::sync::oneshot;

use crate::engine::rules::RuleId;
use crate::session::{Session, SessionId, SessionPatch};
use crate::tab::{TabBinding, TabId};
use crate::EngineError;

/// Frame id of a tab's top-level document.
pub const TOP_LEVEL_FRAME: u32 = 0;

/// Notifications from the host browser.
#[derive(Debug, Clone)]
pub enum HostEvent {
    /// A tab was opened, optionally from another tab.
    TabCreated { tab_id: TabId, opener_tab_id: Option<TabId> },
    /// A tab was closed.
    TabRemoved { tab_id: TabId },
    /// A frame is about to navigate. Only the top-level frame is acted on.
    BeforeNavigate { tab_id: TabId, frame_id: u32, url: String },
    /// Response headers were observed for a request made by a tab.
    ResponseHeaders { tab_id: TabId, url: String, headers: HeaderMap },
    /// A control-surface mutation delivered as an event.
    UserAction(UserAction),
}

impl HostEvent {
    /// The tab this event is about, if it is tab scoped.
    pub fn tab_id(&self) -> Option<TabId> {
        match self {
            HostEvent::TabCreated { tab_id, .. }
            | HostEvent::TabRemoved { tab_id }
            | HostEvent::BeforeNavigate { tab_id, .. }
            | HostEvent::ResponseHeaders { tab_id, .. } => Some(*tab_id),
            HostEvent::UserAction(UserAction::SetTabSession { tab_id, .. }) => Some(*tab_id),
            HostEvent::UserAction(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UserAction {
    SetTabSession { tab_id: TabId, session_id: SessionId, reload: bool },
    AddSession(Session),
    UpdateSession { session_id: SessionId, patch: SessionPatch },
    DeleteSession(SessionId),
    ClearSessionCookies(SessionId),
}

pub type Reply<T> = oneshot::Sender<Result<T, EngineError>>;

/// Commands accepted by the engine loop.
#[derive(Debug)]
pub enum EngineCommand {
    /// Deliver a host event. `ack` fires once the event has been fully processed.
    Event { event: HostEvent, ack: Option<oneshot::Sender<()>> },
    GetSessions { reply: Reply<Vec<Session>> },
    GetTabSession { tab_id: TabId, reply: Reply<SessionId> },
    GetTabSessionInfo { reply: Reply<Vec<TabBinding>> },
    SetTabSession { tab_id: TabId, session_id: SessionId, reload: bool, reply: Reply<Vec<RuleId>> },
    AddSession { session: Session, reply: Reply<Session> },
    UpdateSession { session_id: SessionId, patch: SessionPatch, reply: Reply<Session> },
    DeleteSession { session_id: SessionId, reply: Reply<()> },
    ClearSessionCookies { session_id: SessionId, reply: Reply<usize> },
    /// Stop every tab worker and end the loop.
    Shutdown { reply: oneshot::Sender<()> },
}

/// Events published by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    EngineStarted,
    /// A tab's rule set was replaced.
    RulesInstalled { tab_id: TabId, session_id: SessionId, rule_ids: Vec<RuleId> },
    /// The host refused a tab's rules; the tab now runs with whatever is still installed.
    RuleInstallFailed { tab_id: TabId, reason: String },
    /// The tab should be reloaded so its new session takes effect.
    ReloadRequested { tab_id: TabId },
    CookiesCaptured { tab_id: TabId, session_id: SessionId, count: usize },
    SessionsChanged,
    EngineStopped,
}
