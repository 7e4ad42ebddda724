use crate::engine::rules::RuleEngineError;
use crate::session::SessionId;
use crate::tab::TabId;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Unknown tab: {0}")]
    UnknownTab(TabId),

    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Session already exists: {0}")]
    SessionAlreadyExists(SessionId),

    #[error("The default session cannot be deleted")]
    CannotDeleteDefault,

    #[error("Cannot resolve a hostname from URL: {0}")]
    UnresolvableUrl(String),

    #[error("Rule install rejected for tab {tab_id}: {source}")]
    RuleInstallRejected {
        tab_id: TabId,
        #[source]
        source: RuleEngineError,
    },

    #[error("Rule id space exhausted")]
    RuleIdsExhausted,

    #[error("Persistence error: {0}")]
    Persistence(#[source] anyhow::Error),

    #[error("Engine is already running")]
    AlreadyRunning,

    #[error("Engine command channel closed")]
    ChannelClosed,

    #[error("Lock poisoned")]
    Poisoned,
}
