//! Per-tab cookie session isolation.
//!
//! Every tab is bound to a session. Tabs in the reserved `default` session use
//! the host's native cookie jar untouched. Tabs in any other session get two
//! header rewrite rules installed in the host: one replacing the outgoing
//! `Cookie` header with the session's own cookies and one stripping incoming
//! `Set-Cookie` headers, which are captured into the session's jar instead.
//!
//! # Main Types
//!
//! - [`SessionEngine`]: the command loop routing host events to per-tab workers.
//! - [`EngineHandle`]: cloneable handle for dispatching events and the control surface.
//! - [`TabSessionRegistry`]: authoritative tab → session map driving rule installs.
//! - [`cookies::SessionCookieStore`]: session and domain keyed cookie table.
//! - [`rules::RuleEngine`]: the host's declarative rule engine.
//! - [`storage::StateStore`]: key/value collaborator holding the persisted mirror.

pub mod config;
pub mod cookies;
mod engine;
pub mod errors;
pub mod events;
pub mod handle;
pub mod registry;
pub mod rules;
pub mod session;
pub mod storage;
pub mod tab;

pub use config::{ConfigError, EngineConfig, EngineConfigBuilder};
pub use engine::SessionEngine;
pub use errors::EngineError;
pub use events::{EngineEvent, HostEvent, UserAction};
pub use handle::EngineHandle;
pub use registry::TabSessionRegistry;
pub use session::{RgbColor, Session, SessionId, SessionPatch};
pub use tab::{TabBinding, TabId};

/// Default capacity of the engine's command and event channels.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 128;
