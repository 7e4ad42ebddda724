//! Persistence for the engine state.
//!
//! The raw key/value primitives are a collaborator: anything implementing
//! [`StateStore`] can hold the engine's persisted mirror. Two backends ship with
//! the crate:
//!
//! - [`InMemoryStateStore`]: no persistence, for tests and ephemeral engines.
//! - [`SqliteStateStore`]: pooled SQLite database (feature `sqlite_state_store`).
//!
//! [`StateMirror`] sits on top of a store and knows the persisted layout:
//!
//! | key              | value                                                     |
//! |------------------|-----------------------------------------------------------|
//! | `sessions`       | `[Session]`                                               |
//! | `tabSessions`    | `{tabId: TabBinding}`                                     |
//! | `sessionCookies` | `{sessionId: {domain: {"name\|path": CookieRecord}}}`     |
//! | `ruleIdCounter`  | next unallocated rule id                                  |
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tabjar::storage::{SqliteStateStore, StateMirror};
//!
//! let store = Arc::new(SqliteStateStore::new("state.db").unwrap());
//! let mirror = StateMirror::new(store);
//! let state = mirror.load().unwrap();
//! println!("{} sessions persisted", state.sessions.len());
//! ```

use std::sync::Arc;

mod area;
mod in_memory;
mod mirror;
#[cfg(feature = "sqlite_state_store")]
mod sqlite_store;

pub use area::StateStore;
pub use in_memory::InMemoryStateStore;
pub use mirror::{
    PersistedState, StateMirror, RULE_ID_COUNTER_KEY, SESSIONS_KEY, SESSION_COOKIES_KEY, TAB_SESSIONS_KEY,
};
#[cfg(feature = "sqlite_state_store")]
pub use sqlite_store::SqliteStateStore;

/// Shared handle to a state store.
pub type StateStoreHandle = Arc<dyn StateStore>;
