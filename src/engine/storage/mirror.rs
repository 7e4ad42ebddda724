use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::engine::cookies::CookieSnapshot;
use crate::engine::storage::StateStoreHandle;
use crate::session::Session;
use crate::tab::{TabBinding, TabId};

pub const SESSIONS_KEY: &str = "sessions";
pub const TAB_SESSIONS_KEY: &str = "tabSessions";
pub const SESSION_COOKIES_KEY: &str = "sessionCookies";
pub const RULE_ID_COUNTER_KEY: &str = "ruleIdCounter";

/// Everything the engine persists, as read back from a [`StateMirror`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedState {
    pub sessions: Vec<Session>,
    pub tab_sessions: BTreeMap<TabId, TabBinding>,
    pub session_cookies: CookieSnapshot,
    pub rule_id_counter: Option<u32>,
}

/// Reads and writes the persisted layout on top of a [`StateStore`](super::StateStore).
///
/// Writes go through a single lock: a value is computed and written while the
/// lock is held, so an older snapshot can never overwrite a newer one.
pub struct StateMirror {
    store: StateStoreHandle,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for StateMirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMirror").finish_non_exhaustive()
    }
}

impl StateMirror {
    pub fn new(store: StateStoreHandle) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    pub fn load(&self) -> Result<PersistedState> {
        let tab_sessions: BTreeMap<String, TabBinding> = self.read(TAB_SESSIONS_KEY)?.unwrap_or_default();

        Ok(PersistedState {
            sessions: self.read(SESSIONS_KEY)?.unwrap_or_default(),
            tab_sessions: tab_sessions.into_values().map(|b| (b.tab_id, b)).collect(),
            session_cookies: self.read(SESSION_COOKIES_KEY)?.unwrap_or_default(),
            rule_id_counter: self.read(RULE_ID_COUNTER_KEY)?,
        })
    }

    pub fn save_sessions(&self, sessions: &[Session]) -> Result<()> {
        self.write_with(SESSIONS_KEY, || Ok(sessions.to_vec()))
    }

    pub fn save_bindings<'a, I>(&self, bindings: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a TabBinding>,
    {
        let keyed: BTreeMap<String, &TabBinding> = bindings.into_iter().map(|b| (b.tab_id.to_string(), b)).collect();
        self.write_with(TAB_SESSIONS_KEY, || Ok(keyed))
    }

    /// Computes the value with `f` and writes it under `key`, all under the write lock.
    pub fn write_with<T, F>(&self, key: &str, f: F) -> Result<()>
    where
        T: Serialize,
        F: FnOnce() -> Result<T>,
    {
        let _guard = self.write_lock.lock().map_err(|_| anyhow!("state mirror lock poisoned"))?;
        let value = f()?;
        let json = serde_json::to_string(&value).with_context(|| format!("serializing {key}"))?;
        self.store.set_item(key, &json)
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.store.get_item(key)? {
            Some(json) => Ok(Some(serde_json::from_str(&json).with_context(|| format!("parsing {key}"))?)),
            None => Ok(None),
        }
    }
}
