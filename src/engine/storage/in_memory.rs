use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};

use crate::engine::storage::area::StateStore;

/// In‑memory state store (no persistence). Used when the embedder supplies no store.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    map: Mutex<HashMap<String, String>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.map.lock().map_err(|_| anyhow!("state store lock poisoned"))
    }
}

impl StateStore for InMemoryStateStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut v: Vec<String> = self.lock()?.keys().cloned().collect();
        v.sort_unstable();
        Ok(v)
    }
}
