//! Session-scoped cookie store.
//!
//! The store keeps every captured [`CookieRecord`] bucketed per session and per
//! stored domain. It is the only way to reach a session's cookies: clearing a
//! session drops its whole bucket in one write-locked step.
//!
//! ### Layout
//! - `session → domain → [records]`, domains in sorted order and records in
//!   insertion order inside a bucket, so query results are reproducible.
//! - Within a bucket a record is unique by `(name, path)`; a later `put` with the
//!   same key replaces the earlier record in place (last write wins).
//!
//! ### Concurrency
//! Internally synchronized with a `RwLock`; all methods take `&self` and the
//! store is meant to be shared behind an `Arc`.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use crate::engine::cookies::{unix_now, CookieRecord};
use crate::session::SessionId;
use crate::EngineError;

/// Persisted form: `session → domain → "name|path" → record`.
pub type CookieSnapshot = BTreeMap<SessionId, BTreeMap<String, BTreeMap<String, CookieRecord>>>;

type DomainBuckets = BTreeMap<String, Vec<CookieRecord>>;

/// Returns `true` when a cookie stored under `stored` applies to `request`.
///
/// A stored domain with a leading dot matches the bare domain and every
/// subdomain of it. A stored domain without a dot is host-only and matches only
/// itself.
pub fn domain_matches(stored: &str, request: &str) -> bool {
    match stored.strip_prefix('.') {
        Some(bare) => request == bare || request.ends_with(stored),
        None => request == stored,
    }
}

#[derive(Debug, Default)]
pub struct SessionCookieStore {
    sessions: RwLock<HashMap<SessionId, DomainBuckets>>,
}

impl SessionCookieStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a store from its persisted snapshot.
    pub fn from_snapshot(snapshot: CookieSnapshot) -> Self {
        let sessions = snapshot
            .into_iter()
            .map(|(session, domains)| {
                let buckets = domains
                    .into_iter()
                    .map(|(domain, records)| (domain, records.into_values().collect()))
                    .collect();
                (session, buckets)
            })
            .collect();

        Self {
            sessions: RwLock::new(sessions),
        }
    }

    pub fn snapshot(&self) -> Result<CookieSnapshot, EngineError> {
        let sessions = self.sessions.read().map_err(|_| EngineError::Poisoned)?;

        Ok(sessions
            .iter()
            .map(|(session, buckets)| {
                let domains = buckets
                    .iter()
                    .map(|(domain, records)| {
                        let keyed = records.iter().map(|r| (r.key(), r.clone())).collect();
                        (domain.clone(), keyed)
                    })
                    .collect();
                (session.clone(), domains)
            })
            .collect())
    }

    /// Upserts `record` for `session`, keyed by `(domain, name, path)`.
    pub fn put(&self, session: &SessionId, record: CookieRecord) -> Result<(), EngineError> {
        let mut sessions = self.sessions.write().map_err(|_| EngineError::Poisoned)?;

        let bucket = sessions
            .entry(session.clone())
            .or_default()
            .entry(record.domain.clone())
            .or_default();

        match bucket
            .iter_mut()
            .find(|c| c.name == record.name && c.path == record.path)
        {
            Some(existing) => *existing = record,
            None => bucket.push(record),
        }

        Ok(())
    }

    /// Returns every live record of `session` that applies to `request_domain`.
    pub fn query_for_domain(
        &self,
        session: &SessionId,
        request_domain: &str,
    ) -> Result<Vec<CookieRecord>, EngineError> {
        self.query_for_domain_at(session, request_domain, unix_now())
    }

    pub fn query_for_domain_at(
        &self,
        session: &SessionId,
        request_domain: &str,
        now: i64,
    ) -> Result<Vec<CookieRecord>, EngineError> {
        let request_domain = request_domain.to_ascii_lowercase();
        let sessions = self.sessions.read().map_err(|_| EngineError::Poisoned)?;

        let Some(buckets) = sessions.get(session) else {
            return Ok(Vec::new());
        };

        Ok(buckets
            .iter()
            .filter(|(domain, _)| domain_matches(domain, &request_domain))
            .flat_map(|(_, records)| records.iter())
            .filter(|c| !c.is_expired_at(now))
            .cloned()
            .collect())
    }

    /// Removes all records of `session`. Returns how many were dropped.
    pub fn clear(&self, session: &SessionId) -> Result<usize, EngineError> {
        let mut sessions = self.sessions.write().map_err(|_| EngineError::Poisoned)?;
        Ok(sessions
            .remove(session)
            .map(|buckets| buckets.values().map(Vec::len).sum())
            .unwrap_or(0))
    }

    /// Drops expired records of `session`. Returns how many were dropped.
    pub fn prune_expired(&self, session: &SessionId) -> Result<usize, EngineError> {
        self.prune_expired_at(session, unix_now())
    }

    pub fn prune_expired_at(&self, session: &SessionId, now: i64) -> Result<usize, EngineError> {
        let mut sessions = self.sessions.write().map_err(|_| EngineError::Poisoned)?;

        let Some(buckets) = sessions.get_mut(session) else {
            return Ok(0);
        };

        let mut pruned = 0;
        for records in buckets.values_mut() {
            let before = records.len();
            records.retain(|c| !c.is_expired_at(now));
            pruned += before - records.len();
        }
        buckets.retain(|_, records| !records.is_empty());

        Ok(pruned)
    }

    /// Number of stored records (live or not) for `session`.
    pub fn len(&self, session: &SessionId) -> Result<usize, EngineError> {
        let sessions = self.sessions.read().map_err(|_| EngineError::Poisoned)?;
        Ok(sessions
            .get(session)
            .map(|buckets| buckets.values().map(Vec::len).sum())
            .unwrap_or(0))
    }

    /// Sessions that currently own at least one bucket.
    pub fn sessions(&self) -> Result<Vec<SessionId>, EngineError> {
        let sessions = self.sessions.read().map_err(|_| EngineError::Poisoned)?;
        let mut ids: Vec<SessionId> = sessions.keys().cloned().collect();
        ids.sort_unstable();
        Ok(ids)
    }
}
