//! Tab session registry.
//!
//! The registry is the authoritative map of tab → [`TabBinding`]. It owns the
//! session list, the cookie store and the rule synthesizer, and is the single
//! place where a tab's rules get installed or removed in the host.
//!
//! ### Concurrency
//! Every mutation of one tab's binding and rule set runs under that tab's
//! `tokio::sync::Mutex`, held across the host round-trip. The binding map and
//! session list sit behind short `std::sync` critical sections that are never
//! held across an `.await`.
//!
//! Lock order when more than one is taken: bindings, then sessions, then the
//! state mirror. The cookie store is always taken last.
//!
//! A tab lock is only handed out while the tab has a binding, and cookies are
//! only stored while the session list holds their session.
//!
//! ### Persistence
//! Every mutation is mirrored to the [`StateMirror`]. A failed write is logged
//! and otherwise ignored: isolation keeps working from memory.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use http::HeaderMap;
use tokio::sync::broadcast;
use url::Url;

use crate::engine::cookies::{parse_set_cookie, set_cookie_values, CookieRecord, SessionCookieStore};
use crate::engine::events::EngineEvent;
use crate::engine::rules::{RuleEngineError, RuleEngineHandle, RuleId, RuleIdAllocator, RuleSynthesizer};
use crate::engine::storage::{StateMirror, RULE_ID_COUNTER_KEY, SESSION_COOKIES_KEY};
use crate::session::{Session, SessionId, SessionPatch};
use crate::tab::{TabBinding, TabId};
use crate::{EngineConfig, EngineError};

type TabLock = Arc<tokio::sync::Mutex<()>>;

#[derive(Clone)]
pub struct TabSessionRegistry {
    inner: Arc<Inner>,
}

struct Inner {
    config: EngineConfig,
    sessions: RwLock<Vec<Session>>,
    bindings: Mutex<HashMap<TabId, TabBinding>>,
    tab_locks: Mutex<HashMap<TabId, TabLock>>,
    synthesizer: RuleSynthesizer,
    rules: RuleEngineHandle,
    mirror: StateMirror,
    event_tx: broadcast::Sender<EngineEvent>,
}

impl std::fmt::Debug for TabSessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TabSessionRegistry")
            .field("config", &self.inner.config)
            .field("mirror", &self.inner.mirror)
            .finish_non_exhaustive()
    }
}

impl TabSessionRegistry {
    /// Rebuilds the registry from whatever `mirror` holds.
    ///
    /// The default session is re-inserted when missing, bindings that point at
    /// an unknown session fall back to the default one and cookies of unknown
    /// sessions are dropped. The rule-id counter resumes past every id recorded
    /// in a binding. The normalized state is written back before returning.
    pub fn restore(
        config: EngineConfig,
        rules: RuleEngineHandle,
        mirror: StateMirror,
        event_tx: broadcast::Sender<EngineEvent>,
    ) -> Result<Self, EngineError> {
        let state = mirror.load().map_err(EngineError::Persistence)?;

        let mut sessions = state.sessions;
        if !sessions.iter().any(|s| s.id.is_default()) {
            sessions.insert(0, Session::builtin_default());
        }
        let known: HashSet<SessionId> = sessions.iter().map(|s| s.id.clone()).collect();

        let mut bindings = HashMap::with_capacity(state.tab_sessions.len());
        for (tab_id, mut binding) in state.tab_sessions {
            if !known.contains(&binding.session_id) {
                log::info!("tab {tab_id}: session {} no longer exists, using default", binding.session_id);
                binding.session_id = SessionId::default();
            }
            bindings.insert(tab_id, binding);
        }

        let mut session_cookies = state.session_cookies;
        session_cookies.retain(|session, _| !session.is_default() && known.contains(session));

        let resume_at = bindings
            .values()
            .flat_map(|b| b.active_rule_ids.iter())
            .map(|id| id.as_u32().saturating_add(1))
            .max()
            .unwrap_or(1)
            .max(state.rule_id_counter.unwrap_or(1));

        let allocator = RuleIdAllocator::new(resume_at, config.rule_id_block_size);
        let cookies = Arc::new(SessionCookieStore::from_snapshot(session_cookies));
        let synthesizer = RuleSynthesizer::new(&config, allocator, cookies);

        log::info!(
            "restored {} sessions and {} tab bindings, next rule id {resume_at}, room for {} isolated tabs",
            sessions.len(),
            bindings.len(),
            config.isolated_tab_budget()
        );

        let registry = Self {
            inner: Arc::new(Inner {
                config,
                sessions: RwLock::new(sessions),
                bindings: Mutex::new(bindings),
                tab_locks: Mutex::new(HashMap::new()),
                synthesizer,
                rules,
                mirror,
                event_tx,
            }),
        };

        registry.persist_sessions();
        registry.persist_bindings();
        registry.persist_cookies();
        registry.persist_rule_counter();

        Ok(registry)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn cookies(&self) -> &Arc<SessionCookieStore> {
        self.inner.synthesizer.cookies()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Brings the host in line with the restored bindings.
    ///
    /// Isolated tabs with a known URL get fresh rules. Every other tab has its
    /// recorded rule ids removed.
    pub async fn reconcile(&self) -> Result<(), EngineError> {
        let targets: Vec<(TabId, SessionId, Option<String>)> = self
            .lock_bindings()?
            .values()
            .map(|b| {
                let url = b.url.as_ref().filter(|_| b.is_isolated()).map(Url::to_string);
                (b.tab_id, b.session_id.clone(), url)
            })
            .collect();

        for (tab_id, session, url) in targets {
            let Some(lock) = self.bound_tab_lock(tab_id)? else {
                continue;
            };
            let _guard = lock.lock().await;

            if let Err(err) = self.install_locked(tab_id, &session, url.as_deref()).await {
                log::warn!("tab {tab_id}: could not reconcile rules: {err}");
            }
        }

        Ok(())
    }

    // ---------- Tab lifecycle ----------

    /// Binds a new tab to its opener's session, or to the default session.
    pub fn on_tab_created(&self, tab_id: TabId, opener: Option<TabId>) -> Result<SessionId, EngineError> {
        let session = {
            let mut bindings = self.lock_bindings()?;
            let inherited = opener
                .and_then(|o| bindings.get(&o))
                .map(|b| b.session_id.clone())
                .unwrap_or_default();

            bindings
                .entry(tab_id)
                .or_insert_with(|| TabBinding::new(tab_id, inherited))
                .session_id
                .clone()
        };

        log::debug!("tab {tab_id}: created in session {session}");
        self.persist_bindings();
        Ok(session)
    }

    /// Top-level navigation: remembers the URL and rebuilds the tab's rules for it.
    pub async fn on_navigate(&self, tab_id: TabId, url: &str) -> Result<Vec<RuleId>, EngineError> {
        let Some(lock) = self.bound_tab_lock(tab_id)? else {
            log::debug!("{}", EngineError::UnknownTab(tab_id));
            return Ok(Vec::new());
        };
        let _guard = lock.lock().await;

        let session = {
            let mut bindings = self.lock_bindings()?;
            let Some(binding) = bindings.get_mut(&tab_id) else {
                log::debug!("{}", EngineError::UnknownTab(tab_id));
                return Ok(Vec::new());
            };
            binding.url = Url::parse(url).ok();
            if !binding.session_id.is_default() && !self.session_exists(&binding.session_id)? {
                log::info!("tab {tab_id}: session {} is gone, using default", binding.session_id);
                binding.session_id = SessionId::default();
            }
            binding.session_id.clone()
        };

        self.install_locked(tab_id, &session, Some(url)).await
    }

    /// Moves a tab to `session_id` and installs the rules for its current URL.
    ///
    /// Fails with [`EngineError::UnknownTab`] and changes nothing when the tab
    /// has no binding. When `reload` is set a [`EngineEvent::ReloadRequested`]
    /// is published once the rules are in place.
    pub async fn set_session(
        &self,
        tab_id: TabId,
        session_id: SessionId,
        reload: bool,
    ) -> Result<Vec<RuleId>, EngineError> {
        if !self.session_exists(&session_id)? {
            return Err(EngineError::SessionNotFound(session_id));
        }

        let Some(lock) = self.bound_tab_lock(tab_id)? else {
            log::debug!("{}", EngineError::UnknownTab(tab_id));
            return Err(EngineError::UnknownTab(tab_id));
        };
        let _guard = lock.lock().await;

        let url = {
            let mut bindings = self.lock_bindings()?;
            let Some(binding) = bindings.get_mut(&tab_id) else {
                return Err(EngineError::UnknownTab(tab_id));
            };
            binding.session_id = session_id.clone();
            binding.url.as_ref().map(Url::to_string)
        };

        log::info!("tab {tab_id}: switched to session {session_id}");
        let ids = self.install_locked(tab_id, &session_id, url.as_deref()).await?;

        if reload {
            let _ = self.inner.event_tx.send(EngineEvent::ReloadRequested { tab_id });
        }

        Ok(ids)
    }

    /// Releases the tab's rules and forgets it.
    pub async fn on_tab_removed(&self, tab_id: TabId) -> Result<(), EngineError> {
        let lock = self.tab_lock(tab_id)?;
        let _guard = lock.lock().await;

        let removed = self.lock_bindings()?.remove(&tab_id);
        self.lock_tab_locks()?.remove(&tab_id);

        let Some(binding) = removed else {
            log::debug!("{}", EngineError::UnknownTab(tab_id));
            return Ok(());
        };

        if !binding.active_rule_ids.is_empty() {
            if let Err(err) = self
                .inner
                .rules
                .update_session_rules(Vec::new(), binding.active_rule_ids.clone())
                .await
            {
                log::warn!("tab {tab_id}: could not release rules {:?}: {err}", binding.active_rule_ids);
            }
        }

        log::debug!("tab {tab_id}: removed");
        self.persist_bindings();
        Ok(())
    }

    /// Every tab bound to `session` falls back to the default session with no rules.
    pub async fn on_session_deleted(&self, session: &SessionId) -> Result<(), EngineError> {
        for tab_id in self.tabs_in_session(session)? {
            let Some(lock) = self.bound_tab_lock(tab_id)? else {
                continue;
            };
            let _guard = lock.lock().await;

            let moved = {
                let mut bindings = self.lock_bindings()?;
                match bindings.get_mut(&tab_id) {
                    Some(b) if b.session_id == *session => {
                        b.session_id = SessionId::default();
                        true
                    }
                    _ => false,
                }
            };

            if moved {
                if let Err(err) = self.install_locked(tab_id, &SessionId::default(), None).await {
                    log::warn!("tab {tab_id}: could not drop rules of deleted session {session}: {err}");
                }
            }
        }

        Ok(())
    }

    // ---------- Cookies ----------

    /// Stores a captured cookie and refreshes the tab's rules.
    ///
    /// Fails with [`EngineError::SessionNotFound`] when `session` is not live.
    pub async fn on_cookie_captured(
        &self,
        tab_id: TabId,
        session: &SessionId,
        record: CookieRecord,
    ) -> Result<Vec<RuleId>, EngineError> {
        if session.is_default() {
            log::debug!("tab {tab_id}: ignoring cookie {} for the default session", record.name);
            return Ok(Vec::new());
        }

        self.store_cookies(session, vec![record])?;
        self.persist_cookies();
        let _ = self.inner.event_tx.send(EngineEvent::CookiesCaptured {
            tab_id,
            session_id: session.clone(),
            count: 1,
        });

        self.refresh_tab(tab_id, session, None).await
    }

    /// Captures every `Set-Cookie` of a response into the tab's session.
    ///
    /// Malformed values are skipped. Returns how many cookies were stored.
    pub async fn on_response_headers(
        &self,
        tab_id: TabId,
        url: &str,
        headers: &HeaderMap,
    ) -> Result<usize, EngineError> {
        let session = self.lock_bindings()?.get(&tab_id).map(|b| b.session_id.clone());
        let Some(session) = session else {
            log::debug!("{}", EngineError::UnknownTab(tab_id));
            return Ok(0);
        };
        if session.is_default() {
            return Ok(0);
        }

        let records: Vec<CookieRecord> = set_cookie_values(headers)
            .iter()
            .filter_map(|value| match parse_set_cookie(value, url) {
                Ok(record) => Some(record),
                Err(err) => {
                    log::debug!("tab {tab_id}: skipping Set-Cookie from {url}: {err}");
                    None
                }
            })
            .collect();
        if records.is_empty() {
            return Ok(0);
        }

        let captured = match self.store_cookies(&session, records) {
            Ok(count) => count,
            Err(EngineError::SessionNotFound(_)) => {
                log::debug!("tab {tab_id}: session {session} is gone, dropping cookies from {url}");
                return Ok(0);
            }
            Err(err) => return Err(err),
        };

        self.persist_cookies();
        let _ = self.inner.event_tx.send(EngineEvent::CookiesCaptured {
            tab_id,
            session_id: session.clone(),
            count: captured,
        });

        if let Err(err) = self.refresh_tab(tab_id, &session, Some(url)).await {
            log::debug!("tab {tab_id}: rules not refreshed after capture: {err}");
        }

        Ok(captured)
    }

    // ---------- Rule installation ----------

    /// Replaces the tab's rules with a fresh set for `url` in `session`.
    pub async fn install_rules_for_tab(
        &self,
        tab_id: TabId,
        session: &SessionId,
        url: &str,
    ) -> Result<Vec<RuleId>, EngineError> {
        let lock = self.bound_tab_lock(tab_id)?.ok_or(EngineError::UnknownTab(tab_id))?;
        let _guard = lock.lock().await;

        self.install_locked(tab_id, session, Some(url)).await
    }

    /// Rebuilds the tab's rules from its binding, if it is still in `session`.
    async fn refresh_tab(
        &self,
        tab_id: TabId,
        session: &SessionId,
        fallback_url: Option<&str>,
    ) -> Result<Vec<RuleId>, EngineError> {
        let Some(lock) = self.bound_tab_lock(tab_id)? else {
            return Ok(Vec::new());
        };
        let _guard = lock.lock().await;

        let url = self
            .lock_bindings()?
            .get(&tab_id)
            .filter(|b| b.session_id == *session)
            .map(|b| b.url.as_ref().map(Url::to_string).or_else(|| fallback_url.map(str::to_string)));

        match url {
            Some(Some(url)) => self.install_locked(tab_id, session, Some(&url)).await,
            _ => Ok(Vec::new()),
        }
    }

    /// Swaps the tab's rules. The caller holds the tab lock.
    ///
    /// On rejection the previous rules are removed on their own; the binding
    /// then records no rules, or the previous ones when even removal fails.
    async fn install_locked(
        &self,
        tab_id: TabId,
        session: &SessionId,
        url: Option<&str>,
    ) -> Result<Vec<RuleId>, EngineError> {
        let previous = self.lock_bindings()?.get(&tab_id).map(|b| b.active_rule_ids.clone());
        let Some(previous) = previous else {
            return Err(EngineError::UnknownTab(tab_id));
        };

        let rules = match url {
            Some(url) => self.inner.synthesizer.build_rules_for_tab(tab_id, session, url)?,
            None => Vec::new(),
        };
        if !rules.is_empty() {
            self.persist_rule_counter();
        }

        if rules.is_empty() && previous.is_empty() {
            self.persist_bindings();
            return Ok(Vec::new());
        }

        let ids: Vec<RuleId> = rules.iter().map(|r| r.id).collect();
        let result = match self.check_budget(tab_id, ids.len()) {
            Ok(()) => self.inner.rules.update_session_rules(rules, previous.clone()).await,
            Err(err) => Err(err),
        };

        match result {
            Ok(()) => {
                self.record_rule_ids(tab_id, ids.clone())?;
                log::debug!("tab {tab_id}: installed rules {ids:?} (removed {previous:?})");
                if !ids.is_empty() {
                    let _ = self.inner.event_tx.send(EngineEvent::RulesInstalled {
                        tab_id,
                        session_id: session.clone(),
                        rule_ids: ids.clone(),
                    });
                }
                Ok(ids)
            }
            Err(source) => {
                log::warn!("tab {tab_id}: host rejected rules: {source}");

                let still_installed = if previous.is_empty() {
                    Vec::new()
                } else {
                    match self.inner.rules.update_session_rules(Vec::new(), previous.clone()).await {
                        Ok(()) => Vec::new(),
                        Err(err) => {
                            log::warn!("tab {tab_id}: could not remove previous rules either: {err}");
                            previous
                        }
                    }
                };
                self.record_rule_ids(tab_id, still_installed)?;

                let _ = self.inner.event_tx.send(EngineEvent::RuleInstallFailed {
                    tab_id,
                    reason: source.to_string(),
                });
                Err(EngineError::RuleInstallRejected { tab_id, source })
            }
        }
    }

    /// Rejects a rule set that would take the engine past its configured cap.
    fn check_budget(&self, tab_id: TabId, adding: usize) -> Result<(), RuleEngineError> {
        let cap = self.inner.config.max_installed_rules;
        let others: usize = match self.lock_bindings() {
            Ok(bindings) => bindings
                .values()
                .filter(|b| b.tab_id != tab_id)
                .map(|b| b.active_rule_ids.len())
                .sum(),
            Err(err) => return Err(RuleEngineError::Host(err.to_string())),
        };

        let requested = others + adding;
        if requested > cap {
            return Err(RuleEngineError::CapExceeded { cap, requested });
        }
        Ok(())
    }

    fn record_rule_ids(&self, tab_id: TabId, ids: Vec<RuleId>) -> Result<(), EngineError> {
        if let Some(binding) = self.lock_bindings()?.get_mut(&tab_id) {
            binding.active_rule_ids = ids;
        }
        self.persist_bindings();
        Ok(())
    }

    // ---------- Control surface ----------

    pub fn get_sessions(&self) -> Result<Vec<Session>, EngineError> {
        Ok(self.inner.sessions.read().map_err(|_| EngineError::Poisoned)?.clone())
    }

    pub fn get_tab_session(&self, tab_id: TabId) -> Result<SessionId, EngineError> {
        self.lock_bindings()?
            .get(&tab_id)
            .map(|b| b.session_id.clone())
            .ok_or(EngineError::UnknownTab(tab_id))
    }

    /// Every live binding, ordered by tab id.
    pub fn get_tab_session_info(&self) -> Result<Vec<TabBinding>, EngineError> {
        let mut bindings: Vec<TabBinding> = self.lock_bindings()?.values().cloned().collect();
        bindings.sort_by_key(|b| b.tab_id);
        Ok(bindings)
    }

    /// Adds a session. An empty id is replaced by a generated one.
    pub fn add_session(&self, mut session: Session) -> Result<Session, EngineError> {
        if session.id.as_str().is_empty() {
            session.id = SessionId::new();
        }

        {
            let mut sessions = self.inner.sessions.write().map_err(|_| EngineError::Poisoned)?;
            if session.id.is_default() || sessions.iter().any(|s| s.id == session.id) {
                return Err(EngineError::SessionAlreadyExists(session.id));
            }
            sessions.push(session.clone());
        }

        log::info!("session {} ({}) added", session.id, session.name);
        self.persist_sessions();
        let _ = self.inner.event_tx.send(EngineEvent::SessionsChanged);
        Ok(session)
    }

    pub fn update_session(&self, session_id: &SessionId, patch: SessionPatch) -> Result<Session, EngineError> {
        let updated = {
            let mut sessions = self.inner.sessions.write().map_err(|_| EngineError::Poisoned)?;
            let session = sessions
                .iter_mut()
                .find(|s| s.id == *session_id)
                .ok_or_else(|| EngineError::SessionNotFound(session_id.clone()))?;
            session.apply(patch);
            session.clone()
        };

        self.persist_sessions();
        let _ = self.inner.event_tx.send(EngineEvent::SessionsChanged);
        Ok(updated)
    }

    /// Deletes a session, purges its cookies and moves its tabs to the default session.
    pub async fn delete_session(&self, session_id: &SessionId) -> Result<(), EngineError> {
        if session_id.is_default() {
            return Err(EngineError::CannotDeleteDefault);
        }

        let purged = {
            let mut sessions = self.inner.sessions.write().map_err(|_| EngineError::Poisoned)?;
            let pos = sessions
                .iter()
                .position(|s| s.id == *session_id)
                .ok_or_else(|| EngineError::SessionNotFound(session_id.clone()))?;
            sessions.remove(pos);
            self.cookies().clear(session_id)?
        };
        self.persist_sessions();
        self.persist_cookies();
        log::info!("session {session_id} deleted, {purged} cookies purged");

        self.on_session_deleted(session_id).await?;
        let _ = self.inner.event_tx.send(EngineEvent::SessionsChanged);
        Ok(())
    }

    /// Drops every cookie of a session and rebuilds the rules of its tabs.
    pub async fn clear_session_cookies(&self, session_id: &SessionId) -> Result<usize, EngineError> {
        if !self.session_exists(session_id)? {
            return Err(EngineError::SessionNotFound(session_id.clone()));
        }

        let cleared = self.cookies().clear(session_id)?;
        self.persist_cookies();
        log::info!("session {session_id}: cleared {cleared} cookies");

        if !session_id.is_default() {
            for tab_id in self.tabs_in_session(session_id)? {
                if let Err(err) = self.refresh_tab(tab_id, session_id, None).await {
                    log::warn!("tab {tab_id}: rules not refreshed after clearing cookies: {err}");
                }
            }
        }

        Ok(cleared)
    }

    // ---------- Helpers ----------

    fn lock_bindings(&self) -> Result<MutexGuard<'_, HashMap<TabId, TabBinding>>, EngineError> {
        self.inner.bindings.lock().map_err(|_| EngineError::Poisoned)
    }

    fn lock_tab_locks(&self) -> Result<MutexGuard<'_, HashMap<TabId, TabLock>>, EngineError> {
        self.inner.tab_locks.lock().map_err(|_| EngineError::Poisoned)
    }

    fn tab_lock(&self, tab_id: TabId) -> Result<TabLock, EngineError> {
        Ok(self.lock_tab_locks()?.entry(tab_id).or_default().clone())
    }

    /// The tab's lock, or `None` when the tab has no binding.
    fn bound_tab_lock(&self, tab_id: TabId) -> Result<Option<TabLock>, EngineError> {
        let bindings = self.lock_bindings()?;
        if !bindings.contains_key(&tab_id) {
            return Ok(None);
        }
        Ok(Some(self.lock_tab_locks()?.entry(tab_id).or_default().clone()))
    }

    pub(crate) fn has_binding(&self, tab_id: TabId) -> Result<bool, EngineError> {
        Ok(self.lock_bindings()?.contains_key(&tab_id))
    }

    /// Puts `records` into `session` while holding the session list.
    fn store_cookies(&self, session: &SessionId, records: Vec<CookieRecord>) -> Result<usize, EngineError> {
        let sessions = self.inner.sessions.read().map_err(|_| EngineError::Poisoned)?;
        if !sessions.iter().any(|s| s.id == *session) {
            return Err(EngineError::SessionNotFound(session.clone()));
        }

        let count = records.len();
        for record in records {
            self.cookies().put(session, record)?;
        }
        Ok(count)
    }

    fn session_exists(&self, session_id: &SessionId) -> Result<bool, EngineError> {
        let sessions = self.inner.sessions.read().map_err(|_| EngineError::Poisoned)?;
        Ok(sessions.iter().any(|s| s.id == *session_id))
    }

    fn tabs_in_session(&self, session: &SessionId) -> Result<Vec<TabId>, EngineError> {
        let mut tabs: Vec<TabId> = self
            .lock_bindings()?
            .values()
            .filter(|b| b.session_id == *session)
            .map(|b| b.tab_id)
            .collect();
        tabs.sort_unstable();
        Ok(tabs)
    }

    fn persist_sessions(&self) {
        let result = match self.inner.sessions.read() {
            Ok(sessions) => self.inner.mirror.save_sessions(&sessions),
            Err(_) => Err(anyhow::anyhow!("session list poisoned")),
        };
        log_persist_failure("sessions", result);
    }

    fn persist_bindings(&self) {
        let result = match self.inner.bindings.lock() {
            Ok(bindings) => self.inner.mirror.save_bindings(bindings.values()),
            Err(_) => Err(anyhow::anyhow!("binding map poisoned")),
        };
        log_persist_failure("tab bindings", result);
    }

    fn persist_cookies(&self) {
        let cookies = self.cookies();
        let result = self
            .inner
            .mirror
            .write_with(SESSION_COOKIES_KEY, || Ok(cookies.snapshot()?));
        log_persist_failure("session cookies", result);
    }

    fn persist_rule_counter(&self) {
        let allocator = self.inner.synthesizer.allocator();
        let result = self
            .inner
            .mirror
            .write_with(RULE_ID_COUNTER_KEY, || Ok(allocator.peek_next()));
        log_persist_failure("rule id counter", result);
    }
}

fn log_persist_failure(what: &str, result: anyhow::Result<()>) {
    if let Err(err) = result {
        log::error!("failed to persist {what}: {err:#}");
    }
}
