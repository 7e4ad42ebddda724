use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::engine::events::{EngineCommand, EngineEvent, HostEvent, UserAction, TOP_LEVEL_FRAME};
use crate::engine::handle::EngineHandle;
use crate::engine::registry::TabSessionRegistry;
use crate::engine::rules::RuleEngineHandle;
use crate::engine::storage::{StateMirror, StateStoreHandle};
use crate::engine::tab::{TabCommand, TabWorker};
use crate::tab::TabId;
use crate::{EngineConfig, EngineError};

/// How long shutdown waits for tab workers to drain.
const WORKER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

struct WorkerSlot {
    tx: mpsc::Sender<TabCommand>,
    join: JoinHandle<()>,
}

/// The session isolation engine.
///
/// Owns the [`TabSessionRegistry`] and runs the inbound command loop. Tab
/// scoped events are handed to one [`TabWorker`] per tab so that events for a
/// tab are processed in arrival order, while different tabs progress
/// independently. Session-wide mutations run on the loop itself.
pub struct SessionEngine {
    config: EngineConfig,
    registry: TabSessionRegistry,
    /// Live tab workers, indexed by [`TabId`].
    workers: HashMap<TabId, WorkerSlot>,
    /// Command sender (cloned into handles). Dropped once the loop runs so that
    /// only handles keep the channel open.
    cmd_tx: Option<mpsc::Sender<EngineCommand>>,
    /// Command receiver (owned by the engine run loop).
    cmd_rx: mpsc::Receiver<EngineCommand>,
    event_tx: broadcast::Sender<EngineEvent>,
    /// Cancels every tab worker on shutdown.
    cancel: CancellationToken,
    running: bool,
}

impl SessionEngine {
    /// Create a new engine, restoring whatever `store` holds.
    ///
    /// If `config` is `None`, [`EngineConfig::default`] is used.
    ///
    /// ```
    /// use std::sync::Arc;
    /// use tabjar::rules::InMemoryRuleEngine;
    /// use tabjar::storage::InMemoryStateStore;
    /// use tabjar::SessionEngine;
    ///
    /// let engine = SessionEngine::new(
    ///     None,
    ///     Arc::new(InMemoryRuleEngine::new()),
    ///     Arc::new(InMemoryStateStore::new()),
    /// )
    /// .unwrap();
    /// assert_eq!(engine.registry().get_sessions().unwrap().len(), 1);
    /// ```
    pub fn new(
        config: Option<EngineConfig>,
        rules: RuleEngineHandle,
        store: StateStoreHandle,
    ) -> Result<Self, EngineError> {
        let config = config.unwrap_or_default();

        // Command channel on which handles talk to the engine.
        let (cmd_tx, cmd_rx) = mpsc::channel::<EngineCommand>(config.channel_capacity);

        // Broadcast event bus. Subscribe to receive engine events.
        let (event_tx, _first_rx) = broadcast::channel::<EngineEvent>(config.channel_capacity);

        let registry = TabSessionRegistry::restore(config.clone(), rules, StateMirror::new(store), event_tx.clone())?;

        Ok(Self {
            config,
            registry,
            workers: HashMap::new(),
            cmd_tx: Some(cmd_tx),
            cmd_rx,
            event_tx,
            cancel: CancellationToken::new(),
            running: false,
        })
    }

    pub fn registry(&self) -> &TabSessionRegistry {
        &self.registry
    }

    /// A handle talking to this engine. Take one before calling [`run`](Self::run).
    pub fn handle(&self) -> Result<EngineHandle, EngineError> {
        let cmd_tx = self.cmd_tx.clone().ok_or(EngineError::AlreadyRunning)?;
        Ok(EngineHandle::new(cmd_tx, self.event_tx.clone()))
    }

    /// Starts the engine loop and returns a handle to it plus the join handle.
    pub fn start(self) -> Result<(EngineHandle, JoinHandle<()>), EngineError> {
        if self.running {
            return Err(EngineError::AlreadyRunning);
        }

        let handle = self.handle()?;
        let join_handle = tokio::spawn(self.run());

        Ok((handle, join_handle))
    }

    /// Run the engine's inbound command loop.
    ///
    /// The loop ends on [`EngineCommand::Shutdown`] or once every handle is dropped.
    pub async fn run(mut self) {
        self.running = true;
        self.cmd_tx = None;
        let _ = self.event_tx.send(EngineEvent::EngineStarted);
        log::info!("session engine started");

        if let Err(err) = self.registry.reconcile().await {
            log::error!("could not reconcile restored tabs: {err}");
        }

        let mut shutdown_reply = None;
        while let Some(cmd) = self.cmd_rx.recv().await {
            match cmd {
                EngineCommand::Shutdown { reply } => {
                    shutdown_reply = Some(reply);
                    break;
                }
                cmd => self.handle_command(cmd).await,
            }
        }

        self.shutdown_impl().await;
        if let Some(reply) = shutdown_reply {
            let _ = reply.send(());
        }
    }

    async fn handle_command(&mut self, cmd: EngineCommand) {
        let registry = self.registry.clone();

        match cmd {
            EngineCommand::Event { event, ack } => self.handle_event(event, ack).await,
            EngineCommand::GetSessions { reply } => {
                let _ = reply.send(registry.get_sessions());
            }
            EngineCommand::GetTabSession { tab_id, reply } => {
                let _ = reply.send(registry.get_tab_session(tab_id));
            }
            EngineCommand::GetTabSessionInfo { reply } => {
                let _ = reply.send(registry.get_tab_session_info());
            }
            EngineCommand::SetTabSession { tab_id, session_id, reload, reply } => {
                let cmd = TabCommand::SetSession { session_id, reload, reply: Some(reply) };
                self.send_to_tab(tab_id, cmd).await;
            }
            EngineCommand::AddSession { session, reply } => {
                let _ = reply.send(registry.add_session(session));
            }
            EngineCommand::UpdateSession { session_id, patch, reply } => {
                let _ = reply.send(registry.update_session(&session_id, patch));
            }
            EngineCommand::DeleteSession { session_id, reply } => {
                let _ = reply.send(registry.delete_session(&session_id).await);
            }
            EngineCommand::ClearSessionCookies { session_id, reply } => {
                let _ = reply.send(registry.clear_session_cookies(&session_id).await);
            }
            EngineCommand::Shutdown { reply } => {
                // Handled by the loop.
                let _ = reply.send(());
            }
        }
    }

    async fn handle_event(&mut self, event: HostEvent, ack: Option<oneshot::Sender<()>>) {
        match event {
            HostEvent::TabCreated { tab_id, opener_tab_id } => {
                self.send_to_tab(tab_id, TabCommand::Created { opener: opener_tab_id, ack }).await;
            }
            HostEvent::TabRemoved { tab_id } => match self.workers.remove(&tab_id) {
                Some(slot) => {
                    if let Err(mpsc::error::SendError(cmd)) = slot.tx.send(TabCommand::Close { ack }).await {
                        log::debug!("tab {tab_id}: worker already gone");
                        let ack = match cmd {
                            TabCommand::Close { ack } => ack,
                            _ => None,
                        };
                        self.release_tab(tab_id, ack).await;
                    }
                }
                None => self.release_tab(tab_id, ack).await,
            },
            HostEvent::BeforeNavigate { tab_id, frame_id, url } => {
                if frame_id != TOP_LEVEL_FRAME {
                    log::trace!("tab {tab_id}: ignoring subframe {frame_id} navigation");
                    send_ack(ack);
                    return;
                }
                self.send_to_tab(tab_id, TabCommand::Navigate { url, ack }).await;
            }
            HostEvent::ResponseHeaders { tab_id, url, headers } => {
                self.send_to_tab(tab_id, TabCommand::ResponseHeaders { url, headers, ack }).await;
            }
            HostEvent::UserAction(action) => {
                self.handle_user_action(action).await;
                send_ack(ack);
            }
        }
    }

    async fn handle_user_action(&mut self, action: UserAction) {
        let registry = self.registry.clone();

        let res = match action {
            UserAction::SetTabSession { tab_id, session_id, reload } => {
                let (tx, rx) = oneshot::channel();
                self.send_to_tab(tab_id, TabCommand::SetSession { session_id, reload, reply: Some(tx) })
                    .await;
                match rx.await {
                    Ok(res) => res.map(|_| ()),
                    Err(_) => Err(EngineError::ChannelClosed),
                }
            }
            UserAction::AddSession(session) => registry.add_session(session).map(|_| ()),
            UserAction::UpdateSession { session_id, patch } => {
                registry.update_session(&session_id, patch).map(|_| ())
            }
            UserAction::DeleteSession(session_id) => registry.delete_session(&session_id).await,
            UserAction::ClearSessionCookies(session_id) => {
                registry.clear_session_cookies(&session_id).await.map(|_| ())
            }
        };

        if let Err(err) = res {
            log::warn!("user action failed: {err}");
        }
    }

    /// Releases a tab that has no worker to do it.
    async fn release_tab(&self, tab_id: TabId, ack: Option<oneshot::Sender<()>>) {
        if let Err(err) = self.registry.on_tab_removed(tab_id).await {
            log::warn!("tab {tab_id}: removal failed: {err}");
        }
        send_ack(ack);
    }

    /// Queues `cmd` on the tab's worker.
    ///
    /// A new worker is only spawned for `Created` or a tab with a binding;
    /// anything else is dismissed with [`EngineError::UnknownTab`]. A worker
    /// that stopped under our feet is replaced once.
    async fn send_to_tab(&mut self, tab_id: TabId, mut cmd: TabCommand) {
        for _ in 0..2 {
            let Some(tx) = self.worker_for(tab_id, &cmd) else {
                log::debug!("{}", EngineError::UnknownTab(tab_id));
                cmd.dismiss(EngineError::UnknownTab(tab_id));
                return;
            };
            match tx.send(cmd).await {
                Ok(()) => return,
                Err(mpsc::error::SendError(returned)) => {
                    self.workers.remove(&tab_id);
                    cmd = returned;
                }
            }
        }

        log::warn!("tab {tab_id}: worker keeps stopping, dropping {cmd:?}");
        cmd.dismiss(EngineError::ChannelClosed);
    }

    /// The tab's live worker, spawned on demand for `Created` or a bound tab.
    fn worker_for(&mut self, tab_id: TabId, cmd: &TabCommand) -> Option<mpsc::Sender<TabCommand>> {
        if let Some(slot) = self.workers.get(&tab_id) {
            if !slot.tx.is_closed() {
                return Some(slot.tx.clone());
            }
        }

        // Workers of unbound tabs stop on their own; reap their slots here.
        self.workers.retain(|_, slot| !slot.tx.is_closed());

        let spawn = matches!(cmd, TabCommand::Created { .. }) || matches!(self.registry.has_binding(tab_id), Ok(true));
        if !spawn {
            return None;
        }

        let (tx, rx) = mpsc::channel(self.config.tab_channel_capacity);
        let worker = TabWorker::new(tab_id, rx, self.registry.clone(), self.cancel.child_token());
        let join = tokio::spawn(worker.run());
        self.workers.insert(tab_id, WorkerSlot { tx: tx.clone(), join });

        Some(tx)
    }

    async fn shutdown_impl(&mut self) {
        // Dropping the senders lets workers drain what is already queued.
        let mut joins = JoinSet::new();
        for (_, slot) in self.workers.drain() {
            drop(slot.tx);
            let join = slot.join;
            joins.spawn(async move {
                let _ = join.await;
            });
        }

        let drained = tokio::time::timeout(WORKER_DRAIN_TIMEOUT, async {
            while joins.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            log::warn!("tab workers did not drain in time, cancelling");
            self.cancel.cancel();
        }

        log::info!("session engine stopped");
        let _ = self.event_tx.send(EngineEvent::EngineStopped);
    }
}

fn send_ack(ack: Option<oneshot::Sender<()>>) {
    if let Some(ack) = ack {
        let _ = ack.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::rules::{HeaderOperation, InMemoryRuleEngine};
    use crate::session::{RgbColor, Session, SessionId};
    use crate::storage::{InMemoryStateStore, StateStore};
    use http::header::SET_COOKIE;
    use http::{HeaderMap, HeaderValue};
    use std::sync::Arc;

    fn start() -> (EngineHandle, JoinHandle<()>, Arc<InMemoryRuleEngine>) {
        let host = Arc::new(InMemoryRuleEngine::new());
        let engine = SessionEngine::new(None, host.clone(), Arc::new(InMemoryStateStore::new())).unwrap();
        let (handle, join) = engine.start().unwrap();
        (handle, join, host)
    }

    fn navigate(tab: i64, frame_id: u32, url: &str) -> HostEvent {
        HostEvent::BeforeNavigate { tab_id: TabId::new(tab), frame_id, url: url.to_string() }
    }

    #[tokio::test]
    async fn events_flow_through_tab_workers() {
        let (handle, join, host) = start();
        let tab = TabId::new(1);

        let work = handle
            .add_session(Session::new("Work", RgbColor::new(0, 0, 255), "briefcase"))
            .await
            .unwrap();

        handle
            .dispatch_and_wait(HostEvent::TabCreated { tab_id: tab, opener_tab_id: None })
            .await
            .unwrap();
        handle.dispatch_and_wait(navigate(1, 0, "https://example.com/")).await.unwrap();
        assert!(host.is_empty());

        let ids = handle.set_tab_session(tab, work.id.clone(), true).await.unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(handle.get_tab_session(tab).await.unwrap(), work.id);

        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("sid=xyz; Secure"));
        handle
            .dispatch_and_wait(HostEvent::ResponseHeaders {
                tab_id: tab,
                url: "https://example.com/login".into(),
                headers,
            })
            .await
            .unwrap();

        let rules = host.rules_for_tab(tab);
        assert!(rules[0].action.request_headers.contains(&HeaderOperation::Set {
            header: "cookie".into(),
            value: "sid=xyz".into(),
        }));

        handle.dispatch_and_wait(HostEvent::TabRemoved { tab_id: tab }).await.unwrap();
        assert!(host.is_empty());
        assert!(handle.get_tab_session_info().await.unwrap().is_empty());

        handle.shutdown().await.unwrap();
        join.await.unwrap();
    }

    #[tokio::test]
    async fn subframe_navigations_are_ignored() {
        let (handle, join, host) = start();
        let tab = TabId::new(4);
        let work = handle.add_session(Session::new("W", RgbColor::new(1, 1, 1), "w")).await.unwrap();

        handle.dispatch_and_wait(HostEvent::TabCreated { tab_id: tab, opener_tab_id: None }).await.unwrap();
        handle.set_tab_session(tab, work.id, false).await.unwrap();
        handle.dispatch_and_wait(navigate(4, 3, "https://ads.example.net/")).await.unwrap();

        assert!(host.is_empty());
        assert_eq!(handle.get_tab_session_info().await.unwrap()[0].url, None);

        handle.shutdown().await.unwrap();
        join.await.unwrap();
    }

    #[tokio::test]
    async fn user_actions_arrive_as_events() {
        let (handle, join, host) = start();
        let mut events = handle.subscribe_events();
        let tab = TabId::new(2);
        let mut session = Session::new("Bank", RgbColor::new(0, 128, 0), "lock");
        session.id = SessionId::from("bank");

        handle.dispatch(HostEvent::UserAction(UserAction::AddSession(session))).await.unwrap();
        handle.dispatch(HostEvent::TabCreated { tab_id: tab, opener_tab_id: None }).await.unwrap();
        handle.dispatch(navigate(2, 0, "https://bank.test/")).await.unwrap();
        handle
            .dispatch_and_wait(HostEvent::UserAction(UserAction::SetTabSession {
                tab_id: tab,
                session_id: SessionId::from("bank"),
                reload: true,
            }))
            .await
            .unwrap();
        assert_eq!(host.rules_for_tab(tab).len(), 2);

        handle
            .dispatch_and_wait(HostEvent::UserAction(UserAction::DeleteSession(SessionId::from("bank"))))
            .await
            .unwrap();
        assert!(host.is_empty());
        assert_eq!(handle.get_tab_session(tab).await.unwrap(), SessionId::default());
        assert!(matches!(
            handle.delete_session(SessionId::default()).await,
            Err(EngineError::CannotDeleteDefault)
        ));

        handle.shutdown().await.unwrap();
        join.await.unwrap();

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(seen.contains(&EngineEvent::ReloadRequested { tab_id: tab }));
        assert!(seen.contains(&EngineEvent::SessionsChanged));
        assert_eq!(seen.last(), Some(&EngineEvent::EngineStopped));
    }

    async fn feed(engine: &mut SessionEngine, event: HostEvent) {
        let (ack, done) = oneshot::channel();
        engine.handle_event(event, Some(ack)).await;
        done.await.unwrap();
    }

    #[tokio::test]
    async fn late_events_for_closed_tabs_spawn_no_workers() {
        let mut engine =
            SessionEngine::new(None, Arc::new(InMemoryRuleEngine::new()), Arc::new(InMemoryStateStore::new())).unwrap();

        for n in 1..=50 {
            let tab_id = TabId::new(n);
            feed(&mut engine, HostEvent::TabCreated { tab_id, opener_tab_id: None }).await;
            assert_eq!(engine.workers.len(), 1);
            feed(&mut engine, HostEvent::TabRemoved { tab_id }).await;

            let mut headers = HeaderMap::new();
            headers.append(SET_COOKIE, HeaderValue::from_static("late=1"));
            feed(&mut engine, HostEvent::ResponseHeaders { tab_id, url: "https://example.com/".into(), headers }).await;
            feed(&mut engine, navigate(n, 0, "https://example.com/")).await;
        }

        assert!(engine.workers.is_empty());
        assert!(engine.registry().get_tab_session_info().unwrap().is_empty());

        let (reply, rx) = oneshot::channel();
        engine
            .send_to_tab(TabId::new(7), TabCommand::SetSession { session_id: SessionId::default(), reload: false, reply: Some(reply) })
            .await;
        assert!(matches!(rx.await.unwrap(), Err(EngineError::UnknownTab(_))));
        assert!(engine.workers.is_empty());
    }

    #[tokio::test]
    async fn restored_tabs_get_workers_without_a_created_event() {
        let store = Arc::new(InMemoryStateStore::new());
        store
            .set_item(crate::storage::TAB_SESSIONS_KEY, r#"{"5":{"tabId":5,"sessionId":"default","activeRuleIds":[]}}"#)
            .unwrap();
        let mut engine = SessionEngine::new(None, Arc::new(InMemoryRuleEngine::new()), store).unwrap();

        feed(&mut engine, navigate(5, 0, "https://example.com/")).await;
        assert_eq!(engine.workers.len(), 1);
        assert_eq!(
            engine.registry().get_tab_session_info().unwrap()[0].url.as_ref().map(|u| u.as_str()),
            Some("https://example.com/")
        );
    }

    #[tokio::test]
    async fn loop_ends_when_handles_are_dropped() {
        let (handle, join, _host) = start();
        assert_eq!(handle.get_sessions().await.unwrap().len(), 1);
        drop(handle);
        join.await.unwrap();
    }
}
