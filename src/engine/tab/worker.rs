use http::HeaderMap;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::engine::registry::TabSessionRegistry;
use crate::engine::rules::RuleId;
use crate::session::SessionId;
use crate::tab::TabId;
use crate::EngineError;

pub type Ack = Option<oneshot::Sender<()>>;

/// Work queued for a single tab. Commands for one tab run strictly in order.
#[derive(Debug)]
pub enum TabCommand {
    Created { opener: Option<TabId>, ack: Ack },
    Navigate { url: String, ack: Ack },
    ResponseHeaders { url: String, headers: HeaderMap, ack: Ack },
    SetSession {
        session_id: SessionId,
        reload: bool,
        reply: Option<oneshot::Sender<Result<Vec<RuleId>, EngineError>>>,
    },
    /// Release the tab and stop the worker.
    Close { ack: Ack },
}

impl TabCommand {
    /// Completes the command without running it. A pending reply gets `err`.
    pub fn dismiss(self, err: EngineError) {
        match self {
            TabCommand::Created { ack, .. }
            | TabCommand::Navigate { ack, .. }
            | TabCommand::ResponseHeaders { ack, .. }
            | TabCommand::Close { ack } => send_ack(ack),
            TabCommand::SetSession { reply, .. } => {
                if let Some(reply) = reply {
                    let _ = reply.send(Err(err));
                }
            }
        }
    }
}

pub struct TabWorker {
    tab_id: TabId,
    cmd_rx: mpsc::Receiver<TabCommand>,
    registry: TabSessionRegistry,
    cancel: CancellationToken,
}

impl TabWorker {
    pub fn new(
        tab_id: TabId,
        cmd_rx: mpsc::Receiver<TabCommand>,
        registry: TabSessionRegistry,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            tab_id,
            cmd_rx,
            registry,
            cancel,
        }
    }

    /// Processes commands until the tab is gone, the channel closes or the
    /// worker is cancelled.
    ///
    /// Once the tab has no binding the channel is closed, so new sends fail,
    /// and whatever was already queued still runs before the worker exits.
    pub async fn run(mut self) {
        log::trace!("tab {}: worker started", self.tab_id);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    log::trace!("tab {}: worker cancelled", self.tab_id);
                    return;
                }
                msg = self.cmd_rx.recv() => {
                    let Some(cmd) = msg else {
                        break;
                    };
                    if !self.handle_command(cmd).await {
                        break;
                    }
                }
            }
        }

        self.cmd_rx.close();
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            self.handle_command(cmd).await;
        }

        log::trace!("tab {}: worker stopped", self.tab_id);
    }

    /// Runs one command. Returns `false` once the tab has no binding anymore.
    async fn handle_command(&mut self, cmd: TabCommand) -> bool {
        let tab_id = self.tab_id;

        match cmd {
            TabCommand::Created { opener, ack } => {
                if let Err(err) = self.registry.on_tab_created(tab_id, opener) {
                    log::warn!("tab {tab_id}: could not bind new tab: {err}");
                }
                send_ack(ack);
            }
            TabCommand::Navigate { url, ack } => {
                if let Err(err) = self.registry.on_navigate(tab_id, &url).await {
                    log::warn!("tab {tab_id}: navigation to {url} left without rules: {err}");
                }
                send_ack(ack);
            }
            TabCommand::ResponseHeaders { url, headers, ack } => {
                if let Err(err) = self.registry.on_response_headers(tab_id, &url, &headers).await {
                    log::warn!("tab {tab_id}: cookies from {url} not captured: {err}");
                }
                send_ack(ack);
            }
            TabCommand::SetSession { session_id, reload, reply } => {
                let res = self.registry.set_session(tab_id, session_id, reload).await;
                match reply {
                    Some(reply) => {
                        let _ = reply.send(res);
                    }
                    None => {
                        if let Err(err) = res {
                            log::warn!("tab {tab_id}: session switch failed: {err}");
                        }
                    }
                }
            }
            TabCommand::Close { ack } => {
                if let Err(err) = self.registry.on_tab_removed(tab_id).await {
                    log::warn!("tab {tab_id}: removal failed: {err}");
                }
                send_ack(ack);
                return false;
            }
        }

        matches!(self.registry.has_binding(tab_id), Ok(true))
    }
}

fn send_ack(ack: Ack) {
    if let Some(ack) = ack {
        let _ = ack.send(());
    }
}
