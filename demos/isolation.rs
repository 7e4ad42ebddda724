use std::sync::Arc;

use http::header::SET_COOKIE;
use http::{HeaderMap, HeaderValue};
use tabjar::rules::{HeaderOperation, InMemoryRuleEngine};
use tabjar::storage::{InMemoryStateStore, StateStoreHandle};
use tabjar::{EngineConfig, EngineError, EngineEvent, HostEvent, RgbColor, Session, SessionEngine, TabId};

#[tokio::main]
async fn main() -> Result<(), EngineError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Configure the engine through the engine config builder.
    let engine_cfg = EngineConfig::builder()
        .max_installed_rules(200)
        .build()
        .expect("Configuration is not valid");

    // The host rule engine. A real integration forwards updates to the browser;
    // the in-memory one enforces the same contract and lets us inspect the rules.
    let host = Arc::new(InMemoryRuleEngine::with_capacity(engine_cfg.max_installed_rules));

    // Pass a path to keep the engine state in an SQLite database between runs.
    let store: StateStoreHandle = match std::env::args().nth(1) {
        #[cfg(feature = "sqlite_state_store")]
        Some(path) => Arc::new(tabjar::storage::SqliteStateStore::new(path).map_err(EngineError::Persistence)?),
        _ => Arc::new(InMemoryStateStore::new()),
    };

    // Instantiate and start the engine
    let engine = SessionEngine::new(Some(engine_cfg), host.clone(), store)?;
    let (handle, engine_join_handle) = engine.start()?;

    // Note that you will only receive events sent from this point on.
    let mut event_rx = handle.subscribe_events();

    let work = handle
        .add_session(Session::new("Work", RgbColor::new(0x1e, 0x88, 0xe5), "briefcase"))
        .await?;
    let personal = handle
        .add_session(Session::new("Personal", RgbColor::new(0x43, 0xa0, 0x47), "house"))
        .await?;

    // Two tabs on the same site, each in its own session.
    for (n, session) in [(1, &work), (2, &personal)] {
        let tab_id = TabId::new(n);
        handle
            .dispatch_and_wait(HostEvent::TabCreated { tab_id, opener_tab_id: None })
            .await?;
        handle.set_tab_session(tab_id, session.id.clone(), false).await?;
        handle
            .dispatch_and_wait(HostEvent::BeforeNavigate {
                tab_id,
                frame_id: 0,
                url: "https://mail.example.com/".into(),
            })
            .await?;

        // The site logs each tab in with a different session cookie.
        let mut headers = HeaderMap::new();
        let cookie = format!("sid={}; Domain=example.com; Path=/; Secure; HttpOnly", session.name.to_lowercase());
        headers.append(SET_COOKIE, HeaderValue::from_str(&cookie).expect("valid header value"));
        handle
            .dispatch_and_wait(HostEvent::ResponseHeaders {
                tab_id,
                url: "https://mail.example.com/login".into(),
                headers,
            })
            .await?;
    }

    // A popup opened from the work tab inherits its session.
    handle
        .dispatch_and_wait(HostEvent::TabCreated { tab_id: TabId::new(3), opener_tab_id: Some(TabId::new(1)) })
        .await?;

    for binding in handle.get_tab_session_info().await? {
        let cookie = host
            .rules_for_tab(binding.tab_id)
            .iter()
            .flat_map(|r| r.action.request_headers.iter())
            .find_map(|op| match op {
                HeaderOperation::Set { value, .. } => Some(value.clone()),
                _ => None,
            });
        println!(
            "tab {} -> session {} rules {:?} cookie {:?}",
            binding.tab_id, binding.session_id, binding.active_rule_ids, cookie
        );
    }

    // Deleting a session sends its tabs back to the native jar.
    handle.delete_session(personal.id.clone()).await?;
    println!("tab 2 is now in session {}", handle.get_tab_session(TabId::new(2)).await?);

    println!("Shutting down engine...");
    handle.shutdown().await?;

    // Wait for the engine task to finish
    if let Err(join_err) = engine_join_handle.await {
        eprintln!("engine task panicked: {join_err}");
    }

    while let Ok(ev) = event_rx.try_recv() {
        handle_event(ev);
    }

    println!("Done. Exiting.");
    Ok(())
}

fn handle_event(ev: EngineEvent) {
    match ev {
        EngineEvent::RulesInstalled { tab_id, session_id, rule_ids } => {
            println!("[event] RulesInstalled: tab={tab_id} session={session_id} ids={rule_ids:?}");
        }
        EngineEvent::CookiesCaptured { tab_id, count, .. } => {
            println!("[event] CookiesCaptured: tab={tab_id} count={count}");
        }
        other => {
            println!("[event] {:?}", other);
        }
    }
}
