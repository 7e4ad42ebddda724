//! Per-tab rule synthesis.
//!
//! For an isolated tab the synthesizer emits exactly two rules, both scoped to
//! the tab and covering every configured resource type:
//!
//! - **cookie rule**: removes the outgoing `Cookie` header and, when the session
//!   has cookies for the destination host, sets it to the session's value;
//! - **set-cookie rule**: strips every incoming `Set-Cookie` header so the host's
//!   native jar never sees it. Capturing happens through the response observer.
//!
//! Tabs in the default session, and URLs without a hostname, get no rules at all.

use std::sync::Arc;
use url::Url;

use crate::engine::cookies::{build_cookie_header_at, unix_now, SessionCookieStore};
use crate::engine::rules::{
    ActionType, HeaderOperation, ResourceType, RewriteRule, RuleAction, RuleCondition, RuleId, RuleIdAllocator,
};
use crate::session::SessionId;
use crate::tab::TabId;
use crate::{EngineConfig, EngineError};

const COOKIE: &str = "cookie";
const SET_COOKIE: &str = "set-cookie";

/// Hostname of `url`, if it has one.
pub(crate) fn request_host(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .host_str()
        .filter(|h| !h.is_empty())
        .map(|h| h.to_ascii_lowercase())
}

#[derive(Debug)]
pub struct RuleSynthesizer {
    priority: u32,
    resource_types: Vec<ResourceType>,
    allocator: RuleIdAllocator,
    cookies: Arc<SessionCookieStore>,
}

impl RuleSynthesizer {
    pub fn new(config: &EngineConfig, allocator: RuleIdAllocator, cookies: Arc<SessionCookieStore>) -> Self {
        Self {
            priority: config.rule_priority,
            resource_types: config.resource_types.clone(),
            allocator,
            cookies,
        }
    }

    pub fn allocator(&self) -> &RuleIdAllocator {
        &self.allocator
    }

    pub fn cookies(&self) -> &Arc<SessionCookieStore> {
        &self.cookies
    }

    /// Builds the rules `tab_id` needs to browse `url` inside `session`.
    pub fn build_rules_for_tab(
        &self,
        tab_id: TabId,
        session: &SessionId,
        url: &str,
    ) -> Result<Vec<RewriteRule>, EngineError> {
        self.build_rules_for_tab_at(tab_id, session, url, unix_now())
    }

    pub fn build_rules_for_tab_at(
        &self,
        tab_id: TabId,
        session: &SessionId,
        url: &str,
        now: i64,
    ) -> Result<Vec<RewriteRule>, EngineError> {
        if session.is_default() {
            return Ok(Vec::new());
        }

        let Some(host) = request_host(url) else {
            log::debug!("tab {tab_id}: {}, leaving it unmanaged", EngineError::UnresolvableUrl(url.to_string()));
            return Ok(Vec::new());
        };

        let header = build_cookie_header_at(&self.cookies, session, &host, now)?;
        let first_id = self.allocator.allocate_block()?;

        Ok(self.rules_for_header(tab_id, first_id, &header))
    }

    /// The two rules for a tab, given an already built `Cookie` header value.
    pub fn rules_for_header(&self, tab_id: TabId, first_id: RuleId, cookie_header: &str) -> Vec<RewriteRule> {
        let condition = RuleCondition {
            tab_ids: vec![tab_id],
            resource_types: self.resource_types.clone(),
        };

        let mut request_headers = vec![HeaderOperation::Remove { header: COOKIE.to_string() }];
        if !cookie_header.is_empty() {
            request_headers.push(HeaderOperation::Set {
                header: COOKIE.to_string(),
                value: cookie_header.to_string(),
            });
        }

        vec![
            RewriteRule {
                id: first_id,
                priority: self.priority,
                condition: condition.clone(),
                action: RuleAction {
                    kind: ActionType::ModifyHeaders,
                    request_headers,
                    response_headers: Vec::new(),
                },
            },
            RewriteRule {
                id: RuleId::new(first_id.as_u32() + 1),
                priority: self.priority,
                condition,
                action: RuleAction {
                    kind: ActionType::ModifyHeaders,
                    request_headers: Vec::new(),
                    response_headers: vec![HeaderOperation::Remove { header: SET_COOKIE.to_string() }],
                },
            },
        ]
    }
}
