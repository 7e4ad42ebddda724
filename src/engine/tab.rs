// src/engine/tab.rs
//! Tab system: [`TabId`], [`TabBinding`] and the per-tab worker.
//!

mod worker;

pub(crate) use worker::{TabCommand, TabWorker};

use crate::engine::rules::RuleId;
use crate::session::SessionId;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use url::Url;

/// Identifier of a host tab. Hosts hand out small integers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(i64);

impl TabId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl From<i64> for TabId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl Display for TabId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The live association of a tab with a session and its installed rewrite rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabBinding {
    pub tab_id: TabId,
    pub session_id: SessionId,
    /// Rule ids currently installed in the host for this tab.
    pub active_rule_ids: Vec<RuleId>,
    /// Last top-level URL seen for this tab.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<Url>,
}

impl TabBinding {
    pub fn new(tab_id: TabId, session_id: SessionId) -> Self {
        Self {
            tab_id,
            session_id,
            active_rule_ids: Vec::new(),
            url: None,
        }
    }

    pub fn is_isolated(&self) -> bool {
        !self.session_id.is_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_persists_in_camel_case() {
        let mut b = TabBinding::new(TabId::new(7), SessionId::from("work"));
        b.active_rule_ids = vec![RuleId::new(101), RuleId::new(102)];

        let json = serde_json::to_value(&b).unwrap();
        assert_eq!(json["tabId"], 7);
        assert_eq!(json["sessionId"], "work");
        assert_eq!(json["activeRuleIds"], serde_json::json!([101, 102]));
        assert!(json.get("url").is_none());

        let back: TabBinding = serde_json::from_value(json).unwrap();
        assert_eq!(back, b);
    }

    #[test]
    fn binding_url_persists_as_a_string() {
        let mut b = TabBinding::new(TabId::new(2), SessionId::from("work"));
        b.url = Some(Url::parse("https://mail.example.com/inbox").unwrap());

        let json = serde_json::to_value(&b).unwrap();
        assert_eq!(json["url"], "https://mail.example.com/inbox");

        let back: TabBinding = serde_json::from_value(json).unwrap();
        assert_eq!(back.url, b.url);
    }

    #[test]
    fn default_binding_is_not_isolated() {
        assert!(!TabBinding::new(TabId::new(1), SessionId::default()).is_isolated());
    }
}
