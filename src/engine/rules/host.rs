//! Host rule engine seam.
//!
//! The host enforces rewrite rules; this crate only tells it which rules to add
//! and remove. [`RuleEngine`] is object safe and asynchronous (the host is usually
//! behind an IPC boundary), so methods return a boxed future.
//!
//! Implementations must treat an update as atomic (either every addition and
//! removal applies or none does) and must treat removal of an unknown id as a
//! no-op rather than an error.
//!
//! [`InMemoryRuleEngine`] is a reference implementation with the same contract
//! and global cap as the real host. Embedders use it for headless runs and tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use futures::future::{self, BoxFuture};

use crate::engine::rules::{RewriteRule, RuleId, MAX_INSTALLED_RULES};
use crate::tab::TabId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleEngineError {
    #[error("Rule cap exceeded: {requested} rules requested, cap is {cap}")]
    CapExceeded { cap: usize, requested: usize },

    #[error("Duplicate rule id {0}")]
    DuplicateRuleId(RuleId),

    #[error("Invalid rule {id}: {reason}")]
    InvalidRule { id: RuleId, reason: String },

    #[error("Host error: {0}")]
    Host(String),
}

pub type RuleEngineHandle = Arc<dyn RuleEngine + Send + Sync>;

pub trait RuleEngine: Send + Sync {
    /// Atomically removes `remove` and installs `add`.
    fn update_session_rules(
        &self,
        add: Vec<RewriteRule>,
        remove: Vec<RuleId>,
    ) -> BoxFuture<'_, Result<(), RuleEngineError>>;

    /// Every rule currently installed.
    fn installed_rules(&self) -> BoxFuture<'_, Result<Vec<RewriteRule>, RuleEngineError>>;
}

/// In-memory rule engine with a global cap.
#[derive(Debug)]
pub struct InMemoryRuleEngine {
    cap: usize,
    rules: Mutex<BTreeMap<RuleId, RewriteRule>>,
}

impl Default for InMemoryRuleEngine {
    fn default() -> Self {
        Self::with_capacity(MAX_INSTALLED_RULES)
    }
}

impl InMemoryRuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            cap,
            rules: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.rules.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Installed rules scoped to `tab_id`, in id order.
    pub fn rules_for_tab(&self, tab_id: TabId) -> Vec<RewriteRule> {
        self.rules
            .lock()
            .map(|rules| rules.values().filter(|r| r.targets_tab(tab_id)).cloned().collect())
            .unwrap_or_default()
    }

    fn apply(&self, add: Vec<RewriteRule>, remove: Vec<RuleId>) -> Result<(), RuleEngineError> {
        let mut rules = self
            .rules
            .lock()
            .map_err(|_| RuleEngineError::Host("rule table poisoned".into()))?;

        let removing: HashSet<RuleId> = remove.into_iter().collect();
        let mut seen = HashSet::new();

        for rule in &add {
            validate(rule)?;
            let clashes = rules.contains_key(&rule.id) && !removing.contains(&rule.id);
            if clashes || !seen.insert(rule.id) {
                return Err(RuleEngineError::DuplicateRuleId(rule.id));
            }
        }

        let remaining = rules.keys().filter(|id| !removing.contains(id)).count();
        let requested = remaining + add.len();
        if requested > self.cap {
            return Err(RuleEngineError::CapExceeded { cap: self.cap, requested });
        }

        rules.retain(|id, _| !removing.contains(id));
        for rule in add {
            rules.insert(rule.id, rule);
        }

        Ok(())
    }
}

fn validate(rule: &RewriteRule) -> Result<(), RuleEngineError> {
    let invalid = |reason: &str| RuleEngineError::InvalidRule { id: rule.id, reason: reason.to_string() };

    if rule.id.as_u32() == 0 {
        return Err(invalid("rule ids start at 1"));
    }
    if rule.priority == 0 {
        return Err(invalid("priority must be at least 1"));
    }
    if rule.condition.resource_types.is_empty() {
        return Err(invalid("no resource types"));
    }
    if rule.action.request_headers.is_empty() && rule.action.response_headers.is_empty() {
        return Err(invalid("no header operations"));
    }
    Ok(())
}

impl RuleEngine for InMemoryRuleEngine {
    fn update_session_rules(
        &self,
        add: Vec<RewriteRule>,
        remove: Vec<RuleId>,
    ) -> BoxFuture<'_, Result<(), RuleEngineError>> {
        Box::pin(future::ready(self.apply(add, remove)))
    }

    fn installed_rules(&self) -> BoxFuture<'_, Result<Vec<RewriteRule>, RuleEngineError>> {
        let rules = self
            .rules
            .lock()
            .map(|r| r.values().cloned().collect())
            .map_err(|_| RuleEngineError::Host("rule table poisoned".into()));
        Box::pin(future::ready(rules))
    }
}
