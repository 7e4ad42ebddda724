// src/engine/rules.rs
//! Rewrite rules: the types handed to the host rule engine, the rule-id
//! allocator and the per-tab [`RuleSynthesizer`].

mod allocator;
mod host;
mod synthesizer;
mod types;

pub use allocator::RuleIdAllocator;
pub use host::{InMemoryRuleEngine, RuleEngine, RuleEngineError, RuleEngineHandle};
pub use synthesizer::RuleSynthesizer;
pub use types::{ActionType, HeaderOperation, ResourceType, RewriteRule, RuleAction, RuleCondition, RuleId};

/// Hard ceiling of concurrently installed rules in the host.
pub const MAX_INSTALLED_RULES: usize = 5000;

/// Every isolated tab owns exactly this many rules.
pub const RULES_PER_TAB: usize = 2;
