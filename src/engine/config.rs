//! Engine configuration.
//!
//! `EngineConfig` controls the rule budget and the shape of the rules the
//! engine installs, plus the capacities of its internal channels.
//!
//! `EngineConfig` provides defaults via [`Default`] and a fluent
//! [`EngineConfig::builder()`] for customization with validation.
//!
//! # Examples
//!
//! ## Use defaults
//! ```rust
//! use tabjar::EngineConfig;
//! let cfg = EngineConfig::default();
//! assert_eq!(cfg.max_installed_rules, 5000);
//! assert_eq!(cfg.rule_id_block_size, 100);
//! ```
//!
//! ## Customize with the builder
//! ```rust
//! use tabjar::EngineConfig;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = EngineConfig::builder()
//!     .max_installed_rules(200)
//!     .rule_priority(2)
//!     .build()?; // returns Result<EngineConfig, ConfigError>
//! # Ok(()) }
//! ```
//!
//! # Fields (summary)
//! - `max_installed_rules`: global cap of live rules in the host (default: 5000).
//! - `rule_id_block_size`: ids reserved per rule build (default: 100, at least 2).
//! - `rule_priority`: priority given to every rule (default: 1, at least 1).
//! - `resource_types`: request types covered by the rules (default: all).
//! - `channel_capacity`: engine command/event channel size (default: 128).
//! - `tab_channel_capacity`: per-tab worker queue size (default: 32).

use crate::engine::rules::{ResourceType, MAX_INSTALLED_RULES, RULES_PER_TAB};
use crate::engine::DEFAULT_CHANNEL_CAPACITY;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub max_installed_rules: usize,
    pub rule_id_block_size: u32,
    pub rule_priority: u32,
    pub resource_types: Vec<ResourceType>,
    pub channel_capacity: usize,
    pub tab_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_installed_rules: MAX_INSTALLED_RULES,
            rule_id_block_size: 100,
            rule_priority: 1,
            resource_types: ResourceType::ALL.to_vec(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            tab_channel_capacity: 32,
        }
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// How many tabs can be isolated at once within the rule budget.
    pub fn isolated_tab_budget(&self) -> usize {
        self.max_installed_rules / RULES_PER_TAB
    }
}

#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    inner: EngineConfig,
}

impl EngineConfigBuilder {
    #[inline]
    fn map(mut self, f: impl FnOnce(&mut EngineConfig)) -> Self {
        f(&mut self.inner);
        self
    }

    pub fn max_installed_rules(self, n: usize) -> Self { self.map(|c| c.max_installed_rules = n) }
    pub fn rule_id_block_size(self, n: u32) -> Self { self.map(|c| c.rule_id_block_size = n) }
    pub fn rule_priority(self, p: u32) -> Self { self.map(|c| c.rule_priority = p) }
    pub fn resource_types(self, types: Vec<ResourceType>) -> Self { self.map(|c| c.resource_types = types) }
    pub fn channel_capacity(self, n: usize) -> Self { self.map(|c| c.channel_capacity = n) }
    pub fn tab_channel_capacity(self, n: usize) -> Self { self.map(|c| c.tab_channel_capacity = n) }

    /// Apply multiple changes in one go.
    pub fn with(self, f: impl FnOnce(&mut EngineConfig)) -> Self { self.map(f) }

    /// Validate and build the final config.
    pub fn build(self) -> Result<EngineConfig, ConfigError> {
        validate(&self.inner)?;
        Ok(self.inner)
    }
}

// ---------- Validation ----------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("max_installed_rules ({0}) cannot hold the rules of a single tab")]
    RuleCapTooSmall(usize),
    #[error("rule_id_block_size ({0}) is smaller than the rules emitted per tab")]
    BlockTooSmall(u32),
    #[error("rule_priority must be at least 1")]
    ZeroPriority,
    #[error("resource_types cannot be empty")]
    NoResourceTypes,
    #[error("channel capacities must be at least 1")]
    ZeroCapacity,
}

fn validate(c: &EngineConfig) -> Result<(), ConfigError> {
    if c.max_installed_rules < RULES_PER_TAB {
        return Err(ConfigError::RuleCapTooSmall(c.max_installed_rules));
    }
    if (c.rule_id_block_size as usize) < RULES_PER_TAB {
        return Err(ConfigError::BlockTooSmall(c.rule_id_block_size));
    }
    if c.rule_priority == 0 {
        return Err(ConfigError::ZeroPriority);
    }
    if c.resource_types.is_empty() {
        return Err(ConfigError::NoResourceTypes);
    }
    if c.channel_capacity == 0 || c.tab_channel_capacity == 0 {
        return Err(ConfigError::ZeroCapacity);
    }
    Ok(())
}
