use serde::{Deserialize, Serialize};
use std::fmt::Display;

use crate::tab::TabId;

/// Identifier of a rule in the host's single, global rule namespace.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(u32);

impl RuleId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Request types a rule condition can cover.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    MainFrame,
    SubFrame,
    Stylesheet,
    Script,
    Image,
    Font,
    Object,
    Xmlhttprequest,
    Ping,
    CspReport,
    Media,
    Websocket,
    Other,
}

impl ResourceType {
    pub const ALL: [ResourceType; 13] = [
        ResourceType::MainFrame,
        ResourceType::SubFrame,
        ResourceType::Stylesheet,
        ResourceType::Script,
        ResourceType::Image,
        ResourceType::Font,
        ResourceType::Object,
        ResourceType::Xmlhttprequest,
        ResourceType::Ping,
        ResourceType::CspReport,
        ResourceType::Media,
        ResourceType::Websocket,
        ResourceType::Other,
    ];
}

/// A single header modification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum HeaderOperation {
    Remove { header: String },
    Set { header: String, value: String },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionType {
    ModifyHeaders,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleAction {
    #[serde(rename = "type")]
    pub kind: ActionType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub request_headers: Vec<HeaderOperation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_headers: Vec<HeaderOperation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    pub tab_ids: Vec<TabId>,
    pub resource_types: Vec<ResourceType>,
}

/// A declarative, host-enforced header rewrite instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteRule {
    pub id: RuleId,
    pub priority: u32,
    pub condition: RuleCondition,
    pub action: RuleAction,
}

impl RewriteRule {
    /// Whether this rule is scoped to `tab_id`.
    pub fn targets_tab(&self, tab_id: TabId) -> bool {
        self.condition.tab_ids.contains(&tab_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rule_serializes_like_a_modify_headers_rule() {
        let rule = RewriteRule {
            id: RuleId::new(101),
            priority: 1,
            condition: RuleCondition {
                tab_ids: vec![TabId::new(4)],
                resource_types: vec![ResourceType::MainFrame, ResourceType::Xmlhttprequest],
            },
            action: RuleAction {
                kind: ActionType::ModifyHeaders,
                request_headers: vec![
                    HeaderOperation::Remove { header: "cookie".into() },
                    HeaderOperation::Set { header: "cookie".into(), value: "a=1".into() },
                ],
                response_headers: vec![],
            },
        };

        assert_eq!(
            serde_json::to_value(&rule).unwrap(),
            json!({
                "id": 101,
                "priority": 1,
                "condition": { "tabIds": [4], "resourceTypes": ["main_frame", "xmlhttprequest"] },
                "action": {
                    "type": "modifyHeaders",
                    "requestHeaders": [
                        { "operation": "remove", "header": "cookie" },
                        { "operation": "set", "header": "cookie", "value": "a=1" }
                    ]
                }
            })
        );
    }
}
