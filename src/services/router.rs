//! Keyword-rule task router.
//!
//! Rules are evaluated in order; the first rule with any keyword hit wins.
//! With no hit, the task's own `owner_role` (or "implementer") is used.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::services::coordinator::AgentCoordinator;

/// A routing rule: keywords mapped to an owner role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRule {
    pub id: String,
    pub keywords: Vec<String>,
    pub owner_role: String,
}

/// Outcome of routing a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub owner_role: String,
    pub agent_id: Option<String>,
    pub rule_id: String,
    pub reasoning: String,
}

/// The fields of a task the router looks at.
#[derive(Debug, Clone, Default)]
pub struct RoutableTask {
    pub goal: String,
    pub capsule: String,
    pub how_to_repro: String,
    pub expected: String,
    pub metadata: String,
    pub owner_role: Option<String>,
}

pub fn default_rules() -> Vec<RoutingRule> {
    fn rule(id: &str, keywords: &[&str], owner_role: &str) -> RoutingRule {
        RoutingRule {
            id: id.to_string(),
            keywords: keywords.iter().map(|s| (*s).to_string()).collect(),
            owner_role: owner_role.to_string(),
        }
    }
    vec![
        rule("infra_ops", &["server", "ops", "monitor", "deploy", "infra", "mcp"], "infra_ops"),
        rule("data_engineer", &["data", "dataset", "pipeline", "etl", "ingest", "download"], "data_engineer"),
        rule("trading", &["strategy", "backtest", "freqtrade", "trading", "portfolio"], "trading"),
        rule("doc_writer", &["doc", "report", "documentation", "readme", "spec"], "doc_writer"),
        rule("infra_quality", &["ci", "gate", "guard", "verdict", "audit"], "infra_quality"),
    ]
}

pub struct TaskRouter {
    rules: Vec<RoutingRule>,
    coordinator: Arc<AgentCoordinator>,
}

impl TaskRouter {
    pub fn new(coordinator: Arc<AgentCoordinator>) -> Self {
        Self { rules: default_rules(), coordinator }
    }

    pub fn with_rules(mut self, rules: Vec<RoutingRule>) -> Self {
        self.rules = rules;
        self
    }

    pub async fn route(&self, task: &RoutableTask) -> RoutingDecision {
        let text = normalize_text(task);
        for rule in &self.rules {
            if rule.keywords.iter().any(|kw| text.contains(&kw.to_lowercase())) {
                return RoutingDecision {
                    owner_role: rule.owner_role.clone(),
                    agent_id: self.find_agent(&rule.owner_role).await,
                    rule_id: rule.id.clone(),
                    reasoning: format!("matched_keywords={:?}", rule.keywords),
                };
            }
        }

        let owner_role = task.owner_role.clone().unwrap_or_else(|| "implementer".to_string());
        RoutingDecision {
            agent_id: self.find_agent(&owner_role).await,
            owner_role,
            rule_id: "default".to_string(),
            reasoning: "no_rule_match".to_string(),
        }
    }

    async fn find_agent(&self, owner_role: &str) -> Option<String> {
        self.coordinator
            .find_agent_for_role(owner_role, None, true)
            .await
            .map(|a| a.agent_id)
    }
}

fn normalize_text(task: &RoutableTask) -> String {
    [
        task.goal.as_str(),
        task.capsule.as_str(),
        task.how_to_repro.as_str(),
        task.expected.as_str(),
        task.metadata.as_str(),
    ]
    .join(" ")
    .to_lowercase()
}
