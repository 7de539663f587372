//! Result collection and merging.
//!
//! Collects per-subtask results from the task document (falling back to
//! response messages on disk) and merges them under one of four strategies.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::message::MessageKind;
use crate::domain::ports::TaskStore;
use crate::services::messenger::Messenger;

/// Merge strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    Concatenate,
    Intelligent,
    Voting,
    Weighted,
}

impl MergeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Concatenate => "concatenate",
            Self::Intelligent => "intelligent",
            Self::Voting => "voting",
            Self::Weighted => "weighted",
        }
    }
}

/// One collected subtask result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectedResult {
    pub subtask_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

pub struct ResultAggregator {
    tasks: Arc<dyn TaskStore>,
    messenger: Arc<Messenger>,
}

impl ResultAggregator {
    pub fn new(tasks: Arc<dyn TaskStore>, messenger: Arc<Messenger>) -> Self {
        Self { tasks, messenger }
    }

    /// Collect results for a task. When the task document is missing and
    /// intermediates are requested, falls back to scanning the task's
    /// message thread for response messages.
    pub async fn collect(
        &self,
        task_id: &str,
        include_intermediate: bool,
    ) -> DomainResult<Vec<CollectedResult>> {
        if let Some(task) = self.tasks.load(task_id).await? {
            return Ok(task
                .plan
                .subtasks
                .iter()
                .filter(|st| include_intermediate || st.result.is_some())
                .map(|st| CollectedResult {
                    subtask_id: st.subtask_id.clone(),
                    agent_id: st.assigned_agent.clone(),
                    status: Some(st.status.as_str().to_string()),
                    result: st.result.clone(),
                    error: st.error.clone(),
                    started_at: st.started_at,
                    completed_at: st.completed_at,
                })
                .collect());
        }

        if !include_intermediate {
            return Ok(Vec::new());
        }

        // fallback: response messages carry their subtask_id in the payload
        let mut collected = Vec::new();
        for message in self.messenger.thread(task_id).await? {
            if message.kind != MessageKind::Response {
                continue;
            }
            let Some(subtask_id) = message
                .payload
                .get("subtask_id")
                .and_then(serde_json::Value::as_str)
            else {
                continue;
            };
            collected.push(CollectedResult {
                subtask_id: subtask_id.to_string(),
                agent_id: Some(message.from_agent.clone()),
                status: None,
                result: Some(serde_json::Value::Object(message.payload.clone())),
                error: None,
                started_at: None,
                completed_at: Some(message.created_at),
            });
        }
        Ok(collected)
    }

    /// Collect and merge under the given strategy.
    pub async fn get_result(
        &self,
        task_id: &str,
        strategy: MergeStrategy,
        weights: Option<&BTreeMap<String, f64>>,
        include_intermediate: bool,
    ) -> DomainResult<serde_json::Value> {
        let results = self.collect(task_id, include_intermediate).await?;
        if results.is_empty() {
            return Err(DomainError::TaskNotFound(format!("No results found for {task_id}")));
        }
        Ok(merge_results(&results, strategy, weights))
    }
}

/// Merge collected results.
pub fn merge_results(
    results: &[CollectedResult],
    strategy: MergeStrategy,
    weights: Option<&BTreeMap<String, f64>>,
) -> serde_json::Value {
    match strategy {
        MergeStrategy::Concatenate => concatenate(results),
        MergeStrategy::Intelligent => intelligent(results),
        MergeStrategy::Voting => voting(results),
        MergeStrategy::Weighted => weighted(results, weights),
    }
}

fn concatenate(results: &[CollectedResult]) -> serde_json::Value {
    let mut ordered: Vec<&CollectedResult> = results.iter().collect();
    ordered.sort_by_key(|r| r.completed_at);

    let mut subtasks = Vec::new();
    let mut content = serde_json::Map::new();
    for r in ordered {
        subtasks.push(serde_json::json!({
            "subtask_id": r.subtask_id,
            "agent_id": r.agent_id,
            "content": r.result,
            "status": r.status,
        }));
        if let Some(result) = &r.result {
            content.insert(r.subtask_id.clone(), result.clone());
        }
    }
    serde_json::json!({
        "strategy": "concatenate",
        "subtasks": subtasks,
        "content": content,
    })
}

fn intelligent(results: &[CollectedResult]) -> serde_json::Value {
    let mut code = serde_json::Map::new();
    let mut documentation = Vec::new();
    let mut data = serde_json::Map::new();
    let mut subtasks = Vec::new();

    for r in results {
        let content = r.result.clone().unwrap_or(serde_json::Value::Null);
        let kind = match content.as_object() {
            Some(obj) if obj.contains_key("code") || obj.contains_key("files") => "code",
            Some(obj) if obj.contains_key("documentation") || obj.contains_key("report") => {
                "documentation"
            }
            _ => "data",
        };
        match kind {
            "code" => {
                code.insert(r.subtask_id.clone(), content.clone());
            }
            "documentation" => documentation.push(content.clone()),
            _ => {
                data.insert(r.subtask_id.clone(), content.clone());
            }
        }
        subtasks.push(serde_json::json!({
            "subtask_id": r.subtask_id,
            "type": kind,
            "content": content,
        }));
    }

    serde_json::json!({
        "strategy": "intelligent",
        "code": code,
        "documentation": documentation,
        "data": data,
        "subtasks": subtasks,
    })
}

fn voting(results: &[CollectedResult]) -> serde_json::Value {
    // group by the stringified content
    let mut groups: BTreeMap<String, Vec<&CollectedResult>> = BTreeMap::new();
    for r in results {
        let key = r
            .result
            .as_ref()
            .map_or_else(|| "null".to_string(), std::string::ToString::to_string);
        groups.entry(key).or_default().push(r);
    }

    let winner = groups.values().max_by_key(|group| group.len());
    match winner {
        Some(group) => serde_json::json!({
            "strategy": "voting",
            "selected": group[0].result,
            "votes": group.len(),
            "alternatives": groups.len() - 1,
        }),
        None => serde_json::json!({"strategy": "voting", "selected": null, "votes": 0}),
    }
}

fn weighted(
    results: &[CollectedResult],
    weights: Option<&BTreeMap<String, f64>>,
) -> serde_json::Value {
    let weight_of = |subtask_id: &str| -> f64 {
        weights.and_then(|w| w.get(subtask_id)).copied().unwrap_or(1.0)
    };
    let total: f64 = results.iter().map(|r| weight_of(&r.subtask_id)).sum();
    if total <= 0.0 {
        return serde_json::json!({"strategy": "weighted", "error": "Total weight is zero"});
    }

    let mut content = serde_json::Map::new();
    for r in results {
        let weight = weight_of(&r.subtask_id) / total;
        match r.result.as_ref().and_then(serde_json::Value::as_object) {
            Some(obj) => {
                for (key, value) in obj {
                    if let Some(num) = value.as_f64() {
                        let acc = content
                            .get(key)
                            .and_then(serde_json::Value::as_f64)
                            .unwrap_or(0.0);
                        content.insert(key.clone(), serde_json::json!(acc + num * weight));
                    } else {
                        // non-numeric values come from the last subtask seen
                        content.insert(key.clone(), value.clone());
                    }
                }
            }
            None => {
                if let Some(result) = &r.result {
                    content.insert(r.subtask_id.clone(), result.clone());
                }
            }
        }
    }

    serde_json::json!({"strategy": "weighted", "content": content})
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn result(subtask_id: &str, value: serde_json::Value, completed_secs: i64) -> CollectedResult {
        CollectedResult {
            subtask_id: subtask_id.to_string(),
            agent_id: Some("agent".to_string()),
            status: Some("completed".to_string()),
            result: Some(value),
            error: None,
            started_at: None,
            completed_at: Some(Utc.timestamp_opt(completed_secs, 0).unwrap()),
        }
    }

    #[test]
    fn test_concatenate_orders_by_completion() {
        let results = vec![
            result("st2", serde_json::json!({"v": 2}), 200),
            result("st1", serde_json::json!({"v": 1}), 100),
        ];
        let merged = merge_results(&results, MergeStrategy::Concatenate, None);
        assert_eq!(merged["strategy"], "concatenate");
        assert_eq!(merged["subtasks"][0]["subtask_id"], "st1");
        assert_eq!(merged["subtasks"][1]["subtask_id"], "st2");
        assert_eq!(merged["content"]["st1"]["v"], 1);
    }

    #[test]
    fn test_intelligent_partitions_by_kind() {
        let results = vec![
            result("code1", serde_json::json!({"code": "fn main() {}"}), 1),
            result("doc1", serde_json::json!({"report": "all good"}), 2),
            result("data1", serde_json::json!({"metric": 5}), 3),
        ];
        let merged = merge_results(&results, MergeStrategy::Intelligent, None);
        assert!(merged["code"].as_object().unwrap().contains_key("code1"));
        assert_eq!(merged["documentation"].as_array().unwrap().len(), 1);
        assert!(merged["data"].as_object().unwrap().contains_key("data1"));
        assert_eq!(merged["subtasks"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_voting_picks_majority() {
        let results = vec![
            result("a", serde_json::json!({"answer": 42}), 1),
            result("b", serde_json::json!({"answer": 42}), 2),
            result("c", serde_json::json!({"answer": 7}), 3),
        ];
        let merged = merge_results(&results, MergeStrategy::Voting, None);
        assert_eq!(merged["selected"]["answer"], 42);
        assert_eq!(merged["votes"], 2);
        assert_eq!(merged["alternatives"], 1);
    }

    #[test]
    fn test_weighted_numeric_merge() {
        let results = vec![
            result("a", serde_json::json!({"score": 10.0}), 1),
            result("b", serde_json::json!({"score": 20.0}), 2),
        ];
        let mut weights = BTreeMap::new();
        weights.insert("a".to_string(), 3.0);
        weights.insert("b".to_string(), 1.0);
        let merged = merge_results(&results, MergeStrategy::Weighted, Some(&weights));
        // 10*(3/4) + 20*(1/4) = 12.5
        let score = merged["content"]["score"].as_f64().unwrap();
        assert!((score - 12.5).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_default_weight_one() {
        let results = vec![
            result("a", serde_json::json!({"score": 10.0, "label": "x"}), 1),
            result("b", serde_json::json!({"score": 30.0, "label": "y"}), 2),
        ];
        let merged = merge_results(&results, MergeStrategy::Weighted, None);
        let score = merged["content"]["score"].as_f64().unwrap();
        assert!((score - 20.0).abs() < 1e-9);
        // non-numeric taken from the last subtask
        assert_eq!(merged["content"]["label"], "y");
    }
}
