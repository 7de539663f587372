//! Agent coordinator: registry, applications, load balancing, scoring.
//!
//! The registry is a single JSON document; all mutations run under one
//! lock and rewrite the file, so writers are serialized and readers take
//! snapshots.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::RwLock;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::agent::{AgentCategory, AgentRecord, AgentStatus};

const MAX_AGENTS: u8 = 100;
const DEFAULT_HEARTBEAT_TIMEOUT_SECS: i64 = 300;

/// A pending registration application awaiting admin approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentApplication {
    pub agent_id: String,
    pub agent_type: String,
    pub role: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub max_concurrent_tasks: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_numeric_code: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_send_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_category: Option<AgentCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub status: String,
    pub submitted_at: DateTime<Utc>,
    pub submitted_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryDoc {
    #[serde(default)]
    agents: BTreeMap<String, AgentRecord>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ApplicationsDoc {
    #[serde(default)]
    applications: BTreeMap<String, AgentApplication>,
}

/// Parameters for registering an agent.
#[derive(Debug, Clone)]
pub struct RegisterAgent {
    pub agent_id: String,
    pub agent_type: String,
    pub role: String,
    pub capabilities: Vec<String>,
    pub max_concurrent_tasks: u32,
    pub numeric_code: Option<u8>,
    pub send_enabled: Option<bool>,
    pub category: Option<AgentCategory>,
}

impl RegisterAgent {
    pub fn new(agent_id: impl Into<String>, agent_type: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_type: agent_type.into(),
            role: role.into(),
            capabilities: Vec::new(),
            max_concurrent_tasks: 5,
            numeric_code: None,
            send_enabled: None,
            category: None,
        }
    }

    pub fn with_capabilities(mut self, caps: Vec<String>) -> Self {
        self.capabilities = caps;
        self
    }

    pub fn with_numeric_code(mut self, code: u8) -> Self {
        self.numeric_code = Some(code);
        self
    }

    pub fn with_send_enabled(mut self, enabled: bool) -> Self {
        self.send_enabled = Some(enabled);
        self
    }
}

pub struct AgentCoordinator {
    registry_file: PathBuf,
    applications_file: PathBuf,
    registry: RwLock<RegistryDoc>,
    applications: RwLock<ApplicationsDoc>,
    heartbeat_timeout: Duration,
}

impl AgentCoordinator {
    pub async fn open(registry_file: impl Into<PathBuf>, applications_file: impl Into<PathBuf>) -> DomainResult<Self> {
        let registry_file = registry_file.into();
        let applications_file = applications_file.into();
        let registry = load_doc::<RegistryDoc>(&registry_file).await?;
        let applications = load_doc::<ApplicationsDoc>(&applications_file).await?;
        Ok(Self {
            registry_file,
            applications_file,
            registry: RwLock::new(registry),
            applications: RwLock::new(applications),
            heartbeat_timeout: Duration::seconds(DEFAULT_HEARTBEAT_TIMEOUT_SECS),
        })
    }

    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    async fn persist_registry(&self, doc: &RegistryDoc) -> DomainResult<()> {
        save_doc(&self.registry_file, doc).await
    }

    async fn persist_applications(&self, doc: &ApplicationsDoc) -> DomainResult<()> {
        save_doc(&self.applications_file, doc).await
    }

    /// Register or update an agent. Numeric codes are validated fail-closed:
    /// a requested code must be in range and unused; absent a request, the
    /// smallest free code is allocated.
    pub async fn register_agent(&self, params: RegisterAgent) -> DomainResult<AgentRecord> {
        let now = Utc::now();
        let mut doc = self.registry.write().await;

        if let Some(code) = params.numeric_code {
            if !(1..=MAX_AGENTS).contains(&code) {
                return Err(DomainError::ValidationFailed(format!(
                    "numeric_code out of range: {code} (must be 1-{MAX_AGENTS})"
                )));
            }
            let used_by_other = doc
                .agents
                .values()
                .any(|a| a.numeric_code == Some(code) && a.agent_id != params.agent_id);
            if used_by_other {
                return Err(DomainError::ValidationFailed(format!(
                    "numeric_code already in use: {code}"
                )));
            }
        }

        let send_enabled = params.send_enabled.unwrap_or_else(|| {
            AgentRecord::default_send_enabled(&params.agent_id, &params.agent_type)
        });

        let record = if let Some(existing) = doc.agents.get_mut(&params.agent_id) {
            existing.agent_type = params.agent_type;
            existing.role = params.role;
            existing.capabilities = params.capabilities;
            existing.max_concurrent_tasks = params.max_concurrent_tasks;
            existing.last_heartbeat = now;
            existing.status = AgentStatus::Available;
            existing.send_enabled = send_enabled;
            if let Some(code) = params.numeric_code {
                existing.numeric_code = Some(code);
            }
            existing.category = params
                .category
                .unwrap_or_else(|| AgentCategory::default_for_code(existing.numeric_code));
            existing.clone()
        } else {
            let numeric_code = match params.numeric_code {
                Some(code) => code,
                None => allocate_numeric_code(&doc.agents).ok_or_else(|| {
                    DomainError::ValidationFailed(format!(
                        "agent limit reached ({MAX_AGENTS}); no numeric_code available"
                    ))
                })?,
            };
            let category = params
                .category
                .unwrap_or_else(|| AgentCategory::default_for_code(Some(numeric_code)));
            let record = AgentRecord {
                agent_id: params.agent_id.clone(),
                agent_type: params.agent_type,
                role: params.role,
                capabilities: params.capabilities,
                numeric_code: Some(numeric_code),
                send_enabled,
                category,
                current_load: 0,
                max_concurrent_tasks: params.max_concurrent_tasks,
                status: AgentStatus::Available,
                registered_at: now,
                last_heartbeat: now,
                response_time_avg: 0.0,
                success_rate: 1.0,
                total_tasks: 0,
                completed_tasks: 0,
            };
            doc.agents.insert(params.agent_id.clone(), record.clone());
            record
        };

        self.persist_registry(&doc).await?;
        Ok(record)
    }

    pub async fn unregister_agent(&self, agent_id: &str) -> DomainResult<()> {
        let mut doc = self.registry.write().await;
        if doc.agents.remove(agent_id).is_none() {
            return Err(DomainError::AgentNotFound(agent_id.to_string()));
        }
        self.persist_registry(&doc).await
    }

    pub async fn get_agent(&self, agent_id: &str) -> Option<AgentRecord> {
        self.registry.read().await.agents.get(agent_id).cloned()
    }

    pub async fn get_agent_by_code(&self, numeric_code: u8) -> Option<AgentRecord> {
        self.registry
            .read()
            .await
            .agents
            .values()
            .find(|a| a.numeric_code == Some(numeric_code))
            .cloned()
    }

    pub async fn all_agents(&self) -> Vec<AgentRecord> {
        self.registry.read().await.agents.values().cloned().collect()
    }

    /// Update status/load and refresh the heartbeat. Load implies status:
    /// at capacity means busy, zero load means available.
    pub async fn update_agent_status(
        &self,
        agent_id: &str,
        status: AgentStatus,
        current_load: Option<u32>,
    ) -> DomainResult<AgentRecord> {
        let mut doc = self.registry.write().await;
        let agent = doc
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| DomainError::AgentNotFound(agent_id.to_string()))?;
        agent.status = status;
        agent.last_heartbeat = Utc::now();
        if let Some(load) = current_load {
            agent.current_load = load;
            if load >= agent.max_concurrent_tasks {
                agent.status = AgentStatus::Busy;
            } else if load == 0 {
                agent.status = AgentStatus::Available;
            }
        }
        let updated = agent.clone();
        self.persist_registry(&doc).await?;
        Ok(updated)
    }

    pub async fn heartbeat(&self, agent_id: &str, current_load: Option<u32>) -> DomainResult<AgentRecord> {
        self.update_agent_status(agent_id, AgentStatus::Available, current_load).await
    }

    /// Filter agents by role and required capabilities. With
    /// `available_only`, excludes non-available/non-busy and fully loaded
    /// agents.
    pub async fn find_agents(
        &self,
        role: Option<&str>,
        capabilities: Option<&[String]>,
        available_only: bool,
    ) -> Vec<AgentRecord> {
        let doc = self.registry.read().await;
        doc.agents
            .values()
            .filter(|a| {
                if available_only {
                    if !matches!(a.status, AgentStatus::Available | AgentStatus::Busy) {
                        return false;
                    }
                    if !a.has_capacity() {
                        return false;
                    }
                }
                if let Some(role) = role {
                    if a.role != role {
                        return false;
                    }
                }
                if let Some(caps) = capabilities {
                    if !caps.iter().all(|c| a.capabilities.contains(c)) {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect()
    }

    /// Pick an agent for a role: least relative load by default, smart-router
    /// scoring otherwise.
    pub async fn find_agent_for_role(
        &self,
        role: &str,
        capabilities: Option<&[String]>,
        use_load_balancing: bool,
    ) -> Option<AgentRecord> {
        let agents = self.find_agents(Some(role), capabilities, true).await;
        if use_load_balancing {
            select_least_loaded(&agents).cloned()
        } else {
            select_by_score(&agents).cloned()
        }
    }

    /// Mark agents whose heartbeat is stale as unavailable. Returns their ids.
    pub async fn cleanup_stale_agents(&self) -> DomainResult<Vec<String>> {
        let now = Utc::now();
        let mut doc = self.registry.write().await;
        let mut stale = Vec::new();
        for agent in doc.agents.values_mut() {
            if now - agent.last_heartbeat > self.heartbeat_timeout
                && agent.status != AgentStatus::Unavailable
            {
                agent.status = AgentStatus::Unavailable;
                stale.push(agent.agent_id.clone());
            }
        }
        if !stale.is_empty() {
            self.persist_registry(&doc).await?;
        }
        Ok(stale)
    }

    // ---- application / approval flow ----

    /// Public: file (or refresh) a pending registration application.
    /// Already-registered agents are rejected; registration is admin-only.
    pub async fn agent_apply(
        &self,
        params: RegisterAgent,
        submitted_by: &str,
        note: Option<String>,
    ) -> DomainResult<AgentApplication> {
        if params.agent_id.trim().is_empty() {
            return Err(DomainError::ValidationFailed("agent_id is required".to_string()));
        }
        if self.get_agent(&params.agent_id).await.is_some() {
            return Err(DomainError::ValidationFailed(format!(
                "Agent already registered: {}",
                params.agent_id
            )));
        }

        let app = AgentApplication {
            agent_id: params.agent_id.clone(),
            agent_type: params.agent_type,
            role: params.role,
            capabilities: params.capabilities,
            max_concurrent_tasks: params.max_concurrent_tasks,
            requested_numeric_code: params.numeric_code,
            requested_send_enabled: params.send_enabled,
            requested_category: params.category,
            note,
            status: "pending".to_string(),
            submitted_at: Utc::now(),
            submitted_by: submitted_by.to_string(),
            approved_at: None,
            approved_by: None,
        };

        let mut doc = self.applications.write().await;
        doc.applications.insert(app.agent_id.clone(), app.clone());
        self.persist_applications(&doc).await?;
        Ok(app)
    }

    /// Admin-only (gated by the caller): approve a pending application and
    /// register the agent, with optional overrides.
    pub async fn agent_approve(
        &self,
        agent_id: &str,
        approved_by: &str,
        numeric_code: Option<u8>,
        send_enabled: Option<bool>,
    ) -> DomainResult<AgentRecord> {
        let app = {
            let doc = self.applications.read().await;
            doc.applications
                .get(agent_id)
                .cloned()
                .ok_or_else(|| DomainError::ValidationFailed(format!(
                    "No pending application for agent_id={agent_id}"
                )))?
        };
        if app.status != "pending" {
            return Err(DomainError::ValidationFailed(format!(
                "Application not pending: status={}",
                app.status
            )));
        }

        let final_numeric = numeric_code.or(app.requested_numeric_code);
        let final_send = send_enabled.or(app.requested_send_enabled);
        let final_category = app
            .requested_category
            .or_else(|| final_numeric.map(|c| AgentCategory::default_for_code(Some(c))));

        let result = self
            .register_agent(RegisterAgent {
                agent_id: app.agent_id.clone(),
                agent_type: app.agent_type.clone(),
                role: app.role.clone(),
                capabilities: app.capabilities.clone(),
                max_concurrent_tasks: app.max_concurrent_tasks,
                numeric_code: final_numeric,
                send_enabled: final_send,
                category: final_category,
            })
            .await;

        let mut doc = self.applications.write().await;
        if let Some(stored) = doc.applications.get_mut(agent_id) {
            stored.status = if result.is_ok() { "approved" } else { "failed" }.to_string();
            stored.approved_at = Some(Utc::now());
            stored.approved_by = Some(approved_by.to_string());
        }
        self.persist_applications(&doc).await?;

        result
    }

    pub async fn pending_applications(&self) -> Vec<AgentApplication> {
        self.applications
            .read()
            .await
            .applications
            .values()
            .filter(|a| a.status == "pending")
            .cloned()
            .collect()
    }
}

fn allocate_numeric_code(agents: &BTreeMap<String, AgentRecord>) -> Option<u8> {
    let used: Vec<u8> = agents.values().filter_map(|a| a.numeric_code).collect();
    (1..=MAX_AGENTS).find(|code| !used.contains(code))
}

/// Least relative load among agents that still have capacity.
pub fn select_least_loaded(agents: &[AgentRecord]) -> Option<&AgentRecord> {
    agents
        .iter()
        .filter(|a| a.has_capacity() && matches!(a.status, AgentStatus::Available | AgentStatus::Busy))
        .min_by(|a, b| {
            a.load_ratio()
                .partial_cmp(&b.load_ratio())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
}

/// Smart-router score: 100 − 30·load_ratio − response-time penalty
/// + 20·success_rate, ±status bonus, clamped at zero.
pub fn agent_score(agent: &AgentRecord) -> f64 {
    let mut score = 100.0;
    score -= agent.load_ratio() * 30.0;
    if agent.response_time_avg > 60.0 {
        score -= (agent.response_time_avg - 60.0) / 10.0;
    }
    score += agent.success_rate * 20.0;
    match agent.status {
        AgentStatus::Available => score += 10.0,
        AgentStatus::Busy => score -= 5.0,
        _ => {}
    }
    score.max(0.0)
}

/// Highest-scoring agent; ties go to the first in iteration order.
pub fn select_by_score(agents: &[AgentRecord]) -> Option<&AgentRecord> {
    agents
        .iter()
        .fold(None::<(&AgentRecord, f64)>, |best, agent| {
            let score = agent_score(agent);
            match best {
                Some((_, best_score)) if best_score >= score => best,
                _ => Some((agent, score)),
            }
        })
        .map(|(agent, _)| agent)
}

async fn load_doc<T: serde::de::DeserializeOwned + Default>(path: &PathBuf) -> DomainResult<T> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(serde_json::from_str(&content).unwrap_or_default()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

async fn save_doc<T: Serialize>(path: &PathBuf, doc: &T) -> DomainResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, serde_json::to_string_pretty(doc)?).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn coordinator(dir: &TempDir) -> AgentCoordinator {
        AgentCoordinator::open(
            dir.path().join("agent_registry.json"),
            dir.path().join("agent_applications.json"),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_register_allocates_smallest_code() {
        let dir = TempDir::new().unwrap();
        let coord = coordinator(&dir).await;

        let a = coord.register_agent(RegisterAgent::new("A", "GPT", "tester")).await.unwrap();
        let b = coord.register_agent(RegisterAgent::new("B", "GPT", "tester")).await.unwrap();
        assert_eq!(a.numeric_code, Some(1));
        assert_eq!(b.numeric_code, Some(2));

        // 1 is system_ai by default range
        assert_eq!(a.category, AgentCategory::SystemAi);
    }

    #[tokio::test]
    async fn test_register_rejects_duplicate_code() {
        let dir = TempDir::new().unwrap();
        let coord = coordinator(&dir).await;

        coord
            .register_agent(RegisterAgent::new("A", "GPT", "tester").with_numeric_code(7))
            .await
            .unwrap();
        let err = coord
            .register_agent(RegisterAgent::new("B", "GPT", "tester").with_numeric_code(7))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already in use"));

        let err = coord
            .register_agent(RegisterAgent::new("C", "GPT", "tester").with_numeric_code(101))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[tokio::test]
    async fn test_reregister_updates_record() {
        let dir = TempDir::new().unwrap();
        let coord = coordinator(&dir).await;

        coord.register_agent(RegisterAgent::new("A", "GPT", "tester")).await.unwrap();
        let updated = coord
            .register_agent(RegisterAgent::new("A", "TRAE", "reviewer").with_numeric_code(50))
            .await
            .unwrap();
        assert_eq!(updated.agent_type, "TRAE");
        assert_eq!(updated.role, "reviewer");
        assert_eq!(updated.numeric_code, Some(50));
        assert_eq!(updated.category, AgentCategory::UserAi);
    }

    #[tokio::test]
    async fn test_cursor_auto_send_disabled_by_default() {
        let dir = TempDir::new().unwrap();
        let coord = coordinator(&dir).await;
        let rec = coord
            .register_agent(RegisterAgent::new("Cursor-Auto", "Cursor", "observer"))
            .await
            .unwrap();
        assert!(!rec.send_enabled);
    }

    #[tokio::test]
    async fn test_load_drives_status() {
        let dir = TempDir::new().unwrap();
        let coord = coordinator(&dir).await;
        coord.register_agent(RegisterAgent::new("A", "GPT", "tester")).await.unwrap();

        let rec = coord.update_agent_status("A", AgentStatus::Available, Some(5)).await.unwrap();
        assert_eq!(rec.status, AgentStatus::Busy);

        let rec = coord.update_agent_status("A", AgentStatus::Busy, Some(0)).await.unwrap();
        assert_eq!(rec.status, AgentStatus::Available);
    }

    #[tokio::test]
    async fn test_find_agents_filters() {
        let dir = TempDir::new().unwrap();
        let coord = coordinator(&dir).await;
        coord
            .register_agent(
                RegisterAgent::new("A", "GPT", "tester")
                    .with_capabilities(vec!["pytest".to_string(), "lint".to_string()]),
            )
            .await
            .unwrap();
        coord.register_agent(RegisterAgent::new("B", "GPT", "reviewer")).await.unwrap();

        let found = coord.find_agents(Some("tester"), None, true).await;
        assert_eq!(found.len(), 1);

        let caps = vec!["pytest".to_string()];
        let found = coord.find_agents(None, Some(&caps), true).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].agent_id, "A");

        let caps = vec!["missing".to_string()];
        assert!(coord.find_agents(None, Some(&caps), true).await.is_empty());
    }

    #[tokio::test]
    async fn test_least_loaded_selection() {
        let dir = TempDir::new().unwrap();
        let coord = coordinator(&dir).await;
        coord.register_agent(RegisterAgent::new("A", "GPT", "tester")).await.unwrap();
        coord.register_agent(RegisterAgent::new("B", "GPT", "tester")).await.unwrap();
        coord.update_agent_status("A", AgentStatus::Available, Some(3)).await.unwrap();
        coord.update_agent_status("B", AgentStatus::Available, Some(1)).await.unwrap();

        let picked = coord.find_agent_for_role("tester", None, true).await.unwrap();
        assert_eq!(picked.agent_id, "B");
    }

    #[tokio::test]
    async fn test_smart_score() {
        let dir = TempDir::new().unwrap();
        let coord = coordinator(&dir).await;
        let rec = coord.register_agent(RegisterAgent::new("A", "GPT", "tester")).await.unwrap();
        // fresh agent: 100 - 0 + 20*1.0 + 10 = 130
        assert!((agent_score(&rec) - 130.0).abs() < 1e-9);

        let mut slow = rec;
        slow.response_time_avg = 160.0;
        slow.status = AgentStatus::Busy;
        slow.current_load = 5;
        // 100 - 30 - 10 + 20 - 5 = 75
        assert!((agent_score(&slow) - 75.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_stale_agent_gc() {
        let dir = TempDir::new().unwrap();
        let coord = coordinator(&dir).await.with_heartbeat_timeout(Duration::seconds(0));
        coord.register_agent(RegisterAgent::new("A", "GPT", "tester")).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let stale = coord.cleanup_stale_agents().await.unwrap();
        assert_eq!(stale, vec!["A".to_string()]);
        assert_eq!(coord.get_agent("A").await.unwrap().status, AgentStatus::Unavailable);
    }

    #[tokio::test]
    async fn test_apply_then_approve() {
        let dir = TempDir::new().unwrap();
        let coord = coordinator(&dir).await;

        coord
            .agent_apply(RegisterAgent::new("New", "GPT", "tester"), "New", None)
            .await
            .unwrap();
        assert_eq!(coord.pending_applications().await.len(), 1);
        assert!(coord.get_agent("New").await.is_none());

        let rec = coord.agent_approve("New", "admin", Some(42), Some(true)).await.unwrap();
        assert_eq!(rec.numeric_code, Some(42));
        assert!(rec.send_enabled);
        assert!(coord.pending_applications().await.is_empty());

        // re-approval fails: application no longer pending
        assert!(coord.agent_approve("New", "admin", None, None).await.is_err());
    }

    #[tokio::test]
    async fn test_apply_rejected_for_registered_agent() {
        let dir = TempDir::new().unwrap();
        let coord = coordinator(&dir).await;
        coord.register_agent(RegisterAgent::new("A", "GPT", "tester")).await.unwrap();
        assert!(coord
            .agent_apply(RegisterAgent::new("A", "GPT", "tester"), "A", None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_unregister_frees_code() {
        let dir = TempDir::new().unwrap();
        let coord = coordinator(&dir).await;
        coord.register_agent(RegisterAgent::new("A", "GPT", "tester")).await.unwrap();
        coord.unregister_agent("A").await.unwrap();
        assert!(coord.get_agent("A").await.is_none());
        assert!(coord.unregister_agent("A").await.is_err());

        // code 1 is available again
        let rec = coord.register_agent(RegisterAgent::new("B", "GPT", "tester")).await.unwrap();
        assert_eq!(rec.numeric_code, Some(1));
    }

    #[tokio::test]
    async fn test_registry_persists_across_open() {
        let dir = TempDir::new().unwrap();
        {
            let coord = coordinator(&dir).await;
            coord.register_agent(RegisterAgent::new("A", "GPT", "tester")).await.unwrap();
        }
        let coord = coordinator(&dir).await;
        assert!(coord.get_agent("A").await.is_some());
    }
}
