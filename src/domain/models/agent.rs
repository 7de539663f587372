//! Agent registry records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Availability of a registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Available,
    Busy,
    Unavailable,
    Error,
}

impl Default for AgentStatus {
    fn default() -> Self {
        Self::Available
    }
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Busy => "busy",
            Self::Unavailable => "unavailable",
            Self::Error => "error",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "available" => Some(Self::Available),
            "busy" => Some(Self::Busy),
            "unavailable" => Some(Self::Unavailable),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Whether an agent is a user-facing AI or a system AI.
///
/// Numeric codes 1..=10 default to system AI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentCategory {
    UserAi,
    SystemAi,
}

impl AgentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserAi => "user_ai",
            Self::SystemAi => "system_ai",
        }
    }

    /// Default category for a numeric code.
    pub fn default_for_code(numeric_code: Option<u8>) -> Self {
        match numeric_code {
            Some(code) if (1..=10).contains(&code) => Self::SystemAi,
            _ => Self::UserAi,
        }
    }
}

/// Registered agent record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_id: String,
    pub agent_type: String,
    pub role: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Unique code in 1..=100 used in the `{agent_id}#{NN}` display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeric_code: Option<u8>,
    pub send_enabled: bool,
    pub category: AgentCategory,
    #[serde(default)]
    pub current_load: u32,
    pub max_concurrent_tasks: u32,
    pub status: AgentStatus,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    #[serde(default)]
    pub response_time_avg: f64,
    #[serde(default = "default_success_rate")]
    pub success_rate: f64,
    #[serde(default)]
    pub total_tasks: u64,
    #[serde(default)]
    pub completed_tasks: u64,
}

fn default_success_rate() -> f64 {
    1.0
}

impl AgentRecord {
    /// Display name used by the comm-prefix rule: `{agent_id}#{NN}`.
    pub fn display_name(&self) -> String {
        match self.numeric_code {
            Some(code) => format!("{}#{code:02}", self.agent_id),
            None => self.agent_id.clone(),
        }
    }

    /// Relative load in `[0, 1]`; fully loaded agents report 1.0.
    pub fn load_ratio(&self) -> f64 {
        if self.max_concurrent_tasks == 0 {
            return 1.0;
        }
        f64::from(self.current_load) / f64::from(self.max_concurrent_tasks)
    }

    pub fn has_capacity(&self) -> bool {
        self.current_load < self.max_concurrent_tasks
    }

    /// The hard send-policy default: `Cursor-Auto` is read-only.
    pub fn default_send_enabled(agent_id: &str, agent_type: &str) -> bool {
        !(agent_id == "Cursor-Auto" || agent_type == "Cursor-Auto")
    }
}
