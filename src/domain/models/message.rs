//! Agent-to-agent (ATA) messages.
//!
//! Every persisted message carries a `sha256` over its own canonical form:
//! key-sorted JSON of the whole record minus the `sha256` and `msg_id`
//! fields. Recomputing the hash from a stored message must reproduce it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::models::task::Priority;

/// Delivery status of an ATA message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Delivered,
    Read,
    Acked,
    Archived,
}

impl Default for MessageStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Acked => "acked",
            Self::Archived => "archived",
        }
    }
}

/// Kind of ATA message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Request,
    Ack,
    Response,
    Bootstrap,
}

impl Default for MessageKind {
    fn default() -> Self {
        Self::Request
    }
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Ack => "ack",
            Self::Response => "response",
            Self::Bootstrap => "bootstrap",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "request" => Some(Self::Request),
            "ack" => Some(Self::Ack),
            "response" => Some(Self::Response),
            "bootstrap" => Some(Self::Bootstrap),
            _ => None,
        }
    }
}

/// A persisted agent-to-agent message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtaMessage {
    pub msg_id: String,
    pub taskcode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub from_agent: String,
    pub to_agent: String,
    pub created_at: DateTime<Utc>,
    pub kind: MessageKind,
    pub payload: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_sha256: Option<String>,
    pub priority: Priority,
    pub requires_response: bool,
    pub status: MessageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,
    /// Conversation-context block attached on send.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl AtaMessage {
    /// Generate a message id: `ATA-MSG-{yyyymmddHHMMSS}-{8-hex}`.
    ///
    /// The suffix is a content-derived hash of the taskcode, keeping ids
    /// stable in shape while unique per second per taskcode.
    pub fn generate_msg_id(taskcode: &str, now: DateTime<Utc>) -> String {
        let digest = Sha256::digest(taskcode.as_bytes());
        format!(
            "ATA-MSG-{}-{}",
            now.format("%Y%m%d%H%M%S"),
            &hex::encode(digest)[..8]
        )
    }

    /// The message body text, taken from `payload.message` or `payload.text`.
    pub fn body_text(&self) -> Option<&str> {
        payload_text(&self.payload)
    }

    /// Compute the canonical sha256 of this message.
    pub fn compute_sha256(&self) -> String {
        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if let serde_json::Value::Object(ref mut map) = value {
            map.remove("sha256");
            map.remove("msg_id");
        }
        hash_canonical(&value)
    }

    /// Stamp `sha256` from the current contents.
    pub fn seal(&mut self) {
        self.sha256 = None;
        self.sha256 = Some(self.compute_sha256());
    }

    /// Verify a stored hash against the message contents.
    pub fn verify_sha256(&self) -> bool {
        match &self.sha256 {
            Some(stored) => *stored == self.compute_sha256(),
            None => false,
        }
    }

    /// Build a reply linked to this message via `prev_sha256`/`in_reply_to`.
    pub fn reply(
        &self,
        from_agent: impl Into<String>,
        payload: serde_json::Map<String, serde_json::Value>,
        kind: MessageKind,
    ) -> AtaMessage {
        let now = Utc::now();
        let mut msg = AtaMessage {
            msg_id: Self::generate_msg_id(&self.taskcode, now),
            taskcode: self.taskcode.clone(),
            task_id: self.task_id.clone(),
            from_agent: from_agent.into(),
            to_agent: self.from_agent.clone(),
            created_at: now,
            kind,
            payload,
            prev_sha256: self.sha256.clone(),
            priority: self.priority,
            requires_response: false,
            status: MessageStatus::Pending,
            context_hint: None,
            in_reply_to: Some(self.msg_id.clone()),
            context: None,
            read_at: None,
            sha256: None,
        };
        msg.seal();
        msg
    }
}

/// Extract the body text from a payload map.
pub fn payload_text(payload: &serde_json::Map<String, serde_json::Value>) -> Option<&str> {
    payload
        .get("message")
        .and_then(serde_json::Value::as_str)
        .or_else(|| payload.get("text").and_then(serde_json::Value::as_str))
}

/// Auto-detect a priority from payload text when the caller set none.
pub fn detect_priority(payload: &serde_json::Map<String, serde_json::Value>) -> Priority {
    let text = serde_json::Value::Object(payload.clone()).to_string().to_lowercase();
    if ["urgent", "asap", "immediately", "紧急"].iter().any(|w| text.contains(w)) {
        Priority::Urgent
    } else if ["important", "priority", "重要"].iter().any(|w| text.contains(w)) {
        Priority::High
    } else {
        Priority::Normal
    }
}

/// Sha256 of the canonical (key-sorted, compact) JSON rendering of a value.
pub fn hash_canonical(value: &serde_json::Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    hex::encode(Sha256::digest(out.as_bytes()))
}

fn write_canonical(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_message() -> AtaMessage {
        let mut payload = serde_json::Map::new();
        payload.insert("message".to_string(), serde_json::json!("@Tester#07 run the suite"));
        let now = Utc::now();
        AtaMessage {
            msg_id: AtaMessage::generate_msg_id("QA-TEST__20260101", now),
            taskcode: "QA-TEST__20260101".to_string(),
            task_id: None,
            from_agent: "GPT-Main".to_string(),
            to_agent: "Tester".to_string(),
            created_at: now,
            kind: MessageKind::Request,
            payload,
            prev_sha256: None,
            priority: Priority::Normal,
            requires_response: true,
            status: MessageStatus::Pending,
            context_hint: None,
            in_reply_to: None,
            context: None,
            read_at: None,
            sha256: None,
        }
    }

    #[test]
    fn test_sha256_reproducible() {
        let mut msg = sample_message();
        msg.seal();
        assert!(msg.verify_sha256());

        // Round-trip through JSON and recompute
        let json = serde_json::to_string(&msg).unwrap();
        let restored: AtaMessage = serde_json::from_str(&json).unwrap();
        assert!(restored.verify_sha256());
    }

    #[test]
    fn test_sha256_excludes_msg_id() {
        let mut a = sample_message();
        a.seal();
        let mut b = a.clone();
        b.msg_id = "ATA-MSG-20990101000000-deadbeef".to_string();
        assert_eq!(a.sha256, Some(b.compute_sha256()));
    }

    #[test]
    fn test_sha256_changes_with_content() {
        let mut msg = sample_message();
        msg.seal();
        let original = msg.sha256.clone();
        msg.payload.insert("extra".to_string(), serde_json::json!(1));
        assert_ne!(Some(msg.compute_sha256()), original);
    }

    #[test]
    fn test_canonical_hash_key_order_independent() {
        let a = serde_json::json!({"b": 2, "a": 1});
        let b = serde_json::json!({"a": 1, "b": 2});
        assert_eq!(hash_canonical(&a), hash_canonical(&b));
    }

    #[test]
    fn test_msg_id_shape() {
        let id = AtaMessage::generate_msg_id("CODE", Utc::now());
        assert!(id.starts_with("ATA-MSG-"));
        let suffix = id.rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn test_reply_links_chain() {
        let mut original = sample_message();
        original.seal();
        let mut payload = serde_json::Map::new();
        payload.insert("message".to_string(), serde_json::json!("@GPT-Main#02 done"));
        let reply = original.reply("Tester", payload, MessageKind::Response);
        assert_eq!(reply.prev_sha256, original.sha256);
        assert_eq!(reply.in_reply_to, Some(original.msg_id.clone()));
        assert_eq!(reply.to_agent, "GPT-Main");
        assert!(reply.verify_sha256());
    }

    #[test]
    fn test_priority_detection() {
        let mut payload = serde_json::Map::new();
        payload.insert("message".to_string(), serde_json::json!("please fix ASAP"));
        assert_eq!(detect_priority(&payload), Priority::Urgent);

        payload.insert("message".to_string(), serde_json::json!("this is important"));
        assert_eq!(detect_priority(&payload), Priority::High);

        payload.insert("message".to_string(), serde_json::json!("routine check"));
        assert_eq!(detect_priority(&payload), Priority::Normal);
    }
}
