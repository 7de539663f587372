//! Outbox with administrator review (proxy-send).
//!
//! Every outbound agent message enters here as a pending request. Only an
//! admin review can approve it; approval runs hard template validation and
//! then the real send. Direct sends bypassing the outbox are admin-only
//! and handled by the tool bus.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::message::{payload_text, MessageKind};
use crate::domain::models::outbox::{is_repo_relative_path, OutboxRequest, OutboxStatus, SendResult};
use crate::domain::models::task::Priority;
use crate::services::coordinator::AgentCoordinator;
use crate::services::messenger::{Messenger, SendMessage};

/// Review action taken by the admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewAction {
    Approve,
    Reject,
}

/// Outcome of a review call.
#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    pub request_id: String,
    pub status: OutboxStatus,
    pub send_result: Option<SendResult>,
    pub reason: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct OutboxDoc {
    #[serde(default)]
    requests: BTreeMap<String, OutboxRequest>,
}

pub struct OutboxService {
    outbox_file: PathBuf,
    doc: Mutex<OutboxDoc>,
    coordinator: Arc<AgentCoordinator>,
    messenger: Arc<Messenger>,
}

impl OutboxService {
    pub async fn open(
        outbox_file: impl Into<PathBuf>,
        coordinator: Arc<AgentCoordinator>,
        messenger: Arc<Messenger>,
    ) -> DomainResult<Self> {
        let outbox_file = outbox_file.into();
        let doc = match tokio::fs::read_to_string(&outbox_file).await {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => OutboxDoc::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { outbox_file, doc: Mutex::new(doc), coordinator, messenger })
    }

    async fn persist(&self, doc: &OutboxDoc) -> DomainResult<()> {
        if let Some(parent) = self.outbox_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.outbox_file, serde_json::to_string_pretty(doc)?).await?;
        Ok(())
    }

    /// Public entrypoint: enqueue a send request for admin review.
    ///
    /// Both agents must be registered and the sender send-enabled; a caller
    /// that cannot send cannot even request.
    #[allow(clippy::too_many_arguments)]
    pub async fn send_request(
        &self,
        taskcode: &str,
        from_agent: &str,
        to_agent: &str,
        kind: MessageKind,
        payload: serde_json::Map<String, serde_json::Value>,
        priority: Priority,
        requires_response: bool,
        context_hint: Option<String>,
        report_path: Option<String>,
        selftest_log_path: Option<String>,
        evidence_dir: Option<String>,
        submitted_by: &str,
    ) -> DomainResult<OutboxRequest> {
        let from = self
            .coordinator
            .get_agent(from_agent)
            .await
            .ok_or_else(|| DomainError::SenderNotRegistered(from_agent.to_string()))?;
        if self.coordinator.get_agent(to_agent).await.is_none() {
            return Err(DomainError::RecipientNotRegistered(to_agent.to_string()));
        }
        if !from.send_enabled {
            return Err(DomainError::SendDisabled(from_agent.to_string()));
        }

        let now = Utc::now();
        let request = OutboxRequest {
            request_id: OutboxRequest::generate_request_id(taskcode, from_agent, to_agent, now),
            status: OutboxStatus::Pending,
            submitted_at: now,
            submitted_by: submitted_by.to_string(),
            taskcode: taskcode.to_string(),
            from_agent: from_agent.to_string(),
            to_agent: to_agent.to_string(),
            kind: kind.as_str().to_string(),
            payload,
            priority,
            requires_response,
            context_hint,
            report_path,
            selftest_log_path,
            evidence_dir,
            reviewed_at: None,
            reviewed_by: None,
            reject_reason: None,
            approve_note: None,
            send_result: None,
            last_error: None,
        };

        let mut doc = self.doc.lock().await;
        doc.requests.insert(request.request_id.clone(), request.clone());
        self.persist(&doc).await?;
        Ok(request)
    }

    pub async fn get_request(&self, request_id: &str) -> Option<OutboxRequest> {
        self.doc.lock().await.requests.get(request_id).cloned()
    }

    pub async fn pending_requests(&self) -> Vec<OutboxRequest> {
        self.doc
            .lock()
            .await
            .requests
            .values()
            .filter(|r| r.status == OutboxStatus::Pending)
            .cloned()
            .collect()
    }

    /// Admin review. Rejection is terminal and idempotent in the sense that
    /// reviewing a non-pending request is an error naming its status.
    /// Approval runs template validation; a validation failure hard-rejects
    /// the request regardless of the admin's intent. A failing underlying
    /// send leaves the request pending with `last_error` set.
    pub async fn review(
        &self,
        request_id: &str,
        action: ReviewAction,
        reason: Option<String>,
        reviewed_by: &str,
    ) -> DomainResult<ReviewOutcome> {
        let request = {
            let doc = self.doc.lock().await;
            doc.requests
                .get(request_id)
                .cloned()
                .ok_or_else(|| DomainError::OutboxRequestNotFound(request_id.to_string()))?
        };
        if request.status != OutboxStatus::Pending {
            return Err(DomainError::OutboxRequestNotPending(
                request.status.as_str().to_string(),
            ));
        }

        if action == ReviewAction::Reject {
            let reject_reason = reason.unwrap_or_else(|| "Rejected by admin".to_string());
            self.finish_review(request_id, |req| {
                req.status = OutboxStatus::Rejected;
                req.reviewed_at = Some(Utc::now());
                req.reviewed_by = Some(reviewed_by.to_string());
                req.reject_reason = Some(reject_reason.clone());
            })
            .await?;
            return Ok(ReviewOutcome {
                request_id: request_id.to_string(),
                status: OutboxStatus::Rejected,
                send_result: None,
                reason: Some(reject_reason),
            });
        }

        // approve: hard template validation first
        if let Err(template_err) = self.validate_template(&request).await {
            let reject_reason = match &reason {
                Some(note) => format!("{template_err}; note={note}"),
                None => template_err.to_string(),
            };
            self.finish_review(request_id, |req| {
                req.status = OutboxStatus::Rejected;
                req.reviewed_at = Some(Utc::now());
                req.reviewed_by = Some(reviewed_by.to_string());
                req.reject_reason = Some(reject_reason.clone());
            })
            .await?;
            return Err(DomainError::TemplateInvalid(reject_reason));
        }

        let send = self
            .messenger
            .send(SendMessage {
                taskcode: request.taskcode.clone(),
                from_agent: request.from_agent.clone(),
                to_agent: request.to_agent.clone(),
                kind: MessageKind::from_str(&request.kind).unwrap_or(MessageKind::Request),
                payload: request.payload.clone(),
                prev_sha256: None,
                priority: Some(request.priority),
                requires_response: request.requires_response,
                context_hint: request.context_hint.clone(),
            })
            .await;

        match send {
            Ok(sent) => {
                let result = SendResult {
                    msg_id: sent.msg_id,
                    sha256: sent.sha256,
                    file_path: sent.file_path,
                };
                self.finish_review(request_id, |req| {
                    req.status = OutboxStatus::Approved;
                    req.reviewed_at = Some(Utc::now());
                    req.reviewed_by = Some(reviewed_by.to_string());
                    req.approve_note = reason.clone();
                    req.send_result = Some(result.clone());
                })
                .await?;
                Ok(ReviewOutcome {
                    request_id: request_id.to_string(),
                    status: OutboxStatus::Approved,
                    send_result: Some(result),
                    reason: None,
                })
            }
            Err(send_err) => {
                // fail-closed: stay pending, record the error for retry
                let err_text = send_err.to_string();
                self.finish_review(request_id, |req| {
                    req.last_error = Some(err_text.clone());
                })
                .await?;
                Err(send_err)
            }
        }
    }

    async fn finish_review<F: FnMut(&mut OutboxRequest)>(
        &self,
        request_id: &str,
        mut apply: F,
    ) -> DomainResult<()> {
        let mut doc = self.doc.lock().await;
        if let Some(req) = doc.requests.get_mut(request_id) {
            apply(req);
        }
        self.persist(&doc).await
    }

    /// Review-time hard validation, all fail-closed:
    /// evidence triplet present and repo-relative, recipient display name
    /// resolvable, body prefixed with `@{display}`.
    async fn validate_template(&self, request: &OutboxRequest) -> DomainResult<()> {
        if !is_repo_relative_path(request.report_path.as_deref()) {
            return Err(DomainError::TemplateInvalid(
                "TEMPLATE_INVALID: report_path is required and must be repo-relative".to_string(),
            ));
        }
        if !is_repo_relative_path(request.selftest_log_path.as_deref()) {
            return Err(DomainError::TemplateInvalid(
                "TEMPLATE_INVALID: selftest_log_path is required and must be repo-relative"
                    .to_string(),
            ));
        }
        if !is_repo_relative_path(request.evidence_dir.as_deref()) {
            return Err(DomainError::TemplateInvalid(
                "TEMPLATE_INVALID: evidence_dir is required and must be repo-relative".to_string(),
            ));
        }

        let Some(text) = payload_text(&request.payload) else {
            return Err(DomainError::TemplateInvalid(
                "TEMPLATE_INVALID: payload.message (or payload.text) is required".to_string(),
            ));
        };
        if text.trim().is_empty() {
            return Err(DomainError::TemplateInvalid(
                "TEMPLATE_INVALID: payload.message (or payload.text) is required".to_string(),
            ));
        }

        let to = self.coordinator.get_agent(&request.to_agent).await;
        let display = match to {
            Some(agent) if agent.numeric_code.is_some() => agent.display_name(),
            _ => {
                return Err(DomainError::TemplateInvalid(
                    "TEMPLATE_INVALID: cannot resolve recipient display name".to_string(),
                ));
            }
        };
        let required_prefix = format!("@{display}");
        if !text.trim_start().starts_with(&required_prefix) {
            return Err(DomainError::TemplateInvalid(format!(
                "TEMPLATE_INVALID: message must start with '{required_prefix}'"
            )));
        }
        Ok(())
    }
}
