//! Audit event construction and sink.
//!
//! The server builds entries for login and invite activity; where they end
//! up is the sink's business. The default sink emits structured `tracing`
//! events under the `audit` target.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::info;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuditEvent {
    Login,
    LoginFailed,
    TokenRefreshed,
    SessionRevoked,
    InviteCreated,
    InviteAccepted,
}

impl AuditEvent {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::LoginFailed => "login_failed",
            Self::TokenRefreshed => "token_refreshed",
            Self::SessionRevoked => "session_revoked",
            Self::InviteCreated => "invite_created",
            Self::InviteAccepted => "invite_accepted",
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuditEntry {
    pub event: AuditEvent,
    pub actor_type: String,
    pub actor_id: Option<String>,
    pub target: Option<String>,
    pub detail: Value,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    #[must_use]
    pub fn new(event: AuditEvent) -> Self {
        Self {
            event,
            actor_type: "system".to_string(),
            actor_id: None,
            target: None,
            detail: Value::Null,
            ip: None,
            user_agent: None,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn actor(mut self, actor_type: &str, actor_id: impl Into<String>) -> Self {
        self.actor_type = actor_type.to_string();
        self.actor_id = Some(actor_id.into());
        self
    }

    #[must_use]
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    #[must_use]
    pub fn detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }

    #[must_use]
    pub fn client(mut self, ip: Option<String>, user_agent: Option<String>) -> Self {
        self.ip = ip;
        self.user_agent = user_agent;
        self
    }
}

pub trait AuditLogger: Send + Sync {
    fn log(&self, entry: AuditEntry);
}

/// Sink that emits entries as structured log events.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditLogger;

impl AuditLogger for TracingAuditLogger {
    fn log(&self, entry: AuditEntry) {
        info!(
            target: "audit",
            event = entry.event.as_str(),
            actor_type = %entry.actor_type,
            actor_id = entry.actor_id.as_deref().unwrap_or("-"),
            target_id = entry.target.as_deref().unwrap_or("-"),
            ip = entry.ip.as_deref().unwrap_or("-"),
            user_agent = entry.user_agent.as_deref().unwrap_or("-"),
            timestamp = %entry.timestamp.to_rfc3339(),
            detail = %entry.detail,
        );
    }
}

/// Sink that discards everything; used in tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopAuditLogger;

impl AuditLogger for NoopAuditLogger {
    fn log(&self, _entry: AuditEntry) {}
}
