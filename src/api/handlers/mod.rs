pub mod auth;
pub mod health;
pub mod invites;
pub mod me;

// common helpers for the handlers
use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The one JSON error shape this server produces.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ErrorMessage {
    pub error: String,
}

/// Public view of a user, shared by login and profile responses.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct UserSummary {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl From<&crate::auth::User> for UserSummary {
    fn from(user: &crate::auth::User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
        }
    }
}

pub(crate) fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorMessage {
            error: message.to_string(),
        }),
    )
        .into_response()
}

pub(crate) fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email))
}

/// Client address and user agent for audit entries, from proxy headers.
pub(crate) fn client_meta(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);
    let ip = forwarded.or_else(|| {
        headers
            .get("x-real-ip")
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    });
    let user_agent = headers
        .get("user-agent")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    (ip, user_agent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-at.example.com"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn client_meta_prefers_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("1.2.3.4, 5.6.7.8"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        headers.insert("user-agent", HeaderValue::from_static("agent/2.1"));

        let (ip, user_agent) = client_meta(&headers);
        assert_eq!(ip.as_deref(), Some("1.2.3.4"));
        assert_eq!(user_agent.as_deref(), Some("agent/2.1"));
    }

    #[test]
    fn client_meta_handles_missing_headers() {
        let (ip, user_agent) = client_meta(&HeaderMap::new());
        assert!(ip.is_none());
        assert!(user_agent.is_none());
    }
}
