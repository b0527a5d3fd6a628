//! Login, token refresh and logout.

use axum::{
    extract::Extension,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, instrument};
use utoipa::ToSchema;

use super::{client_meta, error_response, valid_email, ErrorMessage, UserSummary};
use crate::api::state::AuthState;
use crate::api::storage;
use crate::audit::{AuditEntry, AuditEvent};
use crate::auth::User;

/// Refresh tokens outlive access tokens by policy.
pub const REFRESH_TOKEN_TTL_DAYS: i64 = 30;

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub device_name: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserSummary,
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = SessionTokens),
        (status = 400, description = "Malformed request", body = ErrorMessage),
        (status = 401, description = "Invalid credentials", body = ErrorMessage),
        (status = 429, description = "Too many attempts", body = ErrorMessage)
    ),
    tag = "auth"
)]
#[instrument(skip(headers, pool, state, payload))]
pub async fn login(
    headers: HeaderMap,
    Extension(pool): Extension<PgPool>,
    Extension(state): Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "missing payload");
    };

    let email = request.email.trim().to_lowercase();
    if !valid_email(&email) {
        return error_response(StatusCode::BAD_REQUEST, "invalid email");
    }

    let (ip, user_agent) = client_meta(&headers);

    // Separate per-address and per-account keys: a distributed guesser and
    // a single noisy address both run out of attempts.
    let limit = state.config().login_limit();
    let window = state.config().login_window();
    let ip_key = format!("login:ip:{}", ip.as_deref().unwrap_or("unknown"));
    let email_key = format!("login:email:{email}");
    if state.limiter().check_limit(&ip_key, limit, window).is_err()
        || state
            .limiter()
            .check_limit(&email_key, limit, window)
            .is_err()
    {
        let mut response = error_response(StatusCode::TOO_MANY_REQUESTS, "too many login attempts");
        if let Ok(value) = HeaderValue::from_str(&window.as_secs().to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        return response;
    }

    let user = match storage::user_by_email(&pool, &email).await {
        Ok(user) => user,
        Err(err) => {
            error!("Login lookup failed: {err}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "login failed");
        }
    };

    // Unknown account, deactivated account and wrong password all get the
    // same answer.
    let Some(user) = user else {
        return login_rejected(&state, &email, ip, user_agent);
    };
    if !user.active
        || state
            .tokens()
            .verify_password(&user.password_hash, &request.password)
            .is_err()
    {
        return login_rejected(&state, &email, ip, user_agent);
    }

    // Forgive earlier failures once the caller proves the credential.
    state.limiter().reset_limit(&ip_key);
    state.limiter().reset_limit(&email_key);

    let session = match issue_session(
        &pool,
        &state,
        &user,
        request.device_name.as_deref(),
        ip.as_deref(),
    )
    .await
    {
        Ok(session) => session,
        Err(err) => {
            error!("Failed to issue session: {err}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "login failed");
        }
    };

    state.audit().log(
        AuditEntry::new(AuditEvent::Login)
            .actor("user", user.id.clone())
            .detail(json!({ "email": user.email }))
            .client(ip, user_agent),
    );

    (StatusCode::OK, Json(session)).into_response()
}

fn login_rejected(
    state: &AuthState,
    email: &str,
    ip: Option<String>,
    user_agent: Option<String>,
) -> Response {
    state.audit().log(
        AuditEntry::new(AuditEvent::LoginFailed)
            .detail(json!({ "email": email }))
            .client(ip, user_agent),
    );
    error_response(StatusCode::UNAUTHORIZED, "invalid email or password")
}

async fn issue_session(
    pool: &PgPool,
    state: &AuthState,
    user: &User,
    device_name: Option<&str>,
    ip: Option<&str>,
) -> anyhow::Result<SessionTokens> {
    let access_token = state.tokens().generate_access_token(user)?;
    let refresh_token = state.tokens().generate_refresh_token()?;

    storage::insert_refresh_token(
        pool,
        &user.id,
        &state.tokens().hash_token(&refresh_token),
        device_name,
        ip,
        Utc::now() + Duration::days(REFRESH_TOKEN_TTL_DAYS),
    )
    .await?;

    Ok(SessionTokens {
        access_token,
        refresh_token,
        user: UserSummary::from(user),
    })
}

#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New session tokens", body = SessionTokens),
        (status = 400, description = "Malformed request", body = ErrorMessage),
        (status = 401, description = "Unknown, expired or revoked token", body = ErrorMessage)
    ),
    tag = "auth"
)]
#[instrument(skip(headers, pool, state, payload))]
pub async fn refresh(
    headers: HeaderMap,
    Extension(pool): Extension<PgPool>,
    Extension(state): Extension<Arc<AuthState>>,
    payload: Option<Json<RefreshRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "missing payload");
    };

    let token_hash = state.tokens().hash_token(request.refresh_token.trim());
    let record = match storage::refresh_token_by_hash(&pool, &token_hash).await {
        Ok(record) => record,
        Err(err) => {
            error!("Refresh token lookup failed: {err}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "refresh failed");
        }
    };

    // Unknown, revoked and expired tokens are indistinguishable to the
    // caller.
    let Some(record) = record else {
        return error_response(StatusCode::UNAUTHORIZED, "invalid refresh token");
    };
    if record.revoked_at.is_some() || record.expires_at < Utc::now() {
        return error_response(StatusCode::UNAUTHORIZED, "invalid refresh token");
    }

    let user = match storage::user_by_id(&pool, &record.user_id.to_string()).await {
        Ok(Some(user)) if user.active => user,
        Ok(_) => return error_response(StatusCode::UNAUTHORIZED, "invalid refresh token"),
        Err(err) => {
            error!("Refresh user lookup failed: {err}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "refresh failed");
        }
    };

    // Rotation: the presented token is spent whether or not issuing the
    // replacement succeeds.
    if let Err(err) = storage::revoke_refresh_token(&pool, record.id).await {
        error!("Failed to revoke rotated refresh token: {err}");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "refresh failed");
    }
    if let Err(err) = storage::touch_refresh_token(&pool, record.id).await {
        error!("Failed to record refresh token use: {err}");
    }

    let (ip, user_agent) = client_meta(&headers);
    let session = match issue_session(&pool, &state, &user, record.device_name.as_deref(), ip.as_deref()).await
    {
        Ok(session) => session,
        Err(err) => {
            error!("Failed to rotate session: {err}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "refresh failed");
        }
    };

    state.audit().log(
        AuditEntry::new(AuditEvent::TokenRefreshed)
            .actor("user", user.id.clone())
            .client(ip, user_agent),
    );

    (StatusCode::OK, Json(session)).into_response()
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    request_body = RefreshRequest,
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth"
)]
#[instrument(skip(headers, pool, state, payload))]
pub async fn logout(
    headers: HeaderMap,
    Extension(pool): Extension<PgPool>,
    Extension(state): Extension<Arc<AuthState>>,
    payload: Option<Json<RefreshRequest>>,
) -> Response {
    // Always 204: logout must not leak whether the token was live.
    let Some(Json(request)) = payload else {
        return StatusCode::NO_CONTENT.into_response();
    };

    let token_hash = state.tokens().hash_token(request.refresh_token.trim());
    match storage::refresh_token_by_hash(&pool, &token_hash).await {
        Ok(Some(record)) => {
            if let Err(err) = storage::revoke_refresh_token(&pool, record.id).await {
                error!("Failed to revoke refresh token: {err}");
            } else {
                let (ip, user_agent) = client_meta(&headers);
                state.audit().log(
                    AuditEntry::new(AuditEvent::SessionRevoked)
                        .actor("user", record.user_id.to_string())
                        .target(record.id.to_string())
                        .client(ip, user_agent),
                );
            }
        }
        Ok(None) => {}
        Err(err) => error!("Logout lookup failed: {err}"),
    }

    StatusCode::NO_CONTENT.into_response()
}
