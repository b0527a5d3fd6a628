//! Invitation creation and acceptance.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, instrument};
use utoipa::ToSchema;

use super::{client_meta, error_response, valid_email, ErrorMessage, UserSummary};
use crate::api::middleware::CurrentUser;
use crate::api::state::AuthState;
use crate::api::storage;
use crate::audit::{AuditEntry, AuditEvent};
use crate::auth::{invite, policy, roles};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateInviteRequest {
    pub email: String,
    pub role: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InviteResponse {
    pub email: String,
    pub role: String,
    /// Raw invite token; shown exactly once, only the digest is stored.
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AcceptInviteRequest {
    pub email: String,
    pub token: String,
    pub password: String,
}

#[utoipa::path(
    post,
    path = "/api/invites",
    request_body = CreateInviteRequest,
    responses(
        (status = 201, description = "Invitation created", body = InviteResponse),
        (status = 400, description = "Malformed request", body = ErrorMessage),
        (status = 401, description = "Not authenticated", body = ErrorMessage),
        (status = 403, description = "Requires the admin role", body = ErrorMessage)
    ),
    tag = "invites"
)]
#[instrument(skip(headers, pool, state, actor, payload))]
pub async fn create_invite(
    headers: HeaderMap,
    Extension(pool): Extension<PgPool>,
    Extension(state): Extension<Arc<AuthState>>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    payload: Option<Json<CreateInviteRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "missing payload");
    };

    let email = request.email.trim().to_lowercase();
    if !valid_email(&email) {
        return error_response(StatusCode::BAD_REQUEST, "invalid email");
    }
    if !roles::is_valid_role(&request.role) {
        return error_response(StatusCode::BAD_REQUEST, "unknown role");
    }

    let (invite_data, raw_token) =
        match invite::create_invite(state.tokens(), &email, &request.role, &actor.id) {
            Ok(created) => created,
            Err(err) => {
                error!("Failed to create invite: {err}");
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, "invite failed");
            }
        };

    if let Err(err) = storage::insert_invite(&pool, &invite_data).await {
        error!("Failed to store invite: {err}");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "invite failed");
    }

    let (ip, user_agent) = client_meta(&headers);
    state.audit().log(
        AuditEntry::new(AuditEvent::InviteCreated)
            .actor("user", actor.id.clone())
            .target(email.clone())
            .detail(json!({ "role": invite_data.role }))
            .client(ip, user_agent),
    );

    (
        StatusCode::CREATED,
        Json(InviteResponse {
            email,
            role: invite_data.role,
            token: raw_token,
            expires_at: invite_data.expires_at,
        }),
    )
        .into_response()
}

#[utoipa::path(
    post,
    path = "/api/invites/accept",
    request_body = AcceptInviteRequest,
    responses(
        (status = 201, description = "Account created", body = UserSummary),
        (status = 400, description = "Malformed request or weak password", body = ErrorMessage),
        (status = 401, description = "Unknown, used or expired invitation", body = ErrorMessage)
    ),
    tag = "invites"
)]
#[instrument(skip(headers, pool, state, payload))]
pub async fn accept_invite(
    headers: HeaderMap,
    Extension(pool): Extension<PgPool>,
    Extension(state): Extension<Arc<AuthState>>,
    payload: Option<Json<AcceptInviteRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "missing payload");
    };

    let email = request.email.trim().to_lowercase();
    if !valid_email(&email) {
        return error_response(StatusCode::BAD_REQUEST, "invalid email");
    }

    let record = match storage::pending_invite_by_email(&pool, &email).await {
        Ok(record) => record,
        Err(err) => {
            error!("Invite lookup failed: {err}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "invite failed");
        }
    };

    // Missing, spent, lapsed and mismatched invitations all get the same
    // answer.
    let rejected = || error_response(StatusCode::UNAUTHORIZED, "invalid or expired invitation");
    let Some(record) = record else {
        return rejected();
    };
    if !invite::validate_invite_token(&record.invite, state.tokens(), request.token.trim()) {
        return rejected();
    }

    if let Err(err) = policy::validate_password(&request.password) {
        return error_response(StatusCode::BAD_REQUEST, &err.to_string());
    }

    let password_hash = match state.tokens().hash_password(&request.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "invite failed");
        }
    };

    let user = match storage::insert_user(&pool, &email, &password_hash, &record.invite.role).await
    {
        Ok(user) => user,
        Err(err) => {
            error!("Failed to create user from invite: {err}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "invite failed");
        }
    };

    if let Err(err) = storage::mark_invite_accepted(&pool, record.id).await {
        // The account exists; a second acceptance attempt will fail on the
        // unique email instead of the invite flag.
        error!("Failed to mark invite accepted: {err}");
    }

    let (ip, user_agent) = client_meta(&headers);
    state.audit().log(
        AuditEntry::new(AuditEvent::InviteAccepted)
            .actor("user", user.id.clone())
            .target(email)
            .detail(json!({ "role": user.role, "invited_by": record.invite.invited_by }))
            .client(ip, user_agent),
    );

    (StatusCode::CREATED, Json(UserSummary::from(&user))).into_response()
}
