//! OpenAPI document assembly.

use axum::response::{IntoResponse, Json};
use utoipa::OpenApi;

use super::handlers::{auth, health, invites, me, ErrorMessage, UserSummary};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "extsync management server",
        description = "Authentication and extension-sync management API"
    ),
    paths(
        health::health,
        auth::login,
        auth::refresh,
        auth::logout,
        invites::create_invite,
        invites::accept_invite,
        me::me,
    ),
    components(schemas(
        ErrorMessage,
        UserSummary,
        auth::LoginRequest,
        auth::RefreshRequest,
        auth::SessionTokens,
        invites::CreateInviteRequest,
        invites::AcceptInviteRequest,
        invites::InviteResponse,
    )),
    tags(
        (name = "health", description = "Liveness"),
        (name = "auth", description = "Sessions and tokens"),
        (name = "invites", description = "Account invitations"),
        (name = "users", description = "User profile")
    )
)]
pub struct ApiDoc;

pub async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();

        for path in [
            "/health",
            "/api/auth/login",
            "/api/auth/refresh",
            "/api/auth/logout",
            "/api/invites",
            "/api/invites/accept",
            "/api/me",
        ] {
            assert!(
                paths.iter().any(|candidate| candidate.as_str() == path),
                "missing path {path}"
            );
        }
    }
}
