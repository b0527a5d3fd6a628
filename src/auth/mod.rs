//! Authentication and access-control core.
//!
//! Everything security-sensitive lives here: signing-secret and password
//! policy, access-token issuance and validation, opaque refresh/invite
//! token handling, sliding-window rate limiting and the invite workflow.
//! The modules in this tree perform no I/O; persistence is reached only
//! through the [`UserStore`] collaborator injected by the server wiring.

pub mod invite;
pub mod policy;
pub mod rate_limit;
pub mod roles;
pub mod token;

use serde::Serialize;

/// An authenticated principal as read from the persistence layer.
///
/// The core never mutates users; it only reads them to decide whether a
/// request is allowed through.
#[derive(Clone, Debug, Serialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub role: String,
    pub active: bool,
    #[serde(skip)]
    pub password_hash: String,
}

/// Persistence collaborator used by the authentication middleware.
#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    /// Returns `Ok(None)` when no user matches `id`.
    async fn user_by_id(&self, id: &str) -> anyhow::Result<Option<User>>;
}
