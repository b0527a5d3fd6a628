//! Postgres bridge for the auth routes and the middleware's user lookup.
//!
//! Queries stay out of the auth core on purpose: the core reads users
//! through [`UserStore`] and everything else goes through the free
//! functions below.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use crate::auth::invite::InviteData;
use crate::auth::{User, UserStore};

/// [`UserStore`] backed by the `users` table.
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn user_by_id(&self, id: &str) -> Result<Option<User>> {
        user_by_id(&self.pool, id).await
    }
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get::<Uuid, _>("id")?.to_string(),
        email: row.try_get("email")?,
        role: row.try_get("role")?,
        active: row.try_get("active")?,
        password_hash: row.try_get("password_hash")?,
    })
}

pub async fn user_by_id(pool: &PgPool, id: &str) -> Result<Option<User>> {
    // A subject that is not a UUID cannot match any row.
    let Ok(user_id) = Uuid::parse_str(id) else {
        return Ok(None);
    };

    let row = sqlx::query("SELECT id, email, password_hash, role, active FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("Failed to query user by id")?;

    row.as_ref()
        .map(user_from_row)
        .transpose()
        .context("Failed to decode user row")
}

pub async fn user_by_email(pool: &PgPool, email: &str) -> Result<Option<User>> {
    let row =
        sqlx::query("SELECT id, email, password_hash, role, active FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(pool)
            .await
            .context("Failed to query user by email")?;

    row.as_ref()
        .map(user_from_row)
        .transpose()
        .context("Failed to decode user row")
}

pub async fn insert_user(
    pool: &PgPool,
    email: &str,
    password_hash: &str,
    role: &str,
) -> Result<User> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO users (id, email, password_hash, role, active) VALUES ($1, $2, $3, $4, TRUE)",
    )
    .bind(id)
    .bind(email)
    .bind(password_hash)
    .bind(role)
    .execute(pool)
    .await
    .context("Failed to insert user")?;

    Ok(User {
        id: id.to_string(),
        email: email.to_string(),
        role: role.to_string(),
        active: true,
        password_hash: password_hash.to_string(),
    })
}

/// A stored refresh-token record; only the digest ever reaches this table.
#[derive(Clone, Debug)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub device_name: Option<String>,
    pub ip_address: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
}

pub async fn insert_refresh_token(
    pool: &PgPool,
    user_id: &str,
    token_hash: &str,
    device_name: Option<&str>,
    ip_address: Option<&str>,
    expires_at: DateTime<Utc>,
) -> Result<()> {
    let user_id = Uuid::parse_str(user_id).context("Refresh token user id is not a UUID")?;
    sqlx::query(
        "INSERT INTO refresh_tokens (id, user_id, token_hash, device_name, ip_address, expires_at) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(token_hash)
    .bind(device_name)
    .bind(ip_address)
    .bind(expires_at)
    .execute(pool)
    .await
    .context("Failed to insert refresh token")?;

    Ok(())
}

pub async fn refresh_token_by_hash(
    pool: &PgPool,
    token_hash: &str,
) -> Result<Option<RefreshTokenRecord>> {
    let row = sqlx::query(
        "SELECT id, user_id, token_hash, device_name, ip_address, expires_at, revoked_at, \
         last_used_at FROM refresh_tokens WHERE token_hash = $1",
    )
    .bind(token_hash)
    .fetch_optional(pool)
    .await
    .context("Failed to query refresh token")?;

    let Some(row) = row else {
        return Ok(None);
    };

    Ok(Some(RefreshTokenRecord {
        id: row.try_get("id").context("Failed to decode refresh token")?,
        user_id: row
            .try_get("user_id")
            .context("Failed to decode refresh token")?,
        token_hash: row
            .try_get("token_hash")
            .context("Failed to decode refresh token")?,
        device_name: row
            .try_get("device_name")
            .context("Failed to decode refresh token")?,
        ip_address: row
            .try_get("ip_address")
            .context("Failed to decode refresh token")?,
        expires_at: row
            .try_get("expires_at")
            .context("Failed to decode refresh token")?,
        revoked_at: row
            .try_get("revoked_at")
            .context("Failed to decode refresh token")?,
        last_used_at: row
            .try_get("last_used_at")
            .context("Failed to decode refresh token")?,
    }))
}

pub async fn revoke_refresh_token(pool: &PgPool, id: Uuid) -> Result<()> {
    sqlx::query("UPDATE refresh_tokens SET revoked_at = now() WHERE id = $1 AND revoked_at IS NULL")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to revoke refresh token")?;

    Ok(())
}

pub async fn touch_refresh_token(pool: &PgPool, id: Uuid) -> Result<()> {
    sqlx::query("UPDATE refresh_tokens SET last_used_at = now() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to touch refresh token")?;

    Ok(())
}

/// A pending invitation row, paired with its database id.
#[derive(Clone, Debug)]
pub struct InviteRecord {
    pub id: Uuid,
    pub invite: InviteData,
}

pub async fn insert_invite(pool: &PgPool, invite: &InviteData) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO user_invites (id, email, token_hash, role, invited_by, expires_at) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(id)
    .bind(&invite.email)
    .bind(&invite.token_hash)
    .bind(&invite.role)
    .bind(&invite.invited_by)
    .bind(invite.expires_at)
    .execute(pool)
    .await
    .context("Failed to insert invite")?;

    Ok(id)
}

pub async fn pending_invite_by_email(pool: &PgPool, email: &str) -> Result<Option<InviteRecord>> {
    let row = sqlx::query(
        "SELECT id, email, token_hash, role, invited_by, expires_at, accepted_at \
         FROM user_invites WHERE email = $1 AND accepted_at IS NULL \
         ORDER BY expires_at DESC LIMIT 1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await
    .context("Failed to query invite")?;

    let Some(row) = row else {
        return Ok(None);
    };

    Ok(Some(InviteRecord {
        id: row.try_get("id").context("Failed to decode invite")?,
        invite: InviteData {
            email: row.try_get("email").context("Failed to decode invite")?,
            token_hash: row
                .try_get("token_hash")
                .context("Failed to decode invite")?,
            role: row.try_get("role").context("Failed to decode invite")?,
            invited_by: row
                .try_get("invited_by")
                .context("Failed to decode invite")?,
            expires_at: row
                .try_get("expires_at")
                .context("Failed to decode invite")?,
            accepted_at: row
                .try_get("accepted_at")
                .context("Failed to decode invite")?,
        },
    }))
}

pub async fn mark_invite_accepted(pool: &PgPool, id: Uuid) -> Result<()> {
    sqlx::query("UPDATE user_invites SET accepted_at = now() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to mark invite accepted")?;

    Ok(())
}
