//! Single-use, time-boxed account invitations.

use chrono::{DateTime, Duration, Utc};

use super::token::{TokenError, TokenService};

/// Invitations lapse two days after creation.
pub const INVITE_TTL_HOURS: i64 = 48;

/// A pending invitation as it crosses the persistence boundary.
///
/// Only the token digest is carried; the raw token goes to the invitee and
/// is never stored.
#[derive(Clone, Debug)]
pub struct InviteData {
    pub email: String,
    pub token_hash: String,
    pub role: String,
    pub invited_by: String,
    pub expires_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}

/// Build a new invitation and return it together with the raw token.
///
/// # Errors
///
/// Returns a [`TokenError`] when token generation fails.
pub fn create_invite(
    tokens: &TokenService,
    email: &str,
    role: &str,
    invited_by: &str,
) -> Result<(InviteData, String), TokenError> {
    let raw_token = tokens.generate_refresh_token()?;
    let invite = InviteData {
        email: email.to_string(),
        token_hash: tokens.hash_token(&raw_token),
        role: role.to_string(),
        invited_by: invited_by.to_string(),
        expires_at: Utc::now() + Duration::hours(INVITE_TTL_HOURS),
        accepted_at: None,
    };

    Ok((invite, raw_token))
}

/// Decide whether a presented token redeems `invite`.
///
/// Accepted and expired invitations fail before any digest comparison.
#[must_use]
pub fn validate_invite_token(invite: &InviteData, tokens: &TokenService, presented: &str) -> bool {
    if invite.accepted_at.is_some() {
        return false;
    }
    if Utc::now() > invite.expires_at {
        return false;
    }
    tokens.hash_token(presented) == invite.token_hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::roles::ROLE_VIEWER;
    use secrecy::SecretString;

    fn service() -> TokenService {
        TokenService::new(&SecretString::from(
            "unit-test-signing-secret-0123456789abcdef".to_string(),
        ))
    }

    fn invite() -> (TokenService, InviteData, String) {
        let tokens = service();
        let (invite, raw_token) =
            create_invite(&tokens, "new.user@example.com", ROLE_VIEWER, "admin-id")
                .expect("invite creation");
        (tokens, invite, raw_token)
    }

    #[test]
    fn invite_carries_digest_not_token() {
        let (tokens, invite, raw_token) = invite();

        assert_ne!(invite.token_hash, raw_token);
        assert_eq!(invite.token_hash, tokens.hash_token(&raw_token));
        assert!(invite.accepted_at.is_none());
        assert!(invite.expires_at > Utc::now() + Duration::hours(INVITE_TTL_HOURS - 1));
    }

    #[test]
    fn matching_token_validates() {
        let (tokens, invite, raw_token) = invite();
        assert!(validate_invite_token(&invite, &tokens, &raw_token));
    }

    #[test]
    fn wrong_token_rejected() {
        let (tokens, invite, _) = invite();
        assert!(!validate_invite_token(&invite, &tokens, "not-the-token"));
    }

    #[test]
    fn accepted_invite_rejected_even_with_right_token() {
        let (tokens, mut invite, raw_token) = invite();
        invite.accepted_at = Some(Utc::now());
        assert!(!validate_invite_token(&invite, &tokens, &raw_token));
    }

    #[test]
    fn expired_invite_rejected_even_with_right_token() {
        let (tokens, mut invite, raw_token) = invite();
        invite.expires_at = Utc::now() - Duration::minutes(1);
        assert!(!validate_invite_token(&invite, &tokens, &raw_token));
    }
}
