//! Access-token signing and validation, password digests and opaque
//! token generation.
//!
//! The service holds only the signing key material; every operation is
//! otherwise stateless and safe to call from any number of tasks.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use super::User;

/// Access tokens are short-lived by policy; the window is not configurable.
pub const ACCESS_TOKEN_TTL_SECS: i64 = 15 * 60;
/// Work factor for stored password digests.
pub const BCRYPT_COST: u32 = 12;
const OPAQUE_TOKEN_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("token claims are incomplete")]
    IncompleteClaims,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
    #[error("failed to hash password: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),
    #[error("failed to gather randomness: {0}")]
    Randomness(#[from] rand::Error),
}

/// Identity attached to a request once its token fully validates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Claims {
    pub user_id: String,
    pub email: String,
    pub role: String,
}

#[derive(Serialize)]
struct AccessClaims<'a> {
    sub: &'a str,
    email: &'a str,
    role: &'a str,
    iat: i64,
    exp: i64,
}

pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenService {
    #[must_use]
    pub fn new(secret: &SecretString) -> Self {
        let bytes = secret.expose_secret().as_bytes();

        // Accepting HS256 only rejects tokens asserting any other `alg`,
        // signed or not.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(bytes),
            decoding_key: DecodingKey::from_secret(bytes),
            validation,
        }
    }

    /// Issue a signed access token for `user`.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Signing`] when serialization or signing fails.
    pub fn generate_access_token(&self, user: &User) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        let claims = AccessClaims {
            sub: &user.id,
            email: &user.email,
            role: &user.role,
            iat: now,
            exp: now + ACCESS_TOKEN_TTL_SECS,
        };

        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }

    /// Verify a presented access token and extract its identity claims.
    ///
    /// A token whose signature and expiry check out can still be unusable:
    /// `sub`, `email` and `role` must each be a non-empty string, otherwise
    /// the token is rejected instead of yielding zero-valued fields.
    ///
    /// # Errors
    ///
    /// [`TokenError::InvalidToken`] for structural, signature or expiry
    /// failures; [`TokenError::IncompleteClaims`] when an identity claim is
    /// missing, empty or not a string.
    pub fn validate_access_token(&self, token: &str) -> Result<Claims, TokenError> {
        let data =
            decode::<Value>(token, &self.decoding_key, &self.validation).map_err(|err| {
                debug!("Token rejected: {err}");
                TokenError::InvalidToken
            })?;

        let claims = data.claims;
        let field = |name: &str| -> Result<String, TokenError> {
            claims
                .get(name)
                .and_then(Value::as_str)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
                .ok_or(TokenError::IncompleteClaims)
        };

        Ok(Claims {
            user_id: field("sub")?,
            email: field("email")?,
            role: field("role")?,
        })
    }

    /// Produce a salted bcrypt digest for storage.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::PasswordHash`] when bcrypt fails.
    pub fn hash_password(&self, password: &str) -> Result<String, TokenError> {
        Ok(bcrypt::hash(password, BCRYPT_COST)?)
    }

    /// Check a password against a stored digest.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::InvalidCredentials`] on mismatch and on
    /// malformed digests; callers cannot distinguish the two.
    pub fn verify_password(&self, hash: &str, password: &str) -> Result<(), TokenError> {
        match bcrypt::verify(password, hash) {
            Ok(true) => Ok(()),
            Ok(false) => Err(TokenError::InvalidCredentials),
            Err(err) => {
                debug!("Password verification failed: {err}");
                Err(TokenError::InvalidCredentials)
            }
        }
    }

    /// Generate an opaque refresh/invite token from the OS random source.
    ///
    /// The raw value is returned to the caller exactly once; only its
    /// digest may be stored.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Randomness`] when the OS source fails.
    pub fn generate_refresh_token(&self) -> Result<String, TokenError> {
        let mut bytes = [0u8; OPAQUE_TOKEN_BYTES];
        OsRng.try_fill_bytes(&mut bytes)?;
        Ok(Base64UrlUnpadded::encode_string(&bytes))
    }

    /// Deterministic hex digest used to store and look up opaque tokens.
    #[must_use]
    pub fn hash_token(&self, token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::roles::ROLE_MANAGER;
    use serde_json::json;

    fn service() -> TokenService {
        TokenService::new(&SecretString::from(
            "unit-test-signing-secret-0123456789abcdef".to_string(),
        ))
    }

    fn sample_user() -> User {
        User {
            id: "7e4c1f0a-9f3b-4a64-8f2d-1c5a9e6b3d21".to_string(),
            email: "manager@example.com".to_string(),
            role: ROLE_MANAGER.to_string(),
            active: true,
            password_hash: String::new(),
        }
    }

    fn encode_raw(claims: &Value, secret: &str) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("failed to encode test token")
    }

    #[test]
    fn access_token_round_trip() {
        let service = service();
        let user = sample_user();

        let token = service
            .generate_access_token(&user)
            .expect("token generation");
        let claims = service
            .validate_access_token(&token)
            .expect("token validation");

        assert_eq!(claims.user_id, user.id);
        assert_eq!(claims.email, user.email);
        assert_eq!(claims.role, user.role);
    }

    #[test]
    fn wrong_secret_rejected() {
        let service = service();
        let other = TokenService::new(&SecretString::from(
            "another-signing-secret-not-the-same-one!".to_string(),
        ));

        let token = other
            .generate_access_token(&sample_user())
            .expect("token generation");
        assert!(matches!(
            service.validate_access_token(&token),
            Err(TokenError::InvalidToken)
        ));
    }

    #[test]
    fn expired_token_rejected() {
        let service = service();
        let past = Utc::now().timestamp() - 120;
        let token = encode_raw(
            &json!({
                "sub": "user",
                "email": "user@example.com",
                "role": "viewer",
                "iat": past - 60,
                "exp": past,
            }),
            "unit-test-signing-secret-0123456789abcdef",
        );

        assert!(matches!(
            service.validate_access_token(&token),
            Err(TokenError::InvalidToken)
        ));
    }

    #[test]
    fn garbage_token_rejected() {
        let service = service();
        assert!(matches!(
            service.validate_access_token("not-a-token"),
            Err(TokenError::InvalidToken)
        ));
        assert!(matches!(
            service.validate_access_token(""),
            Err(TokenError::InvalidToken)
        ));
    }

    #[test]
    fn other_algorithm_rejected() {
        let service = service();
        let now = Utc::now().timestamp();
        let claims = json!({
            "sub": "user",
            "email": "user@example.com",
            "role": "viewer",
            "iat": now,
            "exp": now + 60,
        });
        let token = encode(
            &Header::new(Algorithm::HS384),
            &claims,
            &EncodingKey::from_secret(b"unit-test-signing-secret-0123456789abcdef"),
        )
        .expect("failed to encode test token");

        assert!(matches!(
            service.validate_access_token(&token),
            Err(TokenError::InvalidToken)
        ));
    }

    #[test]
    fn incomplete_claims_rejected() {
        let service = service();
        let now = Utc::now().timestamp();

        for name in ["sub", "email", "role"] {
            // Missing, wrong type and empty all count as incomplete.
            for variant in [None, Some(json!(42)), Some(json!(""))] {
                let mut claims = json!({
                    "sub": "user",
                    "email": "user@example.com",
                    "role": "viewer",
                    "iat": now,
                    "exp": now + 60,
                });
                let object = claims.as_object_mut().expect("object claims");
                match variant {
                    None => {
                        object.remove(name);
                    }
                    Some(value) => {
                        object.insert(name.to_string(), value);
                    }
                }

                let token =
                    encode_raw(&claims, "unit-test-signing-secret-0123456789abcdef");
                assert!(
                    matches!(
                        service.validate_access_token(&token),
                        Err(TokenError::IncompleteClaims)
                    ),
                    "claim {name} variant should have been rejected"
                );
            }
        }
    }

    #[test]
    fn password_digests_are_salted() {
        let service = service();
        let first = service.hash_password("Tr1cky-Passw0rd!").expect("hash");
        let second = service.hash_password("Tr1cky-Passw0rd!").expect("hash");

        assert_ne!(first, second);
        assert!(service.verify_password(&first, "Tr1cky-Passw0rd!").is_ok());
        assert!(service.verify_password(&second, "Tr1cky-Passw0rd!").is_ok());
    }

    #[test]
    fn wrong_password_rejected() {
        let service = service();
        let hash = service.hash_password("Tr1cky-Passw0rd!").expect("hash");

        assert!(matches!(
            service.verify_password(&hash, "Tr1cky-Passw0rd?"),
            Err(TokenError::InvalidCredentials)
        ));
        assert!(matches!(
            service.verify_password("not-a-bcrypt-digest", "anything"),
            Err(TokenError::InvalidCredentials)
        ));
    }

    #[test]
    fn refresh_tokens_do_not_repeat() {
        let service = service();
        let first = service.generate_refresh_token().expect("token");
        let second = service.generate_refresh_token().expect("token");

        assert_ne!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn token_digest_is_stable_hex() {
        let service = service();
        let digest = service.hash_token("opaque-token");

        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(digest, service.hash_token("opaque-token"));
        assert_ne!(digest, service.hash_token("other-token"));
    }
}
