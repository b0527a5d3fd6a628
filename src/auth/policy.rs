//! Signing-secret and account-password strength rules.

use thiserror::Error;
use tracing::warn;

/// Minimum length for the JWT signing secret.
pub const MIN_SECRET_LEN: usize = 32;
/// Minimum length for account passwords.
pub const MIN_PASSWORD_LEN: usize = 12;

/// Fallback signing secret for local development setups.
pub const DEV_FALLBACK_SECRET: &str = "extsync-dev-secret";

const WEAK_SECRETS: &[&str] = &[
    "changeme",
    "secret",
    "password",
    "test",
    "dev",
    "development",
    DEV_FALLBACK_SECRET,
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("signing secret is empty")]
    EmptySecret,
    #[error("signing secret is a well-known value")]
    WeakSecret,
    #[error("signing secret must be at least {MIN_SECRET_LEN} characters")]
    SecretTooShort,
    #[error("password must be at least {MIN_PASSWORD_LEN} characters")]
    PasswordTooShort,
    #[error("password needs an uppercase letter, a lowercase letter, a digit and a symbol")]
    PasswordComplexity,
}

/// Check a signing secret before the server starts handing out tokens.
///
/// Well-known values are checked before length so a short known value is
/// reported as weak rather than short. In development mode a weak value is
/// tolerated with a warning.
///
/// # Errors
///
/// Returns a [`PolicyError`] describing the first rule the secret violates.
pub fn validate_secret(secret: &str, development: bool) -> Result<(), PolicyError> {
    if secret.is_empty() {
        return Err(PolicyError::EmptySecret);
    }

    if WEAK_SECRETS.contains(&secret) {
        if development {
            warn!("Signing secret is a well-known value; acceptable for development only");
            return Ok(());
        }
        return Err(PolicyError::WeakSecret);
    }

    if secret.len() < MIN_SECRET_LEN {
        return Err(PolicyError::SecretTooShort);
    }

    Ok(())
}

/// True when `EXTSYNC_ENV` or `EXTSYNC_MODE` selects development mode.
///
/// Unset or unrecognized values mean production.
#[must_use]
pub fn is_development_mode() -> bool {
    ["EXTSYNC_ENV", "EXTSYNC_MODE"].iter().any(|name| {
        std::env::var(name).is_ok_and(|value| {
            let value = value.trim().to_lowercase();
            value == "development" || value == "dev"
        })
    })
}

/// Check an account password against the complexity rules.
///
/// # Errors
///
/// Returns a [`PolicyError`] when the password is too short or misses a
/// required character class.
pub fn validate_password(password: &str) -> Result<(), PolicyError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(PolicyError::PasswordTooShort);
    }

    let has_upper = password.chars().any(char::is_uppercase);
    let has_lower = password.chars().any(char::is_lowercase);
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_symbol = password
        .chars()
        .any(|c| !c.is_alphanumeric() && !c.is_whitespace());

    if has_upper && has_lower && has_digit && has_symbol {
        Ok(())
    } else {
        Err(PolicyError::PasswordComplexity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_secret_rejected_in_both_modes() {
        assert_eq!(validate_secret("", false), Err(PolicyError::EmptySecret));
        assert_eq!(validate_secret("", true), Err(PolicyError::EmptySecret));
    }

    #[test]
    fn weak_secret_allowed_only_in_development() {
        assert_eq!(validate_secret("changeme", true), Ok(()));
        assert_eq!(
            validate_secret("changeme", false),
            Err(PolicyError::WeakSecret)
        );
    }

    #[test]
    fn weak_secret_reported_weak_not_short() {
        // "dev" is both short and well-known; the weak check wins.
        assert_eq!(validate_secret("dev", false), Err(PolicyError::WeakSecret));
        assert_eq!(
            validate_secret(DEV_FALLBACK_SECRET, false),
            Err(PolicyError::WeakSecret)
        );
    }

    #[test]
    fn short_secret_rejected_in_both_modes() {
        let short = "only-thirty-one-characters!!!!!";
        assert_eq!(short.len(), 31);
        assert_eq!(
            validate_secret(short, false),
            Err(PolicyError::SecretTooShort)
        );
        assert_eq!(
            validate_secret(short, true),
            Err(PolicyError::SecretTooShort)
        );
    }

    #[test]
    fn long_random_secret_accepted() {
        let secret = "f3a9c1d82e5b47069d1c3a5e7f9b2d4c";
        assert_eq!(secret.len(), 32);
        assert_eq!(validate_secret(secret, false), Ok(()));
    }

    #[test]
    fn development_mode_from_either_variable() {
        temp_env::with_vars(
            [("EXTSYNC_ENV", Some("development")), ("EXTSYNC_MODE", None)],
            || assert!(is_development_mode()),
        );
        temp_env::with_vars(
            [("EXTSYNC_ENV", None), ("EXTSYNC_MODE", Some("dev"))],
            || assert!(is_development_mode()),
        );
    }

    #[test]
    fn development_mode_defaults_to_production() {
        temp_env::with_vars(
            [
                ("EXTSYNC_ENV", None::<&str>),
                ("EXTSYNC_MODE", None::<&str>),
            ],
            || assert!(!is_development_mode()),
        );
        temp_env::with_vars([("EXTSYNC_ENV", Some("staging"))], || {
            assert!(!is_development_mode());
        });
    }

    #[test]
    fn short_password_rejected() {
        assert_eq!(
            validate_password("Ab1!short"),
            Err(PolicyError::PasswordTooShort)
        );
    }

    #[test]
    fn password_needs_every_character_class() {
        assert_eq!(
            validate_password("alllowercase1!"),
            Err(PolicyError::PasswordComplexity)
        );
        assert_eq!(
            validate_password("ALLUPPERCASE1!"),
            Err(PolicyError::PasswordComplexity)
        );
        assert_eq!(
            validate_password("NoDigitsHere!!"),
            Err(PolicyError::PasswordComplexity)
        );
        assert_eq!(
            validate_password("NoSymbolsHere1"),
            Err(PolicyError::PasswordComplexity)
        );
    }

    #[test]
    fn strong_password_accepted() {
        assert_eq!(validate_password("Tr1cky-Passw0rd!"), Ok(()));
    }
}
