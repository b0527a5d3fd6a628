use crate::auth::policy;
use crate::cli::{actions::Action, commands, dispatch::handler, globals::GlobalArgs, telemetry};
use anyhow::{anyhow, Context, Result};
use secrecy::SecretString;
use tracing::warn;

/// Parse the CLI, initialize telemetry and resolve startup configuration.
///
/// # Errors
///
/// Returns an error when telemetry setup fails or the signing secret does
/// not meet policy.
pub fn start() -> Result<(Action, GlobalArgs)> {
    let matches = commands::new().get_matches();

    let verbosity_level = match matches.get_one::<u8>("verbosity").map_or(0, |&v| v) {
        0 => tracing::Level::ERROR,
        1 => tracing::Level::WARN,
        2 => tracing::Level::INFO,
        3 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    telemetry::init(Some(verbosity_level))?;

    // Environment is consulted exactly once; everything downstream gets
    // explicit values.
    let development = policy::is_development_mode();
    let jwt_secret = resolve_secret(matches.get_one::<String>("jwt-secret").cloned(), development)?;

    let action = handler(&matches)?;

    Ok((action, GlobalArgs::new(jwt_secret, development)))
}

/// A missing, weak or short signing secret is fatal outside development.
fn resolve_secret(secret: Option<String>, development: bool) -> Result<SecretString> {
    let secret = match secret {
        Some(secret) => secret,
        None if development => {
            warn!("EXTSYNC_JWT_SECRET not set; using the built-in development secret");
            policy::DEV_FALLBACK_SECRET.to_string()
        }
        None => return Err(anyhow!("EXTSYNC_JWT_SECRET is required outside development mode")),
    };

    policy::validate_secret(&secret, development)
        .context("Refusing to start with an unsafe signing secret")?;

    Ok(SecretString::from(secret))
}
