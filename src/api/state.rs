//! Shared server state and request-processing configuration.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;
use url::Url;

use crate::audit::AuditLogger;
use crate::auth::rate_limit::RateLimiter;
use crate::auth::token::TokenService;
use crate::auth::UserStore;

const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
const DEFAULT_REQUEST_LIMIT: usize = 300;
const DEFAULT_REQUEST_WINDOW: Duration = Duration::from_secs(60);
const DEFAULT_LOGIN_LIMIT: usize = 5;
const DEFAULT_LOGIN_WINDOW: Duration = Duration::from_secs(15 * 60);

#[derive(Clone, Debug)]
pub struct ApiConfig {
    allowed_origins: Vec<String>,
    max_body_bytes: usize,
    request_limit: usize,
    request_window: Duration,
    login_limit: usize,
    login_window: Duration,
}

impl ApiConfig {
    /// Build a config from the dashboard origins allowed to call the API.
    ///
    /// Origins that do not parse are dropped with a warning so a single
    /// typo cannot silently widen or break the allow-list at runtime.
    #[must_use]
    pub fn new(allowed_origins: Vec<String>) -> Self {
        let allowed_origins = allowed_origins
            .into_iter()
            .filter_map(|origin| match normalize_origin(&origin) {
                Some(origin) => Some(origin),
                None => {
                    warn!("Ignoring invalid allowed origin: {origin}");
                    None
                }
            })
            .collect();

        Self {
            allowed_origins,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            request_limit: DEFAULT_REQUEST_LIMIT,
            request_window: DEFAULT_REQUEST_WINDOW,
            login_limit: DEFAULT_LOGIN_LIMIT,
            login_window: DEFAULT_LOGIN_WINDOW,
        }
    }

    #[must_use]
    pub fn with_max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }

    #[must_use]
    pub fn with_request_limit(mut self, limit: usize, window: Duration) -> Self {
        self.request_limit = limit;
        self.request_window = window;
        self
    }

    #[must_use]
    pub fn with_login_limit(mut self, limit: usize, window: Duration) -> Self {
        self.login_limit = limit;
        self.login_window = window;
        self
    }

    #[must_use]
    pub fn allowed_origins(&self) -> &[String] {
        &self.allowed_origins
    }

    #[must_use]
    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    #[must_use]
    pub fn request_limit(&self) -> usize {
        self.request_limit
    }

    #[must_use]
    pub fn request_window(&self) -> Duration {
        self.request_window
    }

    #[must_use]
    pub fn login_limit(&self) -> usize {
        self.login_limit
    }

    #[must_use]
    pub fn login_window(&self) -> Duration {
        self.login_window
    }
}

/// Everything the middleware chain and the auth routes share.
pub struct AuthState {
    tokens: TokenService,
    limiter: Arc<RateLimiter>,
    users: Arc<dyn UserStore>,
    audit: Arc<dyn AuditLogger>,
    config: ApiConfig,
}

impl AuthState {
    #[must_use]
    pub fn new(
        tokens: TokenService,
        limiter: Arc<RateLimiter>,
        users: Arc<dyn UserStore>,
        audit: Arc<dyn AuditLogger>,
        config: ApiConfig,
    ) -> Self {
        Self {
            tokens,
            limiter,
            users,
            audit,
            config,
        }
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    #[must_use]
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    #[must_use]
    pub fn users(&self) -> &dyn UserStore {
        self.users.as_ref()
    }

    #[must_use]
    pub fn audit(&self) -> &dyn AuditLogger {
        self.audit.as_ref()
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }
}

fn normalize_origin(origin: &str) -> Option<String> {
    let parsed = Url::parse(origin).ok()?;
    let host = parsed.host_str()?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    Some(format!("{}://{}{}", parsed.scheme(), host, port))
}
