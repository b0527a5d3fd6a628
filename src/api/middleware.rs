//! Request-processing chain: CORS, body-size cap, per-IP throttling,
//! authentication and role authorization.
//!
//! Ordering is significant. CORS and the body cap apply before any auth
//! decision so cross-origin and oversized requests are turned away
//! cheaply, and the per-IP throttle runs before token parsing so
//! credential probing is slowed down even with garbage tokens.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Extension, Request},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use super::handlers::error_response;
use super::state::AuthState;
use crate::auth::{roles, User};

const ALLOWED_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
const ALLOWED_HEADERS: &str = "Authorization, Content-Type";
/// Browsers may cache preflight results for a day.
const PREFLIGHT_MAX_AGE: &str = "86400";

/// Authenticated user attached to the request by [`require_auth`].
///
/// Request extensions are keyed by type, so no other crate can collide
/// with or overwrite this value.
#[derive(Clone, Debug)]
pub struct CurrentUser(pub Arc<User>);

/// Cross-origin policy for browser clients.
///
/// Every response carries `Vary: Origin`. Requests from origins outside
/// the allow-list pass through untouched, preflights included; allowed
/// preflights are answered with 204 without reaching the inner handler.
pub async fn cors(
    Extension(state): Extension<Arc<AuthState>>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let allowed = origin.as_deref().is_some_and(|origin| {
        state
            .config()
            .allowed_origins()
            .iter()
            .any(|candidate| candidate == origin)
    });
    let preflight = request.method() == Method::OPTIONS;

    let mut response = if allowed && preflight {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    headers.insert(header::VARY, HeaderValue::from_static("Origin"));
    if allowed {
        if let Some(value) = origin.as_deref().and_then(|o| HeaderValue::from_str(o).ok()) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
        if preflight {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static(ALLOWED_METHODS),
            );
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static(ALLOWED_HEADERS),
            );
            headers.insert(
                header::ACCESS_CONTROL_MAX_AGE,
                HeaderValue::from_static(PREFLIGHT_MAX_AGE),
            );
        }
    }

    response
}

/// Rewrite body-cap rejections into the standard JSON error shape.
///
/// The cap itself is enforced by [`axum::extract::DefaultBodyLimit`] on
/// the router; handlers hit it as soon as they read past the limit.
pub async fn body_limit(
    Extension(state): Extension<Arc<AuthState>>,
    request: Request,
    next: Next,
) -> Response {
    let max = state.config().max_body_bytes();
    let response = next.run(request).await;
    if response.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            &format!("request body exceeds the {max} byte limit"),
        );
    }
    response
}

/// Per-address request throttle, applied before authentication.
pub async fn rate_limit(
    Extension(state): Extension<Arc<AuthState>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_ip(&request);
    let window = state.config().request_window();

    if state
        .limiter()
        .check_limit(&ip, state.config().request_limit(), window)
        .is_err()
    {
        debug!("Throttling requests from {ip}");
        let mut response = error_response(StatusCode::TOO_MANY_REQUESTS, "too many requests");
        if let Ok(value) = HeaderValue::from_str(&window.as_secs().to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        return response;
    }

    next.run(request).await
}

/// Bearer-token authentication gate.
///
/// On success the resolved user is attached to the request as
/// [`CurrentUser`]. Every failure mode gets the same 401 body; the actual
/// cause only reaches the server log.
pub async fn require_auth(
    Extension(state): Extension<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let user = match authenticate(&state, request.headers()).await {
        Ok(user) => user,
        Err(reason) => {
            debug!("Authentication rejected: {reason}");
            return error_response(StatusCode::UNAUTHORIZED, "authentication required");
        }
    };

    request.extensions_mut().insert(CurrentUser(Arc::new(user)));
    next.run(request).await
}

/// Minimum-role gate; expects [`require_auth`] to have run already.
pub async fn require_role(minimum: &'static str, request: Request, next: Next) -> Response {
    let authorized = request
        .extensions()
        .get::<CurrentUser>()
        .is_some_and(|current| roles::role_at_least(&current.0.role, minimum));

    if !authorized {
        return error_response(StatusCode::FORBIDDEN, "insufficient permissions");
    }

    next.run(request).await
}

async fn authenticate(state: &AuthState, headers: &HeaderMap) -> Result<User, String> {
    let token = bearer_token(headers).ok_or_else(|| "missing bearer token".to_string())?;
    let claims = state
        .tokens()
        .validate_access_token(token)
        .map_err(|err| format!("token validation failed: {err}"))?;

    let user = state
        .users()
        .user_by_id(&claims.user_id)
        .await
        .map_err(|err| format!("user lookup failed: {err}"))?
        .ok_or_else(|| format!("no user for subject {}", claims.user_id))?;

    if !user.active {
        return Err(format!("user {} is deactivated", user.id));
    }

    Ok(user)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Client address for throttling.
///
/// Precedence: first `X-Forwarded-For` entry, then `X-Real-IP`, then the
/// connection's remote address with the port stripped.
pub(crate) fn client_ip(request: &Request) -> String {
    let headers = request.headers();

    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        return forwarded.to_string();
    }

    if let Some(real_ip) = headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        return real_ip.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |info| info.0.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with_headers(pairs: &[(&str, &str)]) -> Request {
        let mut builder = Request::builder().uri("/");
        for (name, value) in pairs {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).expect("request")
    }

    #[test]
    fn client_ip_prefers_forwarded_for() {
        let request = request_with_headers(&[
            ("x-forwarded-for", "1.2.3.4, 5.6.7.8"),
            ("x-real-ip", "9.9.9.9"),
        ]);
        assert_eq!(client_ip(&request), "1.2.3.4");
    }

    #[test]
    fn client_ip_falls_back_to_real_ip() {
        let request = request_with_headers(&[("x-real-ip", "9.9.9.9")]);
        assert_eq!(client_ip(&request), "9.9.9.9");
    }

    #[test]
    fn client_ip_uses_connection_address_last() {
        let mut request = request_with_headers(&[]);
        let addr: SocketAddr = "[2001:db8::1]:443".parse().expect("socket addr");
        request.extensions_mut().insert(ConnectInfo(addr));

        // Port and brackets are gone; only the address remains.
        assert_eq!(client_ip(&request), "2001:db8::1");
    }

    #[test]
    fn client_ip_without_any_source() {
        let request = request_with_headers(&[]);
        assert_eq!(client_ip(&request), "unknown");
    }

    #[test]
    fn bearer_token_requires_scheme_and_value() {
        let headers = |value: &str| {
            let mut map = HeaderMap::new();
            map.insert(
                header::AUTHORIZATION,
                HeaderValue::from_str(value).expect("header value"),
            );
            map
        };

        assert_eq!(bearer_token(&headers("Bearer abc.def.ghi")), Some("abc.def.ghi"));
        assert_eq!(bearer_token(&headers("Bearer ")), None);
        assert_eq!(bearer_token(&headers("Basic abc")), None);
        assert_eq!(bearer_token(&headers("abc.def.ghi")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }
}
