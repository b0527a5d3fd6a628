//! # extsync management server
//!
//! `extsync` is the management server of the extension-sync platform:
//! workstation agents report and pull VS Code extension state, and the
//! dashboard administers profiles and users through this API.
//!
//! ## Authentication
//!
//! Requests authenticate with short-lived HMAC-signed bearer tokens issued
//! at login; sessions are kept alive with opaque refresh tokens that are
//! stored only as SHA-256 digests. Accounts come into existence through
//! single-use, time-boxed invitations.
//!
//! ## Authorization & abuse protection
//!
//! Access is controlled by a fixed role hierarchy (`viewer` < `manager` <
//! `admin`) enforced per route. Every request passes through CORS, a body
//! size cap and a per-address sliding-window rate limiter before any
//! credential is examined; login attempts are additionally throttled per
//! address and per account.

pub mod api;
pub mod audit;
pub mod auth;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
