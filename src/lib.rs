//! pronounce-proxy - request-signing and session-authentication proxy for
//! pronunciation practice.
//!
//! The browser never sees vendor secrets. It talks to a small fixed HTTP
//! contract, and this crate provides:
//! - Vendor credential handling with a cached OAuth token
//! - HMAC-SHA256 request signing for signed HTTP and WebSocket upgrades
//! - A deadline-bound WebSocket evaluation session
//! - Normalized `{error, code}` failures at the HTTP boundary

pub mod audio;
pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod server;
pub mod session;
pub mod signing;
pub mod utils;
pub mod vendor;

pub use config::Config;
pub use error::{ErrorKind, ProxyError};
