//! Authentication extractors.
//!
//! - [`auth::AuthUser`] -- Extracts the authenticated user from a JWT Bearer token.
//! - [`auth::WsAuthUser`] -- Same, but also accepts `?token=` for WebSocket upgrades.

pub mod auth;
