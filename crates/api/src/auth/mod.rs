//! Authentication primitives.
//!
//! - [`jwt`] -- JWT access-token validation (and generation for tests).

pub mod jwt;
