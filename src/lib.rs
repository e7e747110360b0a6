//! quill - blog platform REST API
//!
//! The interesting part lives in [`auth`]: password login, JWT
//! sessions, TOTP two-factor with recovery codes, and the signed,
//! encrypted, time-limited tokens behind email verification and
//! password reset. [`http_server`] is thin glue over that service.

pub mod auth;
pub mod config;
pub mod http_server;
