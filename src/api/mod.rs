//! ANIO cloud API surface.
//!
//! This module provides the HTTP-facing half of the crate:
//! - [`auth`]: token ownership, login/refresh/logout
//! - [`gateway`]: single-request retry/backoff and error classification
//! - [`client`]: the typed endpoint surface
//! - [`models`]: wire models
//! - [`error`]: the error taxonomy

pub mod auth;
pub mod client;
pub mod error;
pub mod gateway;
pub mod models;

pub use auth::{LoginOutcome, TokenListener, TokenManager, TokenPair};
pub use client::AnioApiClient;
pub use error::ApiError;
