//! Trait abstractions for injectable dependencies.
//!
//! The only seam this crate needs is the HTTP transport: everything above it
//! (token handling, retry policy, polling) is pure logic that tests drive
//! through a mock transport.

pub mod http;

pub use http::{Headers, HttpClient, HttpError, Response};
