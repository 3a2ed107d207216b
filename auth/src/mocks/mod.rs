//! Mock collaborators for testing.
//!
//! In-memory, scriptable implementations of the provider traits for unit
//! and integration tests. Every mock is cheap to clone; clones share their
//! script and call record.

pub mod endpoints;
pub mod log;
pub mod sign_in;

pub use endpoints::{EndpointCall, MockWopiEndpoints};
pub use log::RecordingLog;
pub use sign_in::MockSignInSurface;
