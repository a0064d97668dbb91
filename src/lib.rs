//! stackprobe library
//!
//! Client-side plumbing for exercising an OpenStack-style cloud deployment
//! over HTTP: per-service REST clients, a bounded status poller, and a
//! fixture that creates, tracks and best-effort-cleans real resources.

pub mod clients;
pub mod config;
pub mod error;
pub mod fixture;
pub mod identity;
pub mod poll;
pub mod rest;
pub mod wire;

// Re-export commonly used types
pub use config::Config;
pub use error::{HarnessError, Result};
pub use fixture::{Fixture, ResourceHandle, ResourceKind};
pub use wire::WireFormat;
