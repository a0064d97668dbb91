//! Typed REST clients, one per service domain
//!
//! Each client owns a [`crate::rest::RestClient`] bound to its service's
//! base URL and a [`crate::wire::WireFormat`] chosen at construction. Method
//! per operation: build the envelope from typed arguments, serialize, issue
//! the request, decode the response back into an attribute map. No
//! client-side filtering anywhere; list filters are forwarded verbatim as
//! query parameters and their semantics belong to the service.

pub mod network;
pub mod servers;
pub mod snapshots;
pub mod volumes;

pub use network::NetworkClient;
pub use servers::ServersClient;
pub use snapshots::SnapshotsClient;
pub use volumes::VolumesClient;

use crate::error::{HarnessError, Result};
use crate::wire::Attributes;
use uuid::Uuid;

/// Generated resource name: `<prefix>-<uuid8>`.
pub fn rand_name(prefix: &str) -> String {
    format!("{}-{}", prefix, &Uuid::new_v4().to_string()[..8])
}

/// Pull a required string attribute out of a decoded envelope.
pub(crate) fn require_str(attrs: &Attributes, key: &str, context: &str) -> Result<String> {
    attrs
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            HarnessError::BadBody(format!("{}: missing string attribute '{}'", context, key))
        })
}

/// Query-parameter pairs for a list call, owned so they can be built inline.
pub(crate) fn to_query(filters: &[(&str, &str)]) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
