//! Outbound-HTTP security: URL/host/port/CIDR validation before any
//! network call leaves the executor.

pub mod url_guard;

pub use url_guard::{SecurityError, UrlGuard};
