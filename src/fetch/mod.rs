// =============================================================================
// Fetch Module
// =============================================================================
//
// Network reads that survive flaky connectivity: a connectivity monitor and
// a fetcher that falls back to the TTL cache.

pub mod connectivity;
pub mod resilient;

pub use connectivity::{Connectivity, NetworkMonitor};
pub use resilient::{ResilientFetcher, DEFAULT_FETCH_TIMEOUT};
