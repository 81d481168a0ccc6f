// =============================================================================
// Cache Module
// =============================================================================
//
// Short-lived, timestamped storage for network payloads plus the clock
// abstraction that drives its staleness checks.

pub mod clock;
pub mod ttl_cache;

pub use ttl_cache::{TtlCache, DEFAULT_TTL};
