// =============================================================================
// Presentation API: read-only REST + WebSocket surface over AppState
// =============================================================================

pub mod rest;
pub mod ws;

pub use rest::router;
