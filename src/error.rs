// =============================================================================
// Error taxonomy for the signal pipeline
// =============================================================================
//
// Adapters (HTTP price source, advisory client) speak `anyhow`. Once a failure
// crosses into the pipeline it is either absorbed by a fallback or turned
// into one of the typed errors below.
//
//   Offline         : no connectivity and no cache   => DataUnavailable(Offline)
//   UpstreamFailure : bad status / timeout / parse   => cache fallback, else
//                                                        DataUnavailable(Upstream)
//   MalformedAdvisory: never an error; treated as "no advisory"
// =============================================================================

use thiserror::Error;

/// Why no data could be produced for a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnavailableReason {
    /// Runtime reported no connectivity and nothing was cached.
    Offline,
    /// The upstream call failed and nothing was cached.
    Upstream(String),
}

impl std::fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Offline => write!(f, "offline with no cached copy"),
            Self::Upstream(cause) => write!(f, "upstream failed with no cached copy ({cause})"),
        }
    }
}

/// Terminal failure of a resilient fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("data unavailable for '{key}': {reason}")]
    DataUnavailable {
        key: String,
        reason: UnavailableReason,
    },
}

impl FetchError {
    pub fn is_offline(&self) -> bool {
        matches!(
            self,
            Self::DataUnavailable {
                reason: UnavailableReason::Offline,
                ..
            }
        )
    }
}

/// Failure of one asset's signal pipeline. Never aborts other assets.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("price history for '{asset_id}' is empty")]
    EmptySeries { asset_id: String },

    #[error("no usable price for '{asset_id}'")]
    NoPrice { asset_id: String },

    #[error("signal task for '{asset_id}' did not complete: {message}")]
    TaskFailed { asset_id: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_unavailable_messages() {
        let offline = FetchError::DataUnavailable {
            key: "snapshot".into(),
            reason: UnavailableReason::Offline,
        };
        assert!(offline.is_offline());
        assert_eq!(
            offline.to_string(),
            "data unavailable for 'snapshot': offline with no cached copy"
        );

        let upstream = FetchError::DataUnavailable {
            key: "history:btc".into(),
            reason: UnavailableReason::Upstream("HTTP 503".into()),
        };
        assert!(!upstream.is_offline());
        assert!(upstream.to_string().contains("HTTP 503"));
    }

    #[test]
    fn pipeline_error_wraps_fetch_error_transparently() {
        let inner = FetchError::DataUnavailable {
            key: "k".into(),
            reason: UnavailableReason::Offline,
        };
        let err: PipelineError = inner.clone().into();
        assert_eq!(err.to_string(), inner.to_string());
    }
}
