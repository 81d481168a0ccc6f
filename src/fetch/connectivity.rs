// =============================================================================
// Connectivity: "is the network up?" as seen by the resilient fetcher
// =============================================================================
//
// The monitor keeps a lock-free flag that any task may query. A background
// check opens a TCP connection to a well-known host every few seconds and
// flips the flag; transitions are logged once.
// =============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Connect timeout for a single check.
const CHECK_TIMEOUT: Duration = Duration::from_secs(3);

/// Runtime connectivity report.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Connectivity flag refreshed by a TCP check.
#[derive(Debug)]
pub struct NetworkMonitor {
    online: AtomicBool,
    check_addr: String,
}

impl NetworkMonitor {
    /// Start optimistic: online until a check says otherwise.
    pub fn new(check_addr: impl Into<String>) -> Self {
        Self {
            online: AtomicBool::new(true),
            check_addr: check_addr.into(),
        }
    }

    /// Force the flag (check results and tests).
    pub fn set_online(&self, online: bool) {
        let prev = self.online.swap(online, Ordering::Relaxed);
        if prev != online {
            if online {
                info!("network connectivity restored");
            } else {
                warn!(check = %self.check_addr, "network connectivity lost, serving cached data");
            }
        }
    }

    /// One TCP connect attempt against the check address.
    pub async fn check(&self) -> bool {
        let ok = matches!(
            tokio::time::timeout(CHECK_TIMEOUT, TcpStream::connect(&self.check_addr)).await,
            Ok(Ok(_))
        );
        debug!(check = %self.check_addr, ok, "connectivity check");
        self.set_online(ok);
        ok
    }

    /// Check forever at the given cadence.
    pub async fn run_check_loop(self: Arc<Self>, every: Duration) {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            self.check().await;
        }
    }
}

impl Connectivity for NetworkMonitor {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_online_and_can_be_forced() {
        let monitor = NetworkMonitor::new("127.0.0.1:9");
        assert!(monitor.is_online());
        monitor.set_online(false);
        assert!(!monitor.is_online());
        monitor.set_online(true);
        assert!(monitor.is_online());
    }

    #[tokio::test]
    async fn check_against_local_listener_reports_online() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let monitor = NetworkMonitor::new(addr.to_string());
        monitor.set_online(false);
        assert!(monitor.check().await);
        assert!(monitor.is_online());
    }

    #[tokio::test]
    async fn check_against_closed_port_reports_offline() {
        // Bind then drop to obtain a port with nothing listening.
        let addr = {
            let l = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap()
        };
        let monitor = NetworkMonitor::new(addr.to_string());
        assert!(!monitor.check().await);
        assert!(!monitor.is_online());
    }
}
