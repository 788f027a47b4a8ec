use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use tracing::debug;

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Process-wide tally of live connection workers.
///
/// The handle is cheap to clone and safe to share across worker threads;
/// all mutation is a single atomic. It backs both the keep-alive admission
/// check and the shutdown drain wait.
#[derive(Clone, Debug, Default)]
pub struct ConnectionGauge(Arc<AtomicUsize>);

impl ConnectionGauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    /// Register one live worker. The returned guard decrements the tally
    /// when dropped, so every exit path pays it back exactly once.
    #[must_use = "dropping the guard immediately untracks the worker"]
    pub fn track(&self) -> ConnectionGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard(self.0.clone())
    }

    /// Poll until the tally reaches zero or `timeout` elapses, yielding to
    /// the runtime between polls. Returns whether the drain completed; a
    /// `false` means connections are still open and the caller is expected
    /// to proceed with a forced exit.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        let mut cnt = self.current();
        while cnt > 0 {
            if start.elapsed() > timeout {
                break;
            }
            monoio::time::sleep(DRAIN_POLL_INTERVAL).await;
            cnt = self.current();
        }
        debug!("connection drain: remaining {cnt}");
        cnt == 0
    }
}

pub struct ConnectionGuard(Arc<AtomicUsize>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_on<F: std::future::Future>(fut: F) -> F::Output {
        monoio::RuntimeBuilder::<monoio::LegacyDriver>::new()
            .enable_timer()
            .build()
            .unwrap()
            .block_on(fut)
    }

    #[test]
    fn track_and_drop_are_paired() {
        let gauge = ConnectionGauge::new();
        assert_eq!(gauge.current(), 0);
        let a = gauge.track();
        let b = gauge.track();
        assert_eq!(gauge.current(), 2);
        drop(a);
        assert_eq!(gauge.current(), 1);
        drop(b);
        assert_eq!(gauge.current(), 0);
    }

    #[test]
    fn guard_releases_on_panic() {
        let gauge = ConnectionGauge::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = gauge.track();
            panic!("dispatch blew up");
        }));
        assert!(result.is_err());
        assert_eq!(gauge.current(), 0);
    }

    #[test]
    fn drain_completes_when_last_guard_drops() {
        let gauge = ConnectionGauge::new();
        block_on(async {
            let guard = gauge.track();
            let g2 = gauge.clone();
            monoio::spawn(async move {
                monoio::time::sleep(Duration::from_millis(20)).await;
                drop(guard);
            });
            assert!(g2.wait_for_drain(Duration::from_secs(1)).await);
        });
    }

    #[test]
    fn drain_times_out_while_workers_are_live() {
        let gauge = ConnectionGauge::new();
        block_on(async {
            let _guard = gauge.track();
            assert!(!gauge.wait_for_drain(Duration::from_millis(30)).await);
            assert_eq!(gauge.current(), 1);
        });
    }
}
