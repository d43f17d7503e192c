//! Fire-and-forget tasks that release a resource once the node shuts down.

use std::sync::{Arc, Mutex};

use metrics::counter;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{debug, warn};

/// Receives close failures that would otherwise be lost in a detached task.
pub trait CleanupErrorSink: Send + Sync {
    fn record(&self, resource: &'static str, error: String);
}

/// Default sink: logs the failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrorSink;

impl CleanupErrorSink for LogErrorSink {
    fn record(&self, resource: &'static str, error: String) {
        warn!(resource, %error, "failed to close resource on shutdown");
    }
}

/// Keeps every failure in memory so embedders can inspect them later.
#[derive(Debug, Default, Clone)]
pub struct CollectingErrorSink {
    entries: Arc<Mutex<Vec<(&'static str, String)>>>,
}

impl CollectingErrorSink {
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        self.entries
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl CleanupErrorSink for CollectingErrorSink {
    fn record(&self, resource: &'static str, error: String) {
        if let Ok(mut guard) = self.entries.lock() {
            guard.push((resource, error));
        }
    }
}

/// Waits for `shutdown`, then runs `close` once. The handle may be dropped;
/// the task keeps running detached under the caller's current dispatcher.
pub fn spawn_closer<F>(
    resource: &'static str,
    shutdown: CancellationToken,
    sink: Arc<dyn CleanupErrorSink>,
    close: F,
) -> JoinHandle<()>
where
    F: FnOnce() -> Result<(), String> + Send + 'static,
{
    let task = async move {
        shutdown.cancelled().await;
        match close() {
            Ok(()) => {
                debug!(resource, "closed on shutdown");
                counter!("provider_cleanup_total", "resource" => resource, "result" => "ok")
                    .increment(1);
            }
            Err(error) => {
                counter!("provider_cleanup_total", "resource" => resource, "result" => "error")
                    .increment(1);
                sink.record(resource, error);
            }
        }
    };
    tokio::spawn(task.with_current_subscriber())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    #[tokio::test]
    async fn closes_only_after_cancellation() {
        let token = CancellationToken::new();
        let closed = Arc::new(AtomicBool::new(false));
        let flag = closed.clone();
        let handle = spawn_closer("journal", token.clone(), Arc::new(LogErrorSink), move || {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });

        tokio::task::yield_now().await;
        assert!(!closed.load(Ordering::SeqCst));

        token.cancel();
        handle.await.expect("closer finishes");
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failures_reach_the_sink() {
        let token = CancellationToken::new();
        let sink = CollectingErrorSink::default();
        let handle = spawn_closer("journal", token.clone(), Arc::new(sink.clone()), || {
            Err("disk full".to_string())
        });

        token.cancel();
        handle.await.expect("closer finishes");
        assert_eq!(sink.entries(), vec![("journal", "disk full".to_string())]);
    }
}
