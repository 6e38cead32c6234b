//! Live change notifications for the outbox.
//!
//! Each connected client gets its own task that rescans the outbox on a
//! fixed tick and, when a filesystem watcher is available, as soon as the
//! outbox changes. A token is emitted only when the newest artifact name
//! transitions; the name seen on the first scan is the baseline and is
//! never emitted itself.

use aletheia_core::FeedScanner;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::io;
use std::path::Path;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

/// Buffered tokens per client before the scan task waits on the client
const EVENT_BUFFER: usize = 16;

// ============================================================================
// Change detection
// ============================================================================

/// Edge detector over successive "newest artifact" observations
#[derive(Debug, Default)]
pub struct ChangeDetector {
    /// `None` until the first successful scan
    baseline: Option<Option<String>>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one scan result. Returns the name to emit, if any.
    pub fn observe(&mut self, newest: Option<String>) -> Option<String> {
        match self.baseline.replace(newest.clone()) {
            None => None,
            Some(previous) if previous == newest => None,
            Some(_) => newest,
        }
    }
}

// ============================================================================
// Filesystem notifications
// ============================================================================

/// Shared outbox watcher; bumps a generation counter on every change
pub struct OutboxWatcher {
    _watcher: RecommendedWatcher,
    generation: watch::Receiver<u64>,
}

impl OutboxWatcher {
    pub fn start(outbox: &Path) -> notify::Result<Self> {
        let (tx, generation) = watch::channel(0u64);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) if matches!(event.kind, EventKind::Access(_)) => {}
                Ok(_) => tx.send_modify(|g| *g = g.wrapping_add(1)),
                Err(e) => tracing::debug!("Outbox watch error: {}", e),
            }
        })?;
        watcher.watch(outbox, RecursiveMode::NonRecursive)?;

        Ok(Self {
            _watcher: watcher,
            generation,
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        let mut rx = self.generation.clone();
        rx.mark_unchanged();
        rx
    }
}

// ============================================================================
// Per-client stream
// ============================================================================

enum Wake {
    Tick,
    Changed,
    WatcherGone,
}

/// Start a change feed for one client.
///
/// The returned receiver yields one artifact name per transition. The
/// background task ends as soon as the receiver is dropped or `shutdown`
/// flips to `true`. Scan errors are logged and retried on the next wake-up.
pub fn spawn_change_feed(
    scanner: FeedScanner,
    interval: Duration,
    changes: Option<watch::Receiver<u64>>,
    shutdown: watch::Receiver<bool>,
) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    tokio::spawn(run_change_feed(scanner, interval, changes, shutdown, tx));
    rx
}

async fn run_change_feed(
    scanner: FeedScanner,
    interval: Duration,
    mut changes: Option<watch::Receiver<u64>>,
    mut shutdown: watch::Receiver<bool>,
    tx: mpsc::Sender<String>,
) {
    let mut detector = ChangeDetector::new();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if *shutdown.borrow() {
            break;
        }

        let wake = tokio::select! {
            _ = tx.closed() => break,
            alive = shutdown.changed() => {
                if alive.is_err() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => Wake::Tick,
            alive = next_change(&mut changes) => {
                if alive { Wake::Changed } else { Wake::WatcherGone }
            }
        };

        match wake {
            Wake::WatcherGone => {
                tracing::debug!("Outbox watcher closed, polling only");
                changes = None;
                continue;
            }
            Wake::Changed => tracing::trace!("Outbox changed, rescanning"),
            Wake::Tick => {}
        }

        match newest_name(&scanner).await {
            Ok(newest) => {
                if let Some(name) = detector.observe(newest) {
                    tracing::debug!("Newest answer is now {}", name);
                    if tx.send(name).await.is_err() {
                        break;
                    }
                }
            }
            Err(e) => tracing::debug!("Outbox scan failed, retrying: {}", e),
        }
    }

    tracing::debug!("Live event stream closed");
}

async fn next_change(changes: &mut Option<watch::Receiver<u64>>) -> bool {
    match changes {
        Some(rx) => rx.changed().await.is_ok(),
        None => std::future::pending().await,
    }
}

async fn newest_name(scanner: &FeedScanner) -> io::Result<Option<String>> {
    let scanner = scanner.clone();
    tokio::task::spawn_blocking(move || scanner.newest_name())
        .await
        .map_err(io::Error::other)?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_baseline_not_emitted() {
        let mut detector = ChangeDetector::new();
        assert_eq!(detector.observe(Some("a.answer.txt".into())), None);
        assert_eq!(detector.observe(Some("a.answer.txt".into())), None);
    }

    #[test]
    fn test_transition_emitted_once() {
        let mut detector = ChangeDetector::new();
        detector.observe(Some("a.answer.txt".into()));

        assert_eq!(
            detector.observe(Some("b.answer.txt".into())),
            Some("b.answer.txt".to_string())
        );
        assert_eq!(detector.observe(Some("b.answer.txt".into())), None);
    }

    #[test]
    fn test_empty_outbox_baseline() {
        let mut detector = ChangeDetector::new();
        assert_eq!(detector.observe(None), None);
        assert_eq!(
            detector.observe(Some("first.answer.txt".into())),
            Some("first.answer.txt".to_string())
        );

        // Emptying the outbox is recorded but not emitted
        assert_eq!(detector.observe(None), None);
        assert_eq!(
            detector.observe(Some("first.answer.txt".into())),
            Some("first.answer.txt".to_string())
        );
    }
}
