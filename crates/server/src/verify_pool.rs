//! Bounded off-reactor verification.
//!
//! Signature verification shells out and blocks. Each call runs on tokio's
//! blocking pool while holding a semaphore permit, so a handful of slow
//! verifications cannot crowd out feed listing for other clients.
//!
//! The semaphore hands out permits in request order. A listing keeps at most
//! `workers` verifications queued at once, so a large page cannot line up
//! ahead of every other client; their requests interleave with its items.

use aletheia_core::{Artifact, FeedEntry, SignatureVerifier, VerificationStatus};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Clone)]
pub struct VerifyPool {
    verifier: Arc<dyn SignatureVerifier>,
    permits: Arc<Semaphore>,
    workers: usize,
}

impl VerifyPool {
    pub fn new(verifier: Arc<dyn SignatureVerifier>, workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            verifier,
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    pub fn available_workers(&self) -> usize {
        self.permits.available_permits()
    }

    /// Verify one artifact. Never fails; infrastructure errors are `Unknown`.
    pub async fn verify(&self, artifact: PathBuf) -> VerificationStatus {
        let permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return VerificationStatus::Unknown,
        };

        let verifier = self.verifier.clone();
        let result = tokio::task::spawn_blocking(move || {
            // Held until the blocking work ends, even if the caller gave up.
            let _permit = permit;
            verifier.verify(&artifact)
        })
        .await;

        match result {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!("Verification task failed: {}", e);
                VerificationStatus::Unknown
            }
        }
    }

    /// Attach a status to every previewed artifact, keeping input order.
    ///
    /// At most `workers` verifications of this call are in flight or queued
    /// on the semaphore; the next one starts when one finishes.
    pub async fn annotate(&self, items: Vec<(Artifact, String)>) -> Vec<FeedEntry> {
        let mut pending = items
            .iter()
            .enumerate()
            .map(|(idx, (artifact, _))| (idx, artifact.path.clone()));

        let mut tasks = JoinSet::new();
        for (idx, path) in pending.by_ref().take(self.workers) {
            self.spawn_verify(&mut tasks, idx, path);
        }

        let mut statuses = vec![VerificationStatus::Unknown; items.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, status)) => statuses[idx] = status,
                Err(e) => tracing::warn!("Verification task failed: {}", e),
            }
            if let Some((idx, path)) = pending.next() {
                self.spawn_verify(&mut tasks, idx, path);
            }
        }

        items
            .into_iter()
            .zip(statuses)
            .map(|((artifact, preview), status)| FeedEntry::new(&artifact, preview, status))
            .collect()
    }

    fn spawn_verify(
        &self,
        tasks: &mut JoinSet<(usize, VerificationStatus)>,
        idx: usize,
        path: PathBuf,
    ) {
        let pool = self.clone();
        tasks.spawn(async move { (idx, pool.verify(path).await) });
    }
}
