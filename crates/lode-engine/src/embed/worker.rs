//! Embedding job worker.
//!
//! A single cooperative loop: requeue expired leases, claim a batch of
//! pending jobs, resolve their chunks, call the provider, and write the
//! vectors. Safe to run as many independent instances — the claim step is
//! atomic (`FOR UPDATE SKIP LOCKED`) and the lease bounds the damage of a
//! crashed worker.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

use lode_core::config::JobsConfig;
use lode_core::{CodeChunk, Embedding, EmbeddingJob, Result};

use super::provider::{EmbedError, EmbeddingProvider};
use crate::store::Store;

/// Terminal error codes recorded on jobs.
const ERR_CHUNK_MISSING: &str = "chunk_missing";
const ERR_UNSUPPORTED_TARGET: &str = "unsupported_target";
const ERR_DIMS_MISMATCH: &str = "dims_mismatch";
const ERR_MAX_ATTEMPTS: &str = "max_attempts_exceeded";
const ERR_PROVIDER: &str = "provider_error";

const BACKOFF_FLOOR_SECS: i64 = 30;
const BACKOFF_CAP_SECS: i64 = 3600;

pub struct EmbeddingWorker {
    store: Store,
    provider: Arc<EmbeddingProvider>,
    config: JobsConfig,
    worker_id: String,
}

impl EmbeddingWorker {
    pub fn new(store: Store, provider: Arc<EmbeddingProvider>, config: JobsConfig) -> Self {
        Self {
            store,
            provider,
            config,
            worker_id: format!("embed-worker-{}", Uuid::new_v4()),
        }
    }

    /// Poll until shutdown. Each tick is independent and idempotent.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(self.config.poll_interval_seconds));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::warn!(worker = %self.worker_id, "embedding tick failed: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!(worker = %self.worker_id, "embedding worker stopping");
                        return;
                    }
                }
            }
        }
    }

    /// One poll: requeue stale leases, claim, process. Returns the number
    /// of jobs that reached a terminal or retried state this tick.
    pub async fn tick(&self) -> Result<usize> {
        let cutoff = Utc::now() - Duration::minutes(self.config.stale_minutes);
        let requeued = self.store.jobs.requeue_stale(cutoff).await?;
        if requeued > 0 {
            tracing::info!(requeued, "requeued stale embedding jobs");
        }

        let jobs = self
            .store
            .jobs
            .claim(&self.worker_id, self.config.batch_size)
            .await?;
        if jobs.is_empty() {
            return Ok(0);
        }

        self.process(jobs).await
    }

    async fn process(&self, jobs: Vec<EmbeddingJob>) -> Result<usize> {
        let mut handled = 0usize;
        let mut workable: Vec<(EmbeddingJob, CodeChunk)> = Vec::new();

        for job in jobs {
            if job.target_kind != "code_chunk" {
                self.store.jobs.block(job.id, ERR_UNSUPPORTED_TARGET).await?;
                handled += 1;
                continue;
            }
            match self.store.chunks.get_by_id(job.target_id).await? {
                Some(chunk) => workable.push((job, chunk)),
                None => {
                    // The chunk was replaced by a newer index run; nothing
                    // left to embed.
                    self.store
                        .jobs
                        .complete(job.id, None, Some(ERR_CHUNK_MISSING))
                        .await?;
                    handled += 1;
                }
            }
        }

        if workable.is_empty() {
            return Ok(handled);
        }

        let inputs: Vec<String> = workable.iter().map(|(_, c)| c.content.clone()).collect();
        match self.provider.embed(&inputs).await {
            Ok(vectors) if vectors.len() == workable.len() => {
                handled += self.write_vectors(&workable, vectors).await?;
            }
            Ok(_) => {
                // Disabled provider (empty result) or count mismatch.
                for (job, _) in &workable {
                    self.fail_or_retry(job, ERR_PROVIDER, "provider returned no vectors")
                        .await?;
                    handled += 1;
                }
            }
            Err(EmbedError::Fatal(msg)) if msg == ERR_DIMS_MISMATCH => {
                for (job, _) in &workable {
                    self.store.jobs.block(job.id, ERR_DIMS_MISMATCH).await?;
                    handled += 1;
                }
            }
            Err(e) => {
                tracing::warn!("embedding provider call failed: {e}");
                for (job, _) in &workable {
                    self.fail_or_retry(job, ERR_PROVIDER, &e.to_string()).await?;
                    handled += 1;
                }
            }
        }

        Ok(handled)
    }

    async fn write_vectors(
        &self,
        workable: &[(EmbeddingJob, CodeChunk)],
        vectors: Vec<Vec<f32>>,
    ) -> Result<usize> {
        let mut handled = 0usize;
        let mut rows: Vec<Embedding> = Vec::new();
        let mut completions: Vec<(Uuid, i32)> = Vec::new();

        for ((job, chunk), vector) in workable.iter().zip(vectors) {
            let dims = vector.len() as i32;
            if let Some(expected) = job.dims {
                if expected != dims {
                    self.store.jobs.block(job.id, ERR_DIMS_MISMATCH).await?;
                    handled += 1;
                    continue;
                }
            }
            rows.push(Embedding {
                id: Uuid::new_v4(),
                chunk_id: chunk.id,
                repo_id: job.repo_id,
                branch_name: job.branch_name.clone(),
                commit_sha: job.commit_sha.clone(),
                vector,
                model: job.model.clone(),
                model_version: None,
                generated_at: Utc::now(),
            });
            completions.push((job.id, dims));
        }

        self.store.embeddings.upsert_batch_pooled(&rows).await?;
        for (job_id, dims) in completions {
            self.store.jobs.complete(job_id, Some(dims), None).await?;
            handled += 1;
        }

        Ok(handled)
    }

    /// Exponential backoff with a 30s floor and 1h cap, blocking once the
    /// attempt budget is spent.
    async fn fail_or_retry(&self, job: &EmbeddingJob, code: &str, detail: &str) -> Result<()> {
        if job.attempts >= self.config.max_attempts {
            self.store.jobs.block(job.id, ERR_MAX_ATTEMPTS).await?;
            return Ok(());
        }

        let delay = backoff_seconds(job.attempts);
        let next = Utc::now() + Duration::seconds(delay);
        self.store
            .jobs
            .retry_at(job.id, next, &format!("{code}: {detail}"))
            .await
    }
}

fn backoff_seconds(attempts: i32) -> i64 {
    let exponent = (attempts.max(1) - 1).min(20) as u32;
    (BACKOFF_FLOOR_SECS.saturating_mul(1i64 << exponent)).min(BACKOFF_CAP_SECS)
}
