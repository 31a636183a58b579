// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded background queue for post-turn memory work.
//!
//! Submitting never blocks the caller. When the queue is full or already
//! closed the job is dropped with a warning, so memory writes are best
//! effort and eventually consistent with the turn that produced them.
//! Each job runs under its own timeout and is independent of the request
//! that submitted it.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use recall_config::WorkerConfig;
use recall_core::error::RecallError;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::extractor::KnowledgeExtractor;
use crate::metrics;
use crate::relations::RelationStore;
use crate::store::VectorStore;
use crate::types::KnowledgeIndexOpts;

/// Source type recorded on facts extracted from live specialist turns.
const CONVERSATION_SOURCE: &str = "conversation";

/// One unit of background memory work.
#[derive(Debug, Clone)]
pub enum MemoryJob {
    IndexConversation {
        session_key: String,
        channel: String,
        chat_id: String,
        user_msg: String,
        assistant_msg: String,
    },
    ExtractAndConsolidate {
        user_msg: String,
        assistant_msg: String,
        session_key: String,
        specialist: String,
        opts: KnowledgeIndexOpts,
    },
    ExtractAndConsolidateSpecialist {
        content: String,
        question: String,
        session_key: String,
        specialist: String,
        opts: KnowledgeIndexOpts,
    },
    ExtractRelations {
        text: String,
        specialist: String,
    },
}

impl MemoryJob {
    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            MemoryJob::IndexConversation { .. } => "index_conversation",
            MemoryJob::ExtractAndConsolidate { .. } => "extract_and_consolidate",
            MemoryJob::ExtractAndConsolidateSpecialist { .. } => "extract_specialist",
            MemoryJob::ExtractRelations { .. } => "extract_relations",
        }
    }
}

/// A completed conversation turn handed over by the hosting agent.
#[derive(Debug, Clone, Default)]
pub struct TurnRecord {
    pub session_key: String,
    pub channel: String,
    pub chat_id: String,
    pub user_msg: String,
    pub assistant_msg: String,
    /// Set when the turn ran in a specialist's context.
    pub specialist: Option<String>,
}

impl TurnRecord {
    pub fn new(
        session_key: impl Into<String>,
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        user_msg: impl Into<String>,
        assistant_msg: impl Into<String>,
    ) -> Self {
        Self {
            session_key: session_key.into(),
            channel: channel.into(),
            chat_id: chat_id.into(),
            user_msg: user_msg.into(),
            assistant_msg: assistant_msg.into(),
            specialist: None,
        }
    }

    pub fn with_specialist(mut self, specialist: impl Into<String>) -> Self {
        let specialist = specialist.into();
        self.specialist = (!specialist.is_empty()).then_some(specialist);
        self
    }
}

/// Shared state every worker task needs to run jobs.
struct JobContext {
    store: Arc<VectorStore>,
    extractor: Arc<KnowledgeExtractor>,
    relations: Option<Arc<RelationStore>>,
    job_timeout: Duration,
    queued: AtomicUsize,
}

impl JobContext {
    /// Decrement the queued count, never below zero. Returns the new count.
    fn release_slot(&self) -> usize {
        let previous = self
            .queued
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| Some(n.saturating_sub(1)))
            .unwrap_or_default();
        previous.saturating_sub(1)
    }
}

/// Fixed pool of tasks draining a bounded job queue.
pub struct MemoryWorker {
    sender: StdMutex<Option<mpsc::Sender<MemoryJob>>>,
    ctx: Arc<JobContext>,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl MemoryWorker {
    /// Start `config.workers` tasks on the current runtime.
    ///
    /// Relation jobs are only queued when `relations` is attached.
    pub fn spawn(
        store: Arc<VectorStore>,
        extractor: Arc<KnowledgeExtractor>,
        relations: Option<Arc<RelationStore>>,
        config: &WorkerConfig,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let ctx = Arc::new(JobContext {
            store,
            extractor,
            relations,
            job_timeout: Duration::from_secs(config.job_timeout_secs),
            queued: AtomicUsize::new(0),
        });
        let tracker = TaskTracker::new();
        let cancel = CancellationToken::new();

        let workers = config.workers.max(1);
        for worker_id in 0..workers {
            let receiver = receiver.clone();
            let ctx = ctx.clone();
            let cancel = cancel.clone();
            tracker.spawn(async move {
                worker_loop(worker_id, receiver, ctx, cancel).await;
            });
        }
        tracker.close();

        info!(
            workers,
            capacity = config.queue_capacity,
            job_timeout_secs = config.job_timeout_secs,
            "memory worker started"
        );

        Self {
            sender: StdMutex::new(Some(sender)),
            ctx,
            tracker,
            cancel,
        }
    }

    /// Queue a job without waiting. Returns whether it was accepted.
    pub fn submit(&self, job: MemoryJob) -> bool {
        let kind = job.kind();
        let guard = match self.sender.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(sender) = guard.as_ref() else {
            warn!(kind, "memory worker is shut down, dropping job");
            metrics::record_job_dropped(kind);
            return false;
        };

        // Count before sending so a worker never decrements ahead of us.
        let queued = self.ctx.queued.fetch_add(1, Ordering::Relaxed) + 1;
        match sender.try_send(job) {
            Ok(()) => {
                metrics::set_jobs_queued(queued);
                true
            }
            Err(e) => {
                self.ctx.release_slot();
                match e {
                    mpsc::error::TrySendError::Full(_) => {
                        warn!(kind, "memory queue full, dropping job")
                    }
                    mpsc::error::TrySendError::Closed(_) => {
                        warn!(kind, "memory queue closed, dropping job")
                    }
                }
                metrics::record_job_dropped(kind);
                false
            }
        }
    }

    /// Post-response hook: index the turn and extract from it.
    ///
    /// Global turns get user-centric extraction. Specialist turns get
    /// provenance-preserving extraction scoped to the specialist, with the
    /// user message as the question. Relation extraction runs alongside
    /// when a relation store is attached.
    pub fn record_turn(&self, turn: TurnRecord) {
        self.submit(MemoryJob::IndexConversation {
            session_key: turn.session_key.clone(),
            channel: turn.channel,
            chat_id: turn.chat_id,
            user_msg: turn.user_msg.clone(),
            assistant_msg: turn.assistant_msg.clone(),
        });

        let specialist = turn.specialist.unwrap_or_default();
        if self.ctx.relations.is_some() {
            self.submit(MemoryJob::ExtractRelations {
                text: format!("{}\n{}", turn.user_msg, turn.assistant_msg),
                specialist: specialist.clone(),
            });
        }

        if specialist.is_empty() {
            self.submit(MemoryJob::ExtractAndConsolidate {
                user_msg: turn.user_msg,
                assistant_msg: turn.assistant_msg,
                session_key: turn.session_key,
                specialist,
                opts: KnowledgeIndexOpts::default(),
            });
        } else {
            let opts = KnowledgeIndexOpts {
                specialist: Some(specialist.clone()),
                source_type: Some(CONVERSATION_SOURCE.to_string()),
                ..KnowledgeIndexOpts::default()
            };
            self.submit(MemoryJob::ExtractAndConsolidateSpecialist {
                content: turn.assistant_msg,
                question: turn.user_msg,
                session_key: turn.session_key,
                specialist,
                opts,
            });
        }
    }

    /// Jobs accepted but not yet picked up by a worker.
    pub fn queued(&self) -> usize {
        self.ctx.queued.load(Ordering::Relaxed)
    }

    /// Stop accepting jobs and drain the queue.
    ///
    /// Work still running after `grace` is cancelled. Safe to call more
    /// than once.
    pub async fn shutdown(&self, grace: Duration) {
        let sender = match self.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(sender);

        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            warn!(
                grace_secs = grace.as_secs_f64(),
                remaining = self.queued(),
                "memory worker drain timed out, cancelling remaining jobs"
            );
            self.cancel.cancel();
            self.tracker.wait().await;
        }
        info!("memory worker stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<MemoryJob>>>,
    ctx: Arc<JobContext>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            job = async { receiver.lock().await.recv().await } => job,
        };
        let Some(job) = next else {
            break;
        };

        metrics::set_jobs_queued(ctx.release_slot());

        let kind = job.kind();
        let started = Instant::now();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => "cancelled",
            result = tokio::time::timeout(ctx.job_timeout, run_job(&ctx, job)) => match result {
                Ok(Ok(())) => "ok",
                Ok(Err(e)) => {
                    warn!(worker_id, kind, error = %e, "memory job failed");
                    "error"
                }
                Err(_) => {
                    warn!(worker_id, kind, timeout_secs = ctx.job_timeout.as_secs(), "memory job timed out");
                    "timeout"
                }
            },
        };
        metrics::record_job(kind, outcome, started.elapsed().as_secs_f64());
        debug!(worker_id, kind, outcome, "memory job finished");
    }
    debug!(worker_id, "memory worker exiting");
}

async fn run_job(ctx: &JobContext, job: MemoryJob) -> Result<(), RecallError> {
    match job {
        MemoryJob::IndexConversation {
            session_key,
            channel,
            chat_id,
            user_msg,
            assistant_msg,
        } => {
            ctx.store
                .index_conversation(&session_key, &channel, &chat_id, &user_msg, &assistant_msg)
                .await;
        }
        MemoryJob::ExtractAndConsolidate {
            user_msg,
            assistant_msg,
            session_key,
            specialist,
            opts,
        } => {
            ctx.extractor
                .extract_and_consolidate(&user_msg, &assistant_msg, &session_key, &specialist, &opts)
                .await;
        }
        MemoryJob::ExtractAndConsolidateSpecialist {
            content,
            question,
            session_key,
            specialist,
            opts,
        } => {
            ctx.extractor
                .extract_and_consolidate_specialist(&content, &question, &session_key, &specialist, &opts)
                .await;
        }
        MemoryJob::ExtractRelations { text, specialist } => {
            let Some(relations) = &ctx.relations else {
                debug!("no relation store attached, skipping relation extraction");
                return Ok(());
            };
            let added = ctx
                .extractor
                .extract_and_store_relations(&text, &specialist, relations)
                .await?;
            if added > 0 {
                info!(added, specialist = %specialist, "relations extracted");
            }
        }
    }
    Ok(())
}
