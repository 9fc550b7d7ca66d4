//! # Memory Digest
//!
//! Background folding of queued memory updates into user overviews.
//!
//! Producers [`enqueue`](InMemoryUpdateQueue::enqueue) closed [`UpdateEvent`] payloads,
//! deduplicated per (user, kind, ref id). [`run_digest`] walks every user with pending
//! updates, asks an [`UpdateSummarizer`] for a digest, appends the covered items to the
//! overview through the section editor and marks them processed.

mod error;
mod queue;
mod runner;
mod summarizer;
mod update;

pub use error::{DigestError, Result};
pub use queue::{
    EnqueueOutcome, InMemoryUpdateQueue, JsonFileUpdateQueue, PendingUpdateSource,
    ProcessedUpdate,
};
pub use runner::{
    run_digest, summarize_pending_updates_for_user, DigestRunEntry, DigestRunReport,
    DigestSettings, SkipReason, UpdateSummarizerResult, DEFAULT_BATCH_LIMIT, MAX_BATCH_LIMIT,
};
pub use summarizer::{DigestItem, ExtractiveSummarizer, FollowUp, UpdateDigest, UpdateSummarizer};
pub use update::{NewUpdate, PendingUpdate, UpdateEvent, UpdateKind};
