//! Decides what to index for a repository at a commit and queues it
//!
//! [`IndexEnqueuer`] is the entry point. It resolves a plan (stored
//! configuration, a committed configuration file, or inference from the
//! repository layout) and records one queued index per job in a single
//! transaction, skipping commits that already have work recorded.

#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

mod cancel;
mod enqueuer;
pub mod inference;
mod limiter;
mod package;
mod resolver;

pub use enqueuer::{IndexEnqueuer, QueueOutcome, SweepStats};
pub use inference::{find_recognizer, infer_index_jobs, CannedStep, Recognizer, RECOGNIZERS};
pub use limiter::RateLimiter;
pub use package::infer_repository_and_revision;
pub use resolver::{IndexPlan, PlanSource};

pub use tokio_util::sync::CancellationToken;
