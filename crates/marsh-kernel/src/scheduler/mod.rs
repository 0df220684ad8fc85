//! Concurrency plumbing: in-memory pipes and background jobs.
//!
//! The evaluator is a single logical thread; pipelines, `&` jobs,
//! command substitution, and process substitution run as cooperative
//! tokio tasks connected by [`pipe`]s.

mod job;
mod pipe;

pub use job::{JobId, JobManager, SharedJobs};
pub use pipe::{pipe, pipe_default, PipeReader, PipeWriter, PIPE_CAPACITY};
