//! Background job bookkeeping.
//!
//! Commands suffixed with `&` run as tokio tasks. The manager hands out
//! the ids that back `$!` and lets `wait` join one job or all of them.
//! There is no OS process group here; ids are virtual.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

/// Identifier of a background job; doubles as the value of `$!`.
pub type JobId = u64;

struct Job {
    command: String,
    handle: Option<JoinHandle<u8>>,
    status: Option<u8>,
}

/// Registry of running and finished background jobs.
pub struct JobManager {
    jobs: Mutex<HashMap<JobId, Job>>,
    next_id: AtomicU64,
}

impl JobManager {
    pub fn new() -> Self {
        Self { jobs: Mutex::new(HashMap::new()), next_id: AtomicU64::new(1) }
    }

    /// Register a spawned task and return its job id.
    pub fn register(&self, command: String, handle: JoinHandle<u8>) -> JobId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.jobs
            .lock()
            .expect("job table lock")
            .insert(id, Job { command, handle: Some(handle), status: None });
        id
    }

    /// Wait for one job; `None` when the id is unknown.
    ///
    /// Waiting twice for the same job returns its cached status.
    pub async fn wait(&self, id: JobId) -> Option<u8> {
        let handle = {
            let mut jobs = self.jobs.lock().expect("job table lock");
            let job = jobs.get_mut(&id)?;
            match job.handle.take() {
                Some(h) => h,
                None => return job.status,
            }
        };
        let status = match handle.await {
            Ok(status) => status,
            Err(err) => {
                tracing::warn!("background job {} failed to join: {}", id, err);
                1
            }
        };
        if let Some(job) = self.jobs.lock().expect("job table lock").get_mut(&id) {
            job.status = Some(status);
        }
        Some(status)
    }

    /// Wait for every registered job.
    pub async fn wait_all(&self) {
        loop {
            let pending: Vec<JobId> = {
                let jobs = self.jobs.lock().expect("job table lock");
                jobs.iter()
                    .filter(|(_, j)| j.handle.is_some())
                    .map(|(id, _)| *id)
                    .collect()
            };
            if pending.is_empty() {
                return;
            }
            for id in pending {
                self.wait(id).await;
            }
        }
    }

    /// Abort every still-running job (cancellation teardown).
    pub fn abort_all(&self) {
        let jobs = self.jobs.lock().expect("job table lock");
        for job in jobs.values() {
            if let Some(handle) = &job.handle {
                handle.abort();
            }
        }
    }

    /// The command line a job was started with, for diagnostics.
    pub fn command_of(&self, id: JobId) -> Option<String> {
        self.jobs
            .lock()
            .expect("job table lock")
            .get(&id)
            .map(|j| j.command.clone())
    }
}

impl Default for JobManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for JobManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.jobs.lock().map(|j| j.len()).unwrap_or(0);
        f.debug_struct("JobManager").field("jobs", &count).finish()
    }
}

/// Shared handle used by the interpreter and its subshell copies.
pub type SharedJobs = Arc<JobManager>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_and_wait() {
        let jobs = JobManager::new();
        let id = jobs.register("sleepy".into(), tokio::spawn(async { 7u8 }));
        assert_eq!(jobs.wait(id).await, Some(7));
        // Second wait sees the cached status.
        assert_eq!(jobs.wait(id).await, Some(7));
    }

    #[tokio::test]
    async fn unknown_id() {
        let jobs = JobManager::new();
        assert_eq!(jobs.wait(42).await, None);
    }

    #[tokio::test]
    async fn wait_all_drains() {
        let jobs = JobManager::new();
        for i in 0..5u8 {
            jobs.register(format!("job{i}"), tokio::spawn(async move { i }));
        }
        jobs.wait_all().await;
        // All joined: further wait_all returns immediately.
        jobs.wait_all().await;
    }

    #[tokio::test]
    async fn ids_are_unique_and_increasing() {
        let jobs = JobManager::new();
        let a = jobs.register("a".into(), tokio::spawn(async { 0u8 }));
        let b = jobs.register("b".into(), tokio::spawn(async { 0u8 }));
        assert!(b > a);
        assert_eq!(jobs.command_of(a).as_deref(), Some("a"));
    }
}
