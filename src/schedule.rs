// src/schedule.rs

//! Recurring-job scheduler with a cooperative tick loop.
//!
//! The scheduler owns its job list and is driven by the host loop; there is
//! no ambient singleton. Due jobs run sequentially to completion, so two
//! passes of the same job can never overlap and a slow job delays later-due
//! jobs in the same tick.

use std::time::Duration;

use futures::future::BoxFuture;
use tokio::time::Instant;

/// Interval of the host tick loop.
const TICK: Duration = Duration::from_secs(1);

/// A job callback producing one run of the job.
pub type JobCallback = Box<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

struct Job {
    name: String,
    every: Duration,
    next_due: Instant,
    callback: JobCallback,
}

/// Owns the recurring jobs and runs whichever are due.
#[derive(Default)]
pub struct Scheduler {
    jobs: Vec<Job>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a recurring job. The first run happens one full interval
    /// after registration.
    pub fn every(&mut self, every: Duration, name: impl Into<String>, callback: JobCallback) {
        let name = name.into();
        log::info!("Scheduled job '{name}' every {}s", every.as_secs());
        self.jobs.push(Job {
            name,
            every,
            next_due: Instant::now() + every,
            callback,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Run every due job once, sequentially. The next due time is computed
    /// from the job's completion, not its nominal slot.
    pub async fn run_pending(&mut self) {
        let now = Instant::now();
        for job in &mut self.jobs {
            if job.next_due <= now {
                log::debug!("Running job '{}'", job.name);
                (job.callback)().await;
                job.next_due = Instant::now() + job.every;
            }
        }
    }

    /// Drive the tick loop forever.
    pub async fn run(&mut self) {
        loop {
            self.run_pending().await;
            tokio::time::sleep(TICK).await;
        }
    }
}
