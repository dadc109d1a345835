//! Running every task of one phase to completion.
//!
//! Each task index gets its own tokio task that loops: acquire a worker,
//! dispatch, release the worker. A failed attempt sends the same index back
//! to the top of the loop, so the phase only finishes once every index has
//! actually succeeded. How many tasks make progress at once is bounded by how
//! many workers are idle, not by how many loops were spawned.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::dispatch::Dispatcher;
use crate::registry::WorkerRegistry;
use crate::{Job, Phase, TaskArgs};

#[derive(Debug, Clone, Default)]
pub struct SchedulerConfig {
    /// Pause before retrying a task index whose last attempt failed.
    pub retry_delay: Duration,
}

/// Summary of a completed phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseReport {
    pub phase: Phase,
    pub tasks: u32,
    /// Dispatch attempts across all tasks, failed ones included.
    pub attempts: u32,
}

impl PhaseReport {
    pub fn failed_attempts(&self) -> u32 {
        self.attempts - self.tasks
    }
}

pub struct Scheduler<D> {
    registry: Arc<WorkerRegistry>,
    dispatcher: Arc<D>,
    config: SchedulerConfig,
}

impl<D: Dispatcher + 'static> Scheduler<D> {
    pub fn new(registry: Arc<WorkerRegistry>, dispatcher: Arc<D>, config: SchedulerConfig) -> Self {
        Self {
            registry,
            dispatcher,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    /// Runs every task of `phase` and returns once all of them have succeeded.
    ///
    /// Blocks for as long as it takes: there is no task timeout, and a phase
    /// with no worker ever registered never returns.
    pub async fn run_phase(&self, job: &Job, phase: Phase) -> Result<PhaseReport> {
        let (ntasks, n_other) = job.tasks(phase);
        info!(job = %job.name, %phase, ntasks, n_other, "schedule: starting phase");

        let mut tasks = JoinSet::new();
        for index in 0..ntasks {
            let args = job.task_args(phase, index);
            let registry = Arc::clone(&self.registry);
            let dispatcher = Arc::clone(&self.dispatcher);
            let retry_delay = self.config.retry_delay;
            tasks.spawn(run_task(registry, dispatcher, args, retry_delay));
        }

        let mut done = HashSet::with_capacity(ntasks as usize);
        let mut attempts = 0;
        while let Some(joined) = tasks.join_next().await {
            let (index, tries) = joined.context("task loop panicked")??;
            if !done.insert(index) {
                bail!("{phase} task {index} reported success twice");
            }
            attempts += tries;
        }
        if done.len() != ntasks as usize {
            bail!("{phase} finished {} of {ntasks} tasks", done.len());
        }

        info!(job = %job.name, %phase, attempts, "schedule: phase done");
        Ok(PhaseReport {
            phase,
            tasks: ntasks,
            attempts,
        })
    }
}

/// Retries one task index until some worker completes it.
///
/// Returns the index and how many attempts it took.
async fn run_task<D: Dispatcher>(
    registry: Arc<WorkerRegistry>,
    dispatcher: Arc<D>,
    args: TaskArgs,
    retry_delay: Duration,
) -> Result<(u32, u32)> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let worker = registry.acquire().await?;
        debug!(worker = %worker, phase = %args.phase, task = args.task_number, attempt, "dispatching");
        let ok = dispatcher.invoke(&worker, &args).await;
        // A failed call may be the task's fault rather than the worker's, so
        // the worker goes back into the pool either way.
        registry.release(&worker);
        if ok {
            return Ok((args.task_number, attempt));
        }
        warn!(worker = %worker, phase = %args.phase, task = args.task_number, attempt, "task failed, rescheduling");
        if !retry_delay.is_zero() {
            tokio::time::sleep(retry_delay).await;
        }
    }
}
