//! The master: accepts worker registrations and drives a job through its
//! map phase, the phase barrier, its reduce phase and the final merge.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use tonic::{Request, Response, Status};
use tracing::{info, warn};

use crate::dispatch::{Dispatcher, GrpcDispatcher};
use crate::engine::merge;
use crate::registry::WorkerRegistry;
use crate::rpc::master_server::Master as MasterRpc;
use crate::rpc::{RegisterReply, WorkerRegistration};
use crate::schedule::{PhaseReport, Scheduler, SchedulerConfig};
use crate::utils::PartitionLayout;
use crate::{Job, Phase};

/// gRPC front of the worker registry.
#[derive(Clone)]
pub struct RegistrationService {
    registry: Arc<WorkerRegistry>,
}

impl RegistrationService {
    pub fn new(registry: Arc<WorkerRegistry>) -> Self {
        Self { registry }
    }
}

#[tonic::async_trait]
impl MasterRpc for RegistrationService {
    async fn register(
        &self,
        request: Request<WorkerRegistration>,
    ) -> Result<Response<RegisterReply>, Status> {
        let address = request.into_inner().address;
        if address.is_empty() {
            return Err(Status::invalid_argument("worker address is empty"));
        }
        let accepted = self.registry.register(address);
        Ok(Response::new(RegisterReply { accepted }))
    }
}

#[derive(Debug, Clone)]
pub struct JobReport {
    pub map: PhaseReport,
    pub reduce: PhaseReport,
    /// The merged output file.
    pub output: PathBuf,
}

pub struct Master<D> {
    scheduler: Scheduler<D>,
    dispatcher: Arc<D>,
    layout: PartitionLayout,
}

impl<D: Dispatcher + 'static> Master<D> {
    pub fn new(
        registry: Arc<WorkerRegistry>,
        dispatcher: Arc<D>,
        layout: PartitionLayout,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            scheduler: Scheduler::new(registry, Arc::clone(&dispatcher), config),
            dispatcher,
            layout,
        }
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        self.scheduler.registry()
    }

    pub fn service(&self) -> RegistrationService {
        RegistrationService::new(Arc::clone(self.registry()))
    }

    /// Runs `job` to completion and merges its output into `layout.merged(job)`.
    pub async fn run(&self, job: &Job) -> Result<JobReport> {
        if job.n_reduce == 0 {
            bail!("job {} needs at least one reduce task", job.name);
        }
        info!(job = %job.name, n_map = job.n_map(), n_reduce = job.n_reduce, "starting job");

        let map = self.scheduler.run_phase(job, Phase::Map).await?;
        // Every map output exists from here on; reduce tasks may read them.
        let reduce = self.scheduler.run_phase(job, Phase::Reduce).await?;

        let output = self.layout.merged(&job.name);
        let layout = self.layout.clone();
        let (name, n_reduce, out) = (job.name.clone(), job.n_reduce, output.clone());
        tokio::task::spawn_blocking(move || merge(&layout, &name, n_reduce, &out)).await??;

        info!(
            job = %job.name,
            map_retries = map.failed_attempts(),
            reduce_retries = reduce.failed_attempts(),
            "job done"
        );
        Ok(JobReport { map, reduce, output })
    }
}

impl Master<GrpcDispatcher> {
    /// Asks every registered worker to stop. Returns how many acknowledged.
    pub async fn shutdown_workers(&self) -> usize {
        let mut stopped = 0;
        for addr in self.registry().known() {
            match self.dispatcher.shutdown(&addr).await {
                Ok(()) => stopped += 1,
                Err(err) => warn!(worker = %addr, "shutdown failed: {err:#}"),
            }
        }
        stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::run_task;
    use crate::{workload, TaskArgs};
    use std::fs;
    use std::time::Duration;

    /// Runs tasks in-process, failing the first call of every task.
    struct FlakyLocal {
        layout: PartitionLayout,
        seen: std::sync::Mutex<std::collections::HashSet<(Phase, u32)>>,
    }

    #[tonic::async_trait]
    impl Dispatcher for FlakyLocal {
        async fn invoke(&self, _addr: &str, task: &TaskArgs) -> bool {
            if self.seen.lock().unwrap().insert((task.phase, task.task_number)) {
                return false;
            }
            run_task(&self.layout, workload::named("wc").unwrap(), task).is_ok()
        }
    }

    #[tokio::test]
    async fn register_rejects_empty_and_duplicate_addresses() {
        let service = RegistrationService::new(Arc::new(WorkerRegistry::new()));
        let empty = service
            .register(Request::new(WorkerRegistration { address: String::new() }))
            .await;
        assert!(empty.is_err());

        let first = service
            .register(Request::new(WorkerRegistration { address: "w1".into() }))
            .await
            .unwrap();
        assert!(first.into_inner().accepted);
        let again = service
            .register(Request::new(WorkerRegistration { address: "w1".into() }))
            .await
            .unwrap();
        assert!(!again.into_inner().accepted);
    }

    #[tokio::test]
    async fn job_survives_a_failure_on_every_task() {
        let dir = tempfile::tempdir().unwrap();
        let layout = PartitionLayout::new(dir.path());
        let mut files = Vec::new();
        for (i, text) in ["a b a", "b c", "a"].iter().enumerate() {
            let path = dir.path().join(format!("in-{i}.txt"));
            fs::write(&path, text).unwrap();
            files.push(path.to_string_lossy().into_owned());
        }
        let registry = Arc::new(WorkerRegistry::new());
        registry.register("w1");
        registry.register("w2");
        let dispatcher = Arc::new(FlakyLocal {
            layout: layout.clone(),
            seen: Default::default(),
        });
        let master = Master::new(registry, dispatcher, layout, SchedulerConfig::default());

        let report = tokio::time::timeout(
            Duration::from_secs(10),
            master.run(&Job::new("wc", files, 2)),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(report.map.failed_attempts(), 3);
        assert_eq!(report.reduce.failed_attempts(), 2);
        assert_eq!(fs::read_to_string(report.output).unwrap(), "a: 3\nb: 2\nc: 1\n");
    }

    #[tokio::test]
    async fn zero_reduce_tasks_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let layout = PartitionLayout::new(dir.path());
        let dispatcher = Arc::new(FlakyLocal {
            layout: layout.clone(),
            seen: Default::default(),
        });
        let master = Master::new(
            Arc::new(WorkerRegistry::new()),
            dispatcher,
            layout,
            SchedulerConfig::default(),
        );
        assert!(master.run(&Job::new("wc", vec![], 0)).await.is_err());
    }
}
