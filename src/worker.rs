//! The worker side of the `Worker` gRPC service.
//!
//! A worker runs whatever task the master sends it, one at a time, on a
//! blocking thread, and answers the call only once the task's output is on disk.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Notify;
use tonic::{Request, Response, Status};
use tracing::{info, warn};

use crate::engine::{do_map, do_reduce};
use crate::rpc::master_client::MasterClient;
use crate::rpc::worker_server::Worker;
use crate::rpc::{DoTaskArgs, Empty, WorkerRegistration};
use crate::utils::PartitionLayout;
use crate::{Phase, TaskArgs, Workload};

pub struct WorkerNode {
    layout: PartitionLayout,
    workload: Workload,
    busy: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
}

impl WorkerNode {
    pub fn new(layout: PartitionLayout, workload: Workload) -> Self {
        Self {
            layout,
            workload,
            busy: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Resolves once the master has asked this worker to stop.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }
}

/// Runs one task to completion on the calling thread.
pub fn run_task(layout: &PartitionLayout, workload: Workload, task: &TaskArgs) -> Result<()> {
    match task.phase {
        Phase::Map => do_map(
            layout,
            &task.job_name,
            task.task_number,
            &task.file,
            task.num_other_phase,
            workload.map_fn,
        ),
        Phase::Reduce => do_reduce(
            layout,
            &task.job_name,
            task.task_number,
            &layout.result(&task.job_name, task.task_number),
            task.num_other_phase,
            workload.reduce_fn,
        ),
    }
}

/// Clears the busy flag however the task ends.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[tonic::async_trait]
impl Worker for WorkerNode {
    async fn do_task(&self, request: Request<DoTaskArgs>) -> Result<Response<Empty>, Status> {
        let task = TaskArgs::try_from(request.into_inner())
            .map_err(|e| Status::invalid_argument(e.to_string()))?;

        if self
            .busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            warn!(phase = %task.phase, task = task.task_number, "refusing concurrent task");
            return Err(Status::resource_exhausted("worker is already running a task"));
        }
        let guard = BusyGuard(Arc::clone(&self.busy));

        info!(job = %task.job_name, phase = %task.phase, task = task.task_number, "starting task");
        let layout = self.layout.clone();
        let workload = self.workload;
        let outcome = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let result = run_task(&layout, workload, &task);
            (task, result)
        })
        .await;

        match outcome {
            Ok((task, Ok(()))) => {
                info!(job = %task.job_name, phase = %task.phase, task = task.task_number, "finished task");
                Ok(Response::new(Empty {}))
            }
            Ok((task, Err(err))) => {
                warn!(job = %task.job_name, phase = %task.phase, task = task.task_number, "task failed: {err:#}");
                Err(Status::internal(format!("{err:#}")))
            }
            Err(err) => Err(Status::internal(format!("task panicked: {err}"))),
        }
    }

    async fn shutdown(&self, _request: Request<Empty>) -> Result<Response<Empty>, Status> {
        info!("shutdown requested by master");
        self.shutdown.notify_one();
        Ok(Response::new(Empty {}))
    }
}

/// Announces `own_addr` to the master at `master_addr`.
pub async fn register_with(master_addr: &str, own_addr: &str) -> Result<()> {
    let mut client = MasterClient::connect(format!("http://{master_addr}"))
        .await
        .with_context(|| format!("failed to connect to master {master_addr}"))?;
    client
        .register(WorkerRegistration {
            address: own_addr.to_string(),
        })
        .await
        .context("registration rejected")?;
    info!(master = master_addr, worker = own_addr, "registered with master");
    Ok(())
}
