//! Issuing a single task to a single worker.

use std::time::Duration;

use anyhow::{Context, Result};
use tonic::transport::Endpoint;
use tracing::{debug, warn};

use crate::rpc::worker_client::WorkerClient;
use crate::rpc::{DoTaskArgs, Empty};
use crate::TaskArgs;

/// Runs one task on one worker and reports whether it succeeded.
///
/// Implementations never retry and never touch the worker registry; both are
/// the scheduler's business. Every failure (unreachable worker, timeout, task
/// error on the worker) collapses into `false`.
#[tonic::async_trait]
pub trait Dispatcher: Send + Sync {
    async fn invoke(&self, addr: &str, task: &TaskArgs) -> bool;
}

/// Dispatches tasks over the `Worker.DoTask` gRPC call.
#[derive(Debug, Clone, Default)]
pub struct GrpcDispatcher {
    timeout: Option<Duration>,
}

impl GrpcDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds connection setup and each call by `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }

    async fn connect(&self, addr: &str) -> Result<WorkerClient<tonic::transport::Channel>> {
        let mut endpoint = Endpoint::from_shared(format!("http://{addr}"))
            .with_context(|| format!("bad worker address {addr}"))?;
        if let Some(timeout) = self.timeout {
            endpoint = endpoint.connect_timeout(timeout).timeout(timeout);
        }
        let channel = endpoint
            .connect()
            .await
            .with_context(|| format!("failed to connect to worker {addr}"))?;
        Ok(WorkerClient::new(channel))
    }

    async fn call(&self, addr: &str, task: &TaskArgs) -> Result<()> {
        let mut client = self.connect(addr).await?;
        client
            .do_task(DoTaskArgs::from(task))
            .await
            .with_context(|| format!("DoTask failed on worker {addr}"))?;
        Ok(())
    }

    /// Asks the worker at `addr` to stop serving.
    pub async fn shutdown(&self, addr: &str) -> Result<()> {
        let mut client = self.connect(addr).await?;
        client
            .shutdown(Empty {})
            .await
            .with_context(|| format!("Shutdown failed on worker {addr}"))?;
        Ok(())
    }
}

#[tonic::async_trait]
impl Dispatcher for GrpcDispatcher {
    async fn invoke(&self, addr: &str, task: &TaskArgs) -> bool {
        match self.call(addr, task).await {
            Ok(()) => {
                debug!(worker = addr, phase = %task.phase, task = task.task_number, "task done");
                true
            }
            Err(err) => {
                warn!(worker = addr, phase = %task.phase, task = task.task_number, "dispatch failed: {err:#}");
                false
            }
        }
    }
}
