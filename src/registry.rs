//! The pool of worker addresses the scheduler hands tasks to.
//!
//! Each idle address is a single token in an unbounded channel: registering
//! or releasing a worker pushes its token, acquiring one pops it. Whoever
//! pops a token holds that worker exclusively until it is released, so a
//! worker never has two outstanding tasks.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use dashmap::DashSet;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub struct WorkerRegistry {
    idle_tx: mpsc::UnboundedSender<String>,
    idle_rx: Mutex<mpsc::UnboundedReceiver<String>>,
    /// Every address ever registered.
    known: DashSet<String>,
    /// Addresses currently handed out by `acquire`.
    held: DashSet<String>,
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerRegistry {
    pub fn new() -> Self {
        let (idle_tx, idle_rx) = mpsc::unbounded_channel();
        Self {
            idle_tx,
            idle_rx: Mutex::new(idle_rx),
            known: DashSet::new(),
            held: DashSet::new(),
        }
    }

    /// Adds a newly available worker. Never blocks.
    ///
    /// Returns `false` if the address was already registered; a repeated
    /// registration must not create a second token for the same worker.
    pub fn register(&self, addr: impl Into<String>) -> bool {
        let addr = addr.into();
        if !self.known.insert(addr.clone()) {
            debug!(worker = %addr, "ignoring duplicate registration");
            return false;
        }
        info!(worker = %addr, "worker registered");
        // The receiver lives as long as `self`, so the send cannot fail.
        let _ = self.idle_tx.send(addr);
        true
    }

    /// Waits until some worker is idle and takes it.
    ///
    /// Concurrent callers queue up fairly; each token goes to exactly one of them.
    pub async fn acquire(&self) -> Result<String> {
        let mut idle = self.idle_rx.lock().await;
        let addr = idle
            .recv()
            .await
            .ok_or_else(|| anyhow!("worker registry closed"))?;
        self.held.insert(addr.clone());
        Ok(addr)
    }

    /// Hands a worker back to the pool. Never blocks.
    ///
    /// Releasing an address that is not currently held is a no-op.
    pub fn release(&self, addr: &str) {
        if let Some(addr) = self.held.remove(addr) {
            let _ = self.idle_tx.send(addr);
        }
    }

    /// Spawns a task that registers every address arriving on `stream`.
    pub fn feed(self: &Arc<Self>, mut stream: mpsc::UnboundedReceiver<String>) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(addr) = stream.recv().await {
                registry.register(addr);
            }
        })
    }

    /// Every worker address registered so far, in no particular order.
    pub fn known(&self) -> Vec<String> {
        self.known.iter().map(|addr| addr.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}
