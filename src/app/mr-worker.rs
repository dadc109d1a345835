use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use mrcore::cmd::worker::Args;
use mrcore::rpc::worker_server::WorkerServer;
use mrcore::utils::PartitionLayout;
use mrcore::worker::{register_with, WorkerNode};
use mrcore::workload;
use tonic::transport::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mrcore=info")),
        )
        .init();

    let args = Args::parse();
    let engine = workload::named(&args.workload)?;
    let dir = args.dir.unwrap_or_else(|| ".".into());
    let addr: SocketAddr = args
        .listen
        .parse()
        .with_context(|| format!("bad listen address {}", args.listen))?;

    let node = WorkerNode::new(PartitionLayout::new(dir), engine);
    let stop = node.shutdown_handle();
    let server = tokio::spawn(
        Server::builder()
            .add_service(WorkerServer::new(node))
            .serve_with_shutdown(addr, async move { stop.notified().await }),
    );
    info!("worker serving {} on {addr}", args.workload);

    // Only announce ourselves once the server is accepting calls.
    register_with(&args.join, &args.listen).await?;

    server.await?.context("worker server failed")?;
    info!("worker exiting");
    Ok(())
}
