use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use mrcore::cmd::master::Args;
use mrcore::dispatch::GrpcDispatcher;
use mrcore::master::Master;
use mrcore::registry::WorkerRegistry;
use mrcore::rpc::master_server::MasterServer;
use mrcore::schedule::SchedulerConfig;
use mrcore::utils::{expand_inputs, PartitionLayout};
use mrcore::Job;
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
    let port: u16 = args.port.unwrap_or(50051);
    let dir = args.dir.unwrap_or_else(|| ".".into());
    let retry_delay = Duration::from_millis(args.retry_delay_ms.unwrap_or(100));
    let dispatcher = match args.timeout {
        Some(secs) => GrpcDispatcher::with_timeout(Duration::from_secs(secs)),
        None => GrpcDispatcher::new(),
    };

    let files = expand_inputs(&args.input)?;
    let job = Job::new(args.job, files, args.n_reduce);

    let master = Master::new(
        Arc::new(WorkerRegistry::new()),
        Arc::new(dispatcher),
        PartitionLayout::new(dir),
        SchedulerConfig { retry_delay },
    );

    // Port to listen to
    let addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;
    let service = MasterServer::new(master.service());
    let server = tokio::spawn(async move {
        Server::builder().add_service(service).serve(addr).await
    });
    info!("master listening on {addr}, waiting for workers");

    let report = master.run(&job).await?;
    println!(
        "{}: {} map tasks ({} retried), {} reduce tasks ({} retried) -> {}",
        job.name,
        report.map.tasks,
        report.map.failed_attempts(),
        report.reduce.tasks,
        report.reduce.failed_attempts(),
        report.output.display()
    );

    if args.shutdown_workers {
        let stopped = master.shutdown_workers().await;
        info!("{stopped} of {} workers shut down", master.registry().len());
    }

    server.abort();
    match server.await {
        Ok(result) => result.context("registration server failed")?,
        Err(err) if err.is_cancelled() => {}
        Err(err) => return Err(err.into()),
    }
    Ok(())
}
