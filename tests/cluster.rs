//! Runs whole jobs over real gRPC on localhost.

use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mrcore::dispatch::GrpcDispatcher;
use mrcore::engine::{do_map, do_reduce, merge};
use mrcore::master::Master;
use mrcore::registry::WorkerRegistry;
use mrcore::rpc::master_server::MasterServer;
use mrcore::rpc::worker_server::WorkerServer;
use mrcore::schedule::SchedulerConfig;
use mrcore::utils::PartitionLayout;
use mrcore::worker::{register_with, WorkerNode};
use mrcore::{workload, Job};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;

const TEXTS: [&str; 4] = [
    "the quick brown fox jumps over the lazy dog",
    "the dog barks",
    "a fox, a dog, and THE end",
    "",
];

fn write_inputs(dir: &std::path::Path) -> Vec<String> {
    TEXTS
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let path = dir.join(format!("pg-{i}.txt"));
            fs::write(&path, text).unwrap();
            path.to_string_lossy().into_owned()
        })
        .collect()
}

async fn start_worker(dir: &std::path::Path, app: &str) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let node = WorkerNode::new(PartitionLayout::new(dir), workload::named(app).unwrap());
    let stop = node.shutdown_handle();
    let handle = tokio::spawn(async move {
        Server::builder()
            .add_service(WorkerServer::new(node))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
                stop.notified().await
            })
            .await
            .unwrap();
    });
    (addr, handle)
}

async fn start_master(master: &Master<GrpcDispatcher>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let service = MasterServer::new(master.service());
    tokio::spawn(async move {
        Server::builder()
            .add_service(service)
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });
    addr
}

fn sequential_output(dir: &std::path::Path, files: &[String], app: &str, n_reduce: u32) -> String {
    let layout = PartitionLayout::new(dir);
    let engine = workload::named(app).unwrap();
    let job = Job::new("seq", files.to_vec(), n_reduce);
    for (m, file) in job.files.iter().enumerate() {
        do_map(&layout, &job.name, m as u32, file, n_reduce, engine.map_fn).unwrap();
    }
    for r in 0..n_reduce {
        let out = layout.result(&job.name, r);
        do_reduce(&layout, &job.name, r, &out, job.n_map(), engine.reduce_fn).unwrap();
    }
    let merged = layout.merged(&job.name);
    merge(&layout, &job.name, n_reduce, &merged).unwrap();
    fs::read_to_string(merged).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distributed_word_count_matches_sequential_run() {
    let dir = tempfile::tempdir().unwrap();
    let files = write_inputs(dir.path());

    let master = Master::new(
        Arc::new(WorkerRegistry::new()),
        Arc::new(GrpcDispatcher::with_timeout(Duration::from_secs(5))),
        PartitionLayout::new(dir.path()),
        SchedulerConfig {
            retry_delay: Duration::from_millis(10),
        },
    );
    let master_addr = start_master(&master).await.to_string();

    // A registered worker that is not there: every dispatch to it fails.
    let ghost = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().to_string()
    };
    register_with(&master_addr, &ghost).await.unwrap();

    let mut workers = Vec::new();
    for _ in 0..2 {
        let (addr, handle) = start_worker(dir.path(), "wc").await;
        register_with(&master_addr, &addr).await.unwrap();
        workers.push(handle);
    }

    let job = Job::new("wc", files.clone(), 3);
    let report = tokio::time::timeout(Duration::from_secs(60), master.run(&job))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.map.tasks, 4);
    assert_eq!(report.reduce.tasks, 3);
    let distributed = fs::read_to_string(&report.output).unwrap();
    assert!(distributed.starts_with("a: 2\nand: 1\nbarks: 1\nbrown: 1\ndog: 3\n"));
    assert!(distributed.contains("the: 4\n"));
    assert_eq!(distributed, sequential_output(dir.path(), &files, "wc", 3));

    assert_eq!(master.shutdown_workers().await, 2);
    for handle in workers {
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reduce_waits_for_workers_that_join_late() {
    let dir = tempfile::tempdir().unwrap();
    let files = write_inputs(dir.path());

    let master = Arc::new(Master::new(
        Arc::new(WorkerRegistry::new()),
        Arc::new(GrpcDispatcher::new()),
        PartitionLayout::new(dir.path()),
        SchedulerConfig::default(),
    ));
    let master_addr = start_master(&master).await.to_string();

    let job = Job::new("ii", files.clone(), 2);
    let run = {
        let master = Arc::clone(&master);
        tokio::spawn(async move { master.run(&job).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!run.is_finished());

    let (addr, _handle) = start_worker(dir.path(), "ii").await;
    register_with(&master_addr, &addr).await.unwrap();

    let report = tokio::time::timeout(Duration::from_secs(60), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(report.map.failed_attempts(), 0);
    let output = fs::read_to_string(&report.output).unwrap();
    assert_eq!(output, sequential_output(dir.path(), &files, "ii", 2));
    assert!(output.contains("dog: 3 "));
}
