use anyhow::Result;
use clap::Parser;
use mrcore::cmd::sequential::Args;
use mrcore::engine::{do_map, do_reduce, merge};
use mrcore::utils::{expand_inputs, PartitionLayout};
use mrcore::*;
use tracing_subscriber::EnvFilter;

/// Runs every task of the job in this process, one after another.
fn run_sequential(job: &Job, layout: &PartitionLayout, engine: Workload) -> Result<()> {
    for (map_task, file) in job.files.iter().enumerate() {
        do_map(layout, &job.name, map_task as u32, file, job.n_reduce, engine.map_fn)?;
    }
    for reduce_task in 0..job.n_reduce {
        let out = layout.result(&job.name, reduce_task);
        do_reduce(layout, &job.name, reduce_task, &out, job.n_map(), engine.reduce_fn)?;
    }
    merge(layout, &job.name, job.n_reduce, &layout.merged(&job.name))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mrcore=info")),
        )
        .init();

    let args = Args::parse();
    let engine = workload::named(&args.workload)?;
    let files = expand_inputs(&args.input)?;
    let job = Job::new(args.job, files, args.n_reduce.max(1));
    let layout = PartitionLayout::new(args.dir.unwrap_or_else(|| ".".into()));

    run_sequential(&job, &layout, engine)?;
    println!("{}", layout.merged(&job.name).display());
    Ok(())
}
