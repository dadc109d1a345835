use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Name of the job; used to name intermediate and output files
    #[clap(short, long)]
    pub job: String,
    /// Glob spec for the input files, one map task per file
    #[clap(short, long)]
    pub input: String,
    /// Number of reduce tasks
    #[clap(short = 'r', long, default_value_t = 3)]
    pub n_reduce: u32,
    /// [OPT] Port for the master's registration service (default 50051)
    #[clap(short = 'P', long, default_value = None)]
    pub port: Option<u16>,
    /// [OPT] Directory shared with the workers for intermediate files (default ".")
    #[clap(short, long, default_value = None)]
    pub dir: Option<String>,
    /// [OPT] Milliseconds to wait before retrying a failed task (default 100)
    #[clap(long, default_value = None)]
    pub retry_delay_ms: Option<u64>,
    /// [OPT] Seconds a single task dispatch may take before it counts as failed
    #[clap(short, long, default_value = None)]
    pub timeout: Option<u64>,
    /// Ask every registered worker to exit once the job is done
    #[clap(long)]
    pub shutdown_workers: bool,
}
