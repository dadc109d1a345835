use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Name of the job; used to name intermediate and output files
    #[clap(short, long)]
    pub job: String,
    /// Glob spec for the input files
    #[clap(short, long)]
    pub input: String,
    /// Name of the workload
    #[clap(short, long)]
    pub workload: String,
    /// Number of reduce tasks
    #[clap(short = 'r', long, default_value_t = 3)]
    pub n_reduce: u32,
    /// [OPT] Directory for intermediate and output files (default ".")
    #[clap(short, long, default_value = None)]
    pub dir: Option<String>,
}
