use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Connect to a master at the given IP address and port
    #[clap(short, long)]
    pub join: String,
    /// Address this worker serves tasks on, as the master should dial it
    #[clap(short, long)]
    pub listen: String,
    /// Name of the workload to run
    #[clap(short, long)]
    pub workload: String,
    /// [OPT] Directory shared with the master for intermediate files (default ".")
    #[clap(short, long, default_value = None)]
    pub dir: Option<String>,
}
