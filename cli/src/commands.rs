pub mod modules;
pub mod scan;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "sondr")]
#[command(about = "A reconnaissance orchestration engine.")]
pub struct CommandLine {
    /// Log engine internals (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the probing modules against one or more targets
    #[command(alias = "s")]
    Scan(ScanArgs),
    /// List the built-in probing modules
    #[command(alias = "m")]
    Modules,
}

#[derive(Args)]
pub struct ScanArgs {
    /// Hostnames, IP addresses, ranges or CIDR blocks
    #[arg(required = true)]
    pub targets: Vec<String>,

    /// Max work units running at once
    #[arg(long, default_value_t = 64)]
    pub concurrency: usize,

    /// Retry budget for transient failures
    #[arg(long, default_value_t = 2)]
    pub max_retries: u32,

    /// Sustained executions per second, applied to every module
    #[arg(long)]
    pub rate: Option<f64>,

    /// Executions that may start back-to-back before pacing kicks in
    #[arg(long, default_value_t = 5)]
    pub burst: u32,

    /// Largest host count one range may expand to
    #[arg(long, default_value_t = 4096)]
    pub range_ceiling: u64,

    /// Drop network/broadcast addresses from expanded ranges
    #[arg(long)]
    pub strip_edges: bool,

    /// Ports for the tcp-ports module (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub ports: Vec<u16>,

    /// Disable the interactive 'q' cancel key
    #[arg(long)]
    pub no_input: bool,

    /// Reduce output (-q hosts only, -qq summary only)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub quiet: u8,
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
