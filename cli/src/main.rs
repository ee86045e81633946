mod commands;
mod terminal;

use commands::{CommandLine, Commands, modules, scan};
use terminal::{logging, print};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let commands = CommandLine::parse_args();

    logging::init(commands.verbose);

    match commands.command {
        Commands::Modules => {
            print::header("available modules", 0);
            modules::list()
        }
        Commands::Scan(args) => {
            print::header("starting reconnaissance", args.quiet);
            scan::scan(args).await
        }
    }
}
