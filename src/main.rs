use clap::Parser;
use mediatidy::cli::{self, Cli};
use mediatidy::output::OutputFormatter;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = cli::run(cli) {
        OutputFormatter::error(&e);
        std::process::exit(1);
    }
}
