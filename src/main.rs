use clap::Parser;
use stockfolio::cli::{Cli, run};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
