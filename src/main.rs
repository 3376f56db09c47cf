mod cli;
mod extract_cmd;
mod gage_cmd;

use std::process;

use anyhow::Result;
use clap::Parser;

use swot_input::logging;

use crate::cli::{Cli, Command};

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Extract(args) => extract_cmd::run(args),
        Command::AppendGage(args) => gage_cmd::run(args),
    }
}
