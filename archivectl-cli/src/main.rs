#![doc = include_str!("../README.md")]

mod args;
mod cli;
mod command;
mod runner;

use std::process::ExitCode;

use clap::Parser;

fn main() -> ExitCode {
    let cli = cli::Cli::parse();
    simple_logger::SimpleLogger::new()
        .with_level(cli.global.log_level())
        .init()
        .expect("logger installs exactly once");

    let result = runner::run(cli);
    runner::report_error(&result);
    let code = runner::exit_code(&result);
    if let Ok(output) = result {
        runner::print_output(&output);
    }
    code
}
