use crate::args::GlobalArgs;
use crate::command::TopCommand;

/// `archivectl` is a one-shot front end: each invocation opens the catalog,
/// runs exactly one command, and exits.
#[derive(clap::Parser, Debug)]
#[command(name = "archivectl", version, about)]
pub struct Cli {
    #[clap(flatten)]
    pub global: GlobalArgs,

    #[clap(subcommand)]
    pub command: TopCommand,
}
