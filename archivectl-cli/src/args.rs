use std::path::PathBuf;

/// Options every subcommand needs: where the catalog lives, and how
/// chatty to be.
#[derive(clap::Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Path to the catalog database. Created on first use of a command
    /// that needs one.
    #[clap(long, short = 'c', global = true, env = "ARCHIVECTL_CATALOG")]
    pub catalog: PathBuf,

    /// Directory holding the launcher's shared-memory segment and command
    /// queue. Defaults to a sibling of the catalog file.
    #[clap(long, global = true, env = "ARCHIVECTL_RUNTIME_DIR")]
    pub runtime_dir: Option<PathBuf>,

    /// Increase logging verbosity; repeat for more (`-v`, `-vv`, `-vvv`).
    #[clap(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl GlobalArgs {
    #[must_use]
    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }

    #[must_use]
    pub fn runtime_dir(&self) -> PathBuf {
        self.runtime_dir.clone().unwrap_or_else(|| self.catalog.with_extension("run"))
    }
}

/// A DSN or discrete host/port/user/dbname fields for a streaming
/// connection, matching `archivectl::catalog::ConnectionDescr`.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// A full libpq connection string. Mutually exclusive with the
    /// discrete --host/--port/--user/--dbname flags.
    #[clap(long)]
    pub dsn: Option<String>,

    #[clap(long)]
    pub host: Option<String>,

    #[clap(long)]
    pub port: Option<u16>,

    #[clap(long)]
    pub user: Option<String>,

    #[clap(long)]
    pub dbname: Option<String>,
}
