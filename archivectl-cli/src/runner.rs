use std::process::ExitCode;

use archivectl::catalog::{Catalog, CatalogError};
use archivectl::command::{self, CommandError, CommandOutput};
use archivectl::config::{RuntimeVariable, VariableKind, VariableRegistry, VariableValue};
use archivectl::stream::{NullReplicationStream, ReplicationStream};

use crate::cli::Cli;

/// The registry's defaults; a fresh process starts every variable at its
/// default and only ever changes it via an explicit `SET`.
fn default_variables() -> VariableRegistry {
    let mut registry = VariableRegistry::new();
    registry.register(RuntimeVariable::new(
        "max_workers",
        VariableKind::Integer { min: Some(1), max: Some(64) },
        VariableValue::Integer(4),
    ));
    registry.register(RuntimeVariable::new(
        "compress_type",
        VariableKind::Enum(vec!["none".into(), "gzip".into(), "zstd".into()]),
        VariableValue::String("none".into()),
    ));
    registry.register(RuntimeVariable::new(
        "fast_checkpoint",
        VariableKind::Bool,
        VariableValue::Bool(false),
    ));
    registry.register(RuntimeVariable::new(
        "worker_queue_size",
        VariableKind::Integer { min: Some(1), max: Some(4096) },
        VariableValue::Integer(256),
    ));
    registry
}

/// One error that accounts for everything that can go wrong before we have
/// a `CommandError` to classify: CLI-side argument parsing (exit code 3)
/// and catalog open failures (exit code 1).
pub enum RunError {
    Parser(String),
    Catalog(CatalogError),
    Command(CommandError),
}

impl From<CatalogError> for RunError {
    fn from(err: CatalogError) -> Self {
        RunError::Catalog(err)
    }
}

impl From<CommandError> for RunError {
    fn from(err: CommandError) -> Self {
        RunError::Command(err)
    }
}

pub fn run(cli: Cli) -> Result<CommandOutput, RunError> {
    let mut catalog = Catalog::open(&cli.global.catalog)?;
    let mut variables = default_variables();
    let mut stream = NullReplicationStream::default();

    let runtime_dir = cli.global.runtime_dir();
    let command = cli.command.into_archivectl_command(runtime_dir).map_err(RunError::Parser)?;

    if let Some(archive_name) = command.archive_name() {
        if let Ok(archive) = catalog.get_archive(archive_name) {
            if let Ok(descr) = catalog.get_catalog_connection(
                archive.id.expect("persisted archive has an id"),
                archivectl::catalog::ConnectionType::Streamer,
            ) {
                let params = command::connect_params_from_descr(&descr);
                let _ = stream.connect(&params);
            }
        }
    }

    command::dispatch(&command, &mut catalog, &mut variables, &mut stream).map_err(RunError::from)
}

/// Render a command's output to stdout; purely textual, no structured
/// machine format is part of this front end.
pub fn print_output(output: &CommandOutput) {
    match output {
        CommandOutput::Archive(descr) => {
            println!("{}", descr.name.as_deref().unwrap_or("<unnamed>"));
        }
        CommandOutput::Archives(archives) => {
            for archive in archives {
                println!("{}", archive.name.as_deref().unwrap_or("<unnamed>"));
            }
        }
        CommandOutput::BackupProfiles(profiles) => {
            for profile in profiles {
                println!("{}", profile.name.as_deref().unwrap_or("<unnamed>"));
            }
        }
        CommandOutput::RetentionPolicies(policies) => {
            for policy in policies {
                println!("{}", policy.name.as_deref().unwrap_or("<unnamed>"));
            }
        }
        CommandOutput::RetentionPolicy(policy) => {
            println!("{}", policy.name.as_deref().unwrap_or("<unnamed>"));
            for rule in &policy.rules {
                println!("  {rule:?}");
            }
        }
        CommandOutput::Unit => {}
        CommandOutput::Text(text) => println!("{text}"),
        CommandOutput::VariableValue(value) => println!("{value}"),
        CommandOutput::Variables(vars) => {
            for (name, value) in vars {
                println!("{name} = {value}");
            }
        }
        CommandOutput::Cleanup(plan) => {
            println!("{} base backup(s) marked for removal", plan.basebackups.len());
            for warning in &plan.warnings {
                println!("warning: {warning}");
            }
        }
        CommandOutput::Workers(workers) => {
            if workers.is_empty() {
                println!("no workers running");
            }
            for worker in workers {
                println!(
                    "pid {} archive {} cmd_tag {} started {}",
                    worker.pid, worker.archive_id, worker.cmd_tag, worker.started
                );
            }
        }
    }
}

/// Map a run outcome onto the exit codes documented for this front end:
/// `0` success, `1` catalog error, `2` archive error, `3` parser error,
/// `255` anything else.
pub fn exit_code(result: &Result<CommandOutput, RunError>) -> ExitCode {
    match result {
        Ok(_) => ExitCode::from(0),
        Err(RunError::Parser(_)) => ExitCode::from(3),
        Err(RunError::Catalog(_)) => ExitCode::from(1),
        Err(RunError::Command(CommandError::Catalog(_))) => ExitCode::from(1),
        Err(RunError::Command(CommandError::Archive(_))) => ExitCode::from(2),
        Err(RunError::Command(_)) => ExitCode::from(255),
    }
}

pub fn report_error(result: &Result<CommandOutput, RunError>) {
    match result {
        Ok(_) => {}
        Err(RunError::Parser(message)) => log::error!("{message}"),
        Err(RunError::Catalog(err)) => log::error!("{err}"),
        Err(RunError::Command(err)) => log::error!("{err}"),
    }
}
