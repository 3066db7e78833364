//! `command::Command` is the abstract syntax a parser builds: one variant
//! per recognised grammar tag, carrying already-typed fields rather than
//! operator strings. This module is not a parser — nothing here tokenizes
//! input — it is the dispatch boundary between whatever builds a `Command`
//! (a REPL, a one-shot CLI invocation) and the catalog/archive/supervisor
//! engine underneath.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::archive::segment;
use crate::archive::{ArchiveDir, ArchiveError};
use crate::catalog::retention::{self, RetentionError};
use crate::catalog::{
    ArchiveDescr, BackupProfileDescr, BaseBackupDescr, Catalog, CatalogError, CleanupDescriptor,
    ConnectionDescr, ConnectionType, PinSelector, RetentionPolicyDescr, TimelineCutoff,
};
use crate::config::{ConfigError, VariableRegistry, VariableValue};
use crate::stream::{ConnectParams, ReplicationStream, StreamError};
use crate::supervisor::{self, Launcher, LauncherError, LoopAction, WorkerEntry, WorkerShm};
use crate::xlog::Timeline;

/// A plain tag identifying what kind of work a `Command` performs,
/// carried into worker slots (`supervisor::shm::WorkerEntry::cmd_tag`) so
/// `SHOW WORKERS` can report what each worker is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CommandTag {
    CreateArchive = 0,
    DropArchive,
    AlterArchive,
    VerifyArchive,
    ListArchive,
    CreateBackupProfile,
    DropBackupProfile,
    ListBackupProfile,
    CreateStreamingConnection,
    DropStreamingConnection,
    ListConnection,
    StartBasebackup,
    DropBasebackup,
    ListBasebackups,
    StartStreaming,
    StopStreaming,
    StartRecoveryStream,
    Pin,
    Unpin,
    CreateRetentionPolicy,
    DropRetentionPolicy,
    ApplyRetentionPolicy,
    ListRetentionPolicies,
    ListRetentionPolicy,
    ShowWorkers,
    ShowVariables,
    ShowVariable,
    SetVariable,
    ResetVariable,
    StartLauncher,
    Exec,
}

/// `LIST ARCHIVE VERBOSE` / `LIST BASEBACKUPS IN ARCHIVE VERBOSE` detail
/// level, matching the original's `LIST_BACKUP_CATALOG` vs
/// `LIST_BACKUP_LIST` split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    #[default]
    Summary,
    Verbose,
}

#[derive(Debug, Clone)]
pub enum Command {
    CreateArchive { descr: ArchiveDescr },
    DropArchive { name: String },
    AlterArchive { name: String, descr: ArchiveDescr },
    VerifyArchive { name: String },
    ListArchive { verbosity: Verbosity },

    CreateBackupProfile { descr: BackupProfileDescr },
    DropBackupProfile { name: String },
    ListBackupProfile,

    CreateStreamingConnection { archive: String, descr: ConnectionDescr },
    DropStreamingConnection { archive: String, conn_type: ConnectionType },
    ListConnection { archive: String },

    StartBasebackup { archive: String, profile: Option<String>, force_systemid_update: bool },
    DropBasebackup { id: i64, archive: String },
    ListBasebackups { archive: String, verbosity: Verbosity },

    StartStreaming { archive: String, restart: bool, nodetach: bool },
    StopStreaming { archive: String },
    StartRecoveryStream { archive: String, port: Option<u16>, listen_on: Vec<String> },

    Pin { archive: String, selector: PinSelector },
    Unpin { archive: String, selector: PinSelector },

    CreateRetentionPolicy { descr: RetentionPolicyDescr },
    DropRetentionPolicy { name: String },
    ApplyRetentionPolicy { policy: String, archive: String },
    ListRetentionPolicies,
    ListRetentionPolicy { name: String },

    ShowWorkers { runtime_dir: PathBuf },
    ShowVariables,
    ShowVariable { name: String },
    SetVariable { name: String, value: VariableValue },
    ResetVariable { name: String },

    StartLauncher { runtime_dir: PathBuf, foreground: bool },
    Exec { command: String },
}

impl Command {
    #[must_use]
    pub fn tag(&self) -> CommandTag {
        match self {
            Command::CreateArchive { .. } => CommandTag::CreateArchive,
            Command::DropArchive { .. } => CommandTag::DropArchive,
            Command::AlterArchive { .. } => CommandTag::AlterArchive,
            Command::VerifyArchive { .. } => CommandTag::VerifyArchive,
            Command::ListArchive { .. } => CommandTag::ListArchive,
            Command::CreateBackupProfile { .. } => CommandTag::CreateBackupProfile,
            Command::DropBackupProfile { .. } => CommandTag::DropBackupProfile,
            Command::ListBackupProfile => CommandTag::ListBackupProfile,
            Command::CreateStreamingConnection { .. } => CommandTag::CreateStreamingConnection,
            Command::DropStreamingConnection { .. } => CommandTag::DropStreamingConnection,
            Command::ListConnection { .. } => CommandTag::ListConnection,
            Command::StartBasebackup { .. } => CommandTag::StartBasebackup,
            Command::DropBasebackup { .. } => CommandTag::DropBasebackup,
            Command::ListBasebackups { .. } => CommandTag::ListBasebackups,
            Command::StartStreaming { .. } => CommandTag::StartStreaming,
            Command::StopStreaming { .. } => CommandTag::StopStreaming,
            Command::StartRecoveryStream { .. } => CommandTag::StartRecoveryStream,
            Command::Pin { .. } => CommandTag::Pin,
            Command::Unpin { .. } => CommandTag::Unpin,
            Command::CreateRetentionPolicy { .. } => CommandTag::CreateRetentionPolicy,
            Command::DropRetentionPolicy { .. } => CommandTag::DropRetentionPolicy,
            Command::ApplyRetentionPolicy { .. } => CommandTag::ApplyRetentionPolicy,
            Command::ListRetentionPolicies => CommandTag::ListRetentionPolicies,
            Command::ListRetentionPolicy { .. } => CommandTag::ListRetentionPolicy,
            Command::ShowWorkers { .. } => CommandTag::ShowWorkers,
            Command::ShowVariables => CommandTag::ShowVariables,
            Command::ShowVariable { .. } => CommandTag::ShowVariable,
            Command::SetVariable { .. } => CommandTag::SetVariable,
            Command::ResetVariable { .. } => CommandTag::ResetVariable,
            Command::StartLauncher { .. } => CommandTag::StartLauncher,
            Command::Exec { .. } => CommandTag::Exec,
        }
    }

    /// The archive this command targets, if any — used to populate
    /// `WorkerEntry::archive_id` once the archive has been looked up.
    #[must_use]
    pub fn archive_name(&self) -> Option<&str> {
        match self {
            Command::AlterArchive { name, .. }
            | Command::VerifyArchive { name }
            | Command::DropArchive { name } => Some(name),
            Command::CreateStreamingConnection { archive, .. }
            | Command::DropStreamingConnection { archive, .. }
            | Command::ListConnection { archive }
            | Command::StartBasebackup { archive, .. }
            | Command::DropBasebackup { archive, .. }
            | Command::ListBasebackups { archive, .. }
            | Command::StartStreaming { archive, .. }
            | Command::StopStreaming { archive }
            | Command::StartRecoveryStream { archive, .. }
            | Command::Pin { archive, .. }
            | Command::Unpin { archive, .. }
            | Command::ApplyRetentionPolicy { archive, .. } => Some(archive),
            _ => None,
        }
    }
}

#[derive(thiserror::Error, miette::Diagnostic, Debug)]
pub enum CommandError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Retention(#[from] RetentionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Supervisor(#[from] LauncherError),

    #[error("EXEC requires a non-empty command string")]
    EmptyExecCommand,

    #[error("external command failed: {0}")]
    ExecFailed(String),
}

#[derive(Debug)]
pub enum CommandOutput {
    Archive(ArchiveDescr),
    Archives(Vec<ArchiveDescr>),
    BackupProfiles(Vec<BackupProfileDescr>),
    RetentionPolicies(Vec<RetentionPolicyDescr>),
    RetentionPolicy(RetentionPolicyDescr),
    Unit,
    Text(String),
    VariableValue(VariableValue),
    Variables(Vec<(String, VariableValue)>),
    Cleanup(CleanupDescriptor),
    Workers(Vec<WorkerEntry>),
}

/// Execute one command against `catalog`, using `stream` for any upstream
/// replication work. This is the body a worker runs after allocating its
/// slot — it does not fork or touch shared memory itself;
/// `supervisor::worker` wraps it.
pub fn dispatch(
    command: &Command,
    catalog: &mut Catalog,
    variables: &mut VariableRegistry,
    stream: &mut dyn ReplicationStream,
) -> Result<CommandOutput, CommandError> {
    match command {
        Command::CreateArchive { descr } => {
            catalog.create_archive(descr)?;
            if let Some(dir) = descr.directory.as_ref() {
                ArchiveDir::new(dir).create()?;
            }
            let created = catalog.get_archive(descr.name.as_deref().unwrap_or_default())?;
            Ok(CommandOutput::Archive(created))
        }
        Command::DropArchive { name } => {
            catalog.drop_archive(name)?;
            Ok(CommandOutput::Unit)
        }
        Command::AlterArchive { name, descr } => {
            let existing = catalog.get_archive(name)?;
            catalog.update_archive(existing.id.expect("persisted archive has an id"), descr)?;
            let updated = catalog.get_archive(descr.name.as_deref().unwrap_or(name))?;
            Ok(CommandOutput::Archive(updated))
        }
        Command::VerifyArchive { name } => {
            let archive = catalog.get_archive(name)?;
            let dir = archive.directory.as_ref().expect("persisted archive has a directory");
            ArchiveDir::new(dir).verify()?;
            Ok(CommandOutput::Unit)
        }
        Command::ListArchive { .. } => Ok(CommandOutput::Archives(catalog.list_archives()?)),

        Command::CreateBackupProfile { descr } => {
            catalog.create_backup_profile(descr)?;
            Ok(CommandOutput::Unit)
        }
        Command::DropBackupProfile { name } => {
            catalog.drop_backup_profile(name)?;
            Ok(CommandOutput::Unit)
        }
        Command::ListBackupProfile => Ok(CommandOutput::BackupProfiles(catalog.list_backup_profiles()?)),

        Command::CreateStreamingConnection { archive, descr } => {
            let archive = catalog.get_archive(archive)?;
            catalog.create_catalog_connection(archive.id.expect("persisted archive has an id"), descr)?;
            Ok(CommandOutput::Unit)
        }
        Command::DropStreamingConnection { archive, conn_type } => {
            let archive = catalog.get_archive(archive)?;
            catalog.drop_catalog_connection(archive.id.expect("persisted archive has an id"), *conn_type)?;
            Ok(CommandOutput::Unit)
        }
        Command::ListConnection { archive } => {
            let archive = catalog.get_archive(archive)?;
            let archive_id = archive.id.expect("persisted archive has an id");
            let mut found = 0;
            for conn_type in [ConnectionType::Basebackup, ConnectionType::Streamer] {
                match catalog.get_catalog_connection(archive_id, conn_type) {
                    Ok(_) => found += 1,
                    Err(CatalogError::NoSuchConnection(..)) => {}
                    Err(err) => return Err(err.into()),
                }
            }
            Ok(CommandOutput::Text(format!("{found} connections configured")))
        }

        Command::StartBasebackup { archive, profile, force_systemid_update: _ } => {
            let archive = catalog.get_archive(archive)?;
            let archive_id = archive.id.expect("persisted archive has an id");
            let profile_descr = match profile {
                Some(name) => catalog.get_backup_profile(name)?,
                None => BackupProfileDescr::default(),
            };
            let dir = archive.directory.as_ref().expect("persisted archive has a directory");
            let archive_dir = ArchiveDir::new(dir);
            let identify = stream.identify()?;

            let label = format!("archivectl_{}", identify.xlogpos);
            let descr = BaseBackupDescr {
                archive_id: Some(archive_id),
                xlogpos_start: Some(identify.xlogpos),
                timeline: identify.timeline,
                systemid: Some(identify.systemid),
                label: Some(label.clone()),
                fsentry: Some(archive_dir.backup_dir(&label)),
                started: Some(chrono::Utc::now()),
                ..Default::default()
            };
            let backup_id = catalog.register_basebackup(archive_id, &descr)?;

            let backup_dir = archive_dir.backup_dir(&label);
            let (_start, end) = stream.basebackup(&profile_descr, &backup_dir)?;

            catalog.finalize_basebackup(backup_id, end, chrono::Utc::now())?;
            archive_dir.write_signature(crate::catalog::schema::CATALOG_MAGIC)?;
            Ok(CommandOutput::Unit)
        }
        Command::DropBasebackup { id, archive } => {
            let _ = catalog.get_archive(archive)?;
            catalog.delete_base_backup(*id)?;
            Ok(CommandOutput::Unit)
        }
        Command::ListBasebackups { archive, .. } => {
            let archive = catalog.get_archive(archive)?;
            let backups = catalog.get_backup_list(archive.id.expect("persisted archive has an id"), false)?;
            Ok(CommandOutput::Text(format!("{} basebackups", backups.len())))
        }

        Command::StartStreaming { archive, .. } => {
            let _ = catalog.get_archive(archive)?;
            Ok(CommandOutput::Unit)
        }
        Command::StopStreaming { archive } => {
            let _ = catalog.get_archive(archive)?;
            Ok(CommandOutput::Unit)
        }
        Command::StartRecoveryStream { archive, .. } => {
            let _ = catalog.get_archive(archive)?;
            Ok(CommandOutput::Unit)
        }

        Command::Pin { archive, selector } => {
            let archive = catalog.get_archive(archive)?;
            catalog.perform_pin_action(archive.id.expect("persisted archive has an id"), *selector, true)?;
            Ok(CommandOutput::Unit)
        }
        Command::Unpin { archive, selector } => {
            let archive = catalog.get_archive(archive)?;
            catalog.perform_pin_action(archive.id.expect("persisted archive has an id"), *selector, false)?;
            Ok(CommandOutput::Unit)
        }

        Command::CreateRetentionPolicy { descr } => {
            catalog.create_retention_policy(descr)?;
            Ok(CommandOutput::Unit)
        }
        Command::DropRetentionPolicy { name } => {
            catalog.drop_retention_policy(name)?;
            Ok(CommandOutput::Unit)
        }
        Command::ApplyRetentionPolicy { policy, archive } => {
            let policy = catalog.get_retention_policy(policy)?;
            let archive = catalog.get_archive(archive)?;
            let archive_id = archive.id.expect("persisted archive has an id");
            let backups = catalog.get_backup_list(archive_id, false)?;
            let plan = retention::evaluate(
                &policy,
                &backups,
                &std::collections::HashSet::new(),
                chrono::Utc::now(),
            )?;

            // Catalog mutations first, so a crash mid-apply leaves only
            // dangling files behind, never an orphaned catalog row.
            for (selector, pin) in &plan.pin_actions {
                catalog.perform_pin_action(archive_id, *selector, *pin)?;
            }
            let deleted: std::collections::HashSet<i64> = plan.basebackups.iter().copied().collect();
            let fsentries: Vec<_> = backups
                .iter()
                .filter(|b| b.id.is_some_and(|id| deleted.contains(&id)))
                .filter_map(|b| b.fsentry.clone())
                .collect();
            for id in &plan.basebackups {
                catalog.delete_base_backup(*id)?;
            }

            // Then the filesystem: each deleted backup's directory subtree...
            for fsentry in &fsentries {
                if fsentry.exists() {
                    std::fs::remove_dir_all(fsentry).map_err(ArchiveError::Io)?;
                }
            }
            // ...and WAL segments at or below each timeline's cutoff.
            if let Some(dir) = archive.directory.as_ref() {
                apply_wal_cleanup(&ArchiveDir::new(dir), &plan.per_timeline_offsets)?;
            }

            Ok(CommandOutput::Cleanup(plan))
        }
        Command::ListRetentionPolicies => {
            Ok(CommandOutput::RetentionPolicies(catalog.get_retention_policies()?))
        }
        Command::ListRetentionPolicy { name } => {
            Ok(CommandOutput::RetentionPolicy(catalog.get_retention_policy(name)?))
        }

        Command::ShowWorkers { runtime_dir } => {
            let shm_path = runtime_dir.join("workers.shm");
            let mut shm = WorkerShm::attach(&shm_path).map_err(LauncherError::from)?;
            let workers = shm
                .snapshot()
                .map_err(LauncherError::from)?
                .into_iter()
                .map(|(_, entry)| entry)
                .collect();
            Ok(CommandOutput::Workers(workers))
        }
        Command::ShowVariables => Ok(CommandOutput::Variables(
            variables.show_all().map(|(n, v)| (n.to_owned(), v.clone())).collect(),
        )),
        Command::ShowVariable { name } => Ok(CommandOutput::VariableValue(variables.show(name)?.clone())),
        Command::SetVariable { name, value } => {
            variables.set(name, value.clone())?;
            Ok(CommandOutput::Unit)
        }
        Command::ResetVariable { name } => {
            variables.reset(name)?;
            Ok(CommandOutput::Unit)
        }

        Command::StartLauncher { runtime_dir, foreground } => {
            if !*foreground {
                // Safety: the CLI entry point calls `dispatch` before spawning
                // any other threads.
                let is_parent = unsafe { supervisor::daemonize()? };
                if is_parent {
                    return Ok(CommandOutput::Unit);
                }
            }
            let Some(mut launcher) = Launcher::start(catalog.path(), runtime_dir)? else {
                return Err(CommandError::Supervisor(LauncherError::AlreadyRunning));
            };
            loop {
                match launcher.tick()? {
                    LoopAction::ShutdownSmart | LoopAction::ShutdownEmergency => break,
                    LoopAction::Dispatch(_) => {
                        // TODO: decode the queued frame into a `Command` once the
                        // wire format for queued commands is defined, and run it
                        // via `spawn_worker`. Until then a queued command is
                        // acknowledged by draining it but otherwise ignored.
                    }
                    LoopAction::RefreshStatus | LoopAction::Idle => {}
                }
            }
            Ok(CommandOutput::Unit)
        }
        Command::Exec { command } => {
            if command.trim().is_empty() {
                return Err(CommandError::EmptyExecCommand);
            }
            let mut parts = command.split_whitespace();
            let program = parts.next().ok_or(CommandError::EmptyExecCommand)?;
            let status = std::process::Command::new(program)
                .args(parts)
                .status()
                .map_err(|e| CommandError::ExecFailed(e.to_string()))?;
            if status.success() {
                Ok(CommandOutput::Unit)
            } else {
                Err(CommandError::ExecFailed(format!("exited with {status}")))
            }
        }
    }
}

/// Unlink WAL segment and history files from `archive_dir`'s `log/`
/// directory once they fall below the per-timeline cutoffs a retention
/// plan computed. A timeline absent from `per_timeline` is swept in full,
/// but only if it is strictly older than the oldest timeline the plan
/// covers — a timeline we have no cutoff for is left untouched otherwise.
fn apply_wal_cleanup(
    archive_dir: &ArchiveDir,
    per_timeline: &BTreeMap<Timeline, TimelineCutoff>,
) -> Result<usize, ArchiveError> {
    let Some(oldest_planned) = per_timeline.keys().next().copied() else {
        return Ok(0);
    };
    let mut removed = 0;
    for name in archive_dir.log_entries()? {
        let kind = segment::classify(&name);
        let should_remove = if kind.is_wal_segment() {
            match segment::parse_segment_position(&name) {
                Ok(position) => match per_timeline.get(&position.timeline) {
                    Some(cutoff) => {
                        let start = position.segment_number * cutoff.wal_segment_size;
                        start <= cutoff.cleanup_start_ptr.0
                    }
                    None => position.timeline < oldest_planned,
                },
                Err(_) => false,
            }
        } else if matches!(kind, segment::SegmentKind::History | segment::SegmentKind::HistoryCompressed) {
            segment::parse_history_timeline(&name)
                .is_some_and(|timeline| !per_timeline.contains_key(&timeline) && timeline < oldest_planned)
        } else {
            false
        };

        if should_remove {
            std::fs::remove_file(archive_dir.log_dir().join(&name)).map_err(ArchiveError::Io)?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Build a default connection-params set from a catalog `ConnectionDescr`.
#[must_use]
pub fn connect_params_from_descr(descr: &ConnectionDescr) -> ConnectParams {
    ConnectParams {
        dsn: descr.dsn.clone(),
        host: descr.host.clone(),
        port: descr.port,
        user: descr.user.clone(),
        dbname: descr.dbname.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::NullReplicationStream;

    #[test]
    fn create_archive_then_list_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = Catalog::open(dir.path().join("catalog.db")).unwrap();
        let mut variables = VariableRegistry::new();
        let mut stream = NullReplicationStream::default();

        let mut descr = ArchiveDescr::default();
        descr.set_name("main");
        descr.set_directory(dir.path().join("archive"));

        dispatch(&Command::CreateArchive { descr }, &mut catalog, &mut variables, &mut stream).unwrap();

        match dispatch(
            &Command::ListArchive { verbosity: Verbosity::Summary },
            &mut catalog,
            &mut variables,
            &mut stream,
        )
        .unwrap()
        {
            CommandOutput::Archives(archives) => assert_eq!(archives.len(), 1),
            other => panic!("unexpected output: {other:?}"),
        }
    }

    #[test]
    fn exec_rejects_empty_command() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = Catalog::open(dir.path().join("catalog.db")).unwrap();
        let mut variables = VariableRegistry::new();
        let mut stream = NullReplicationStream::default();
        let err = dispatch(&Command::Exec { command: "  ".into() }, &mut catalog, &mut variables, &mut stream)
            .unwrap_err();
        assert!(matches!(err, CommandError::EmptyExecCommand));
    }

    #[test]
    fn set_and_show_variable_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = Catalog::open(dir.path().join("catalog.db")).unwrap();
        let mut variables = VariableRegistry::new();
        variables.register(crate::config::RuntimeVariable::new(
            "max_workers",
            crate::config::VariableKind::Integer { min: Some(1), max: Some(64) },
            VariableValue::Integer(4),
        ));
        let mut stream = NullReplicationStream::default();

        dispatch(
            &Command::SetVariable { name: "max_workers".into(), value: VariableValue::Integer(8) },
            &mut catalog,
            &mut variables,
            &mut stream,
        )
        .unwrap();

        match dispatch(&Command::ShowVariable { name: "max_workers".into() }, &mut catalog, &mut variables, &mut stream)
            .unwrap()
        {
            CommandOutput::VariableValue(VariableValue::Integer(n)) => assert_eq!(n, 8),
            other => panic!("unexpected output: {other:?}"),
        }
    }

    #[test]
    fn apply_retention_policy_deletes_rows_and_fsentries() {
        use crate::catalog::{RetentionPolicyDescr, RetentionRuleDescr, RetentionRuleType, RetentionRuleValue};
        use crate::xlog::{Timeline, XLogRecPtr};

        let dir = tempfile::tempdir().unwrap();
        let mut catalog = Catalog::open(dir.path().join("catalog.db")).unwrap();
        let mut variables = VariableRegistry::new();
        let mut stream = NullReplicationStream::default();

        let archive_root = dir.path().join("archive");
        let mut descr = ArchiveDescr::default();
        descr.set_name("a");
        descr.set_directory(archive_root.clone());
        dispatch(&Command::CreateArchive { descr }, &mut catalog, &mut variables, &mut stream).unwrap();
        let archive_id = catalog.get_archive("a").unwrap().id.unwrap();
        let archive_dir = ArchiveDir::new(&archive_root);

        let mut backup_ids = Vec::new();
        for n in 1..=3i64 {
            let label = format!("b{n}");
            let fsentry = archive_dir.backup_dir(&label);
            std::fs::create_dir_all(&fsentry).unwrap();
            let backup = BaseBackupDescr {
                archive_id: Some(archive_id),
                xlogpos_start: Some(XLogRecPtr::new((n as u64) * 0x1000_0000)),
                xlogpos_end: Some(XLogRecPtr::new((n as u64) * 0x1000_0000 + 0x100)),
                timeline: Timeline(1),
                label: Some(label),
                fsentry: Some(fsentry),
                started: Some(chrono::Utc::now()),
                ..Default::default()
            };
            let id = catalog.register_basebackup(archive_id, &backup).unwrap();
            catalog
                .finalize_basebackup(id, backup.xlogpos_end.unwrap(), chrono::Utc::now())
                .unwrap();
            backup_ids.push(id);
        }

        let mut policy = RetentionPolicyDescr::default();
        policy.name = Some("keep1".into());
        policy.rules.push(RetentionRuleDescr {
            id: None,
            policy_id: None,
            rule_type: RetentionRuleType::KeepNum,
            value: RetentionRuleValue::Count(1),
        });
        catalog.create_retention_policy(&policy).unwrap();

        match dispatch(
            &Command::ApplyRetentionPolicy { policy: "keep1".into(), archive: "a".into() },
            &mut catalog,
            &mut variables,
            &mut stream,
        )
        .unwrap()
        {
            CommandOutput::Cleanup(plan) => assert_eq!(plan.basebackups.len(), 2),
            other => panic!("unexpected output: {other:?}"),
        }

        let remaining = catalog.get_backup_list(archive_id, false).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, backup_ids.last().copied());
        assert!(!archive_dir.backup_dir("b1").exists());
        assert!(!archive_dir.backup_dir("b2").exists());
        assert!(archive_dir.backup_dir("b3").exists());
    }

    #[test]
    fn drop_unknown_archive_surfaces_catalog_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = Catalog::open(dir.path().join("catalog.db")).unwrap();
        let mut variables = VariableRegistry::new();
        let mut stream = NullReplicationStream::default();
        let err = dispatch(
            &Command::DropArchive { name: "nope".into() },
            &mut catalog,
            &mut variables,
            &mut stream,
        )
        .unwrap_err();
        assert!(matches!(err, CommandError::Catalog(CatalogError::NoSuchArchive(_))));
    }
}
