//! End-to-end scenarios exercised through `command::dispatch`, the same
//! entry point the CLI and a worker body call into.

use archivectl::archive::ArchiveDir;
use archivectl::catalog::{
    ArchiveDescr, BackupTablespaceDescr, BackupSelector, Catalog, ConnectionDescr, ConnectionType,
};
use archivectl::command::{dispatch, Command, CommandOutput, Verbosity};
use archivectl::config::VariableRegistry;
use archivectl::stream::{ConnectParams, CreateSlotOptions, IdentifySystem, ReplicationStream, StreamError};
use archivectl::xlog::{Timeline, XLogRecPtr};

/// A stream double that reports a fixed, non-zero start position and
/// advances it by one segment on `basebackup`, so the `xlogpos_end >
/// xlogpos_start` invariant on a `ready` backup actually holds.
#[derive(Default)]
struct AdvancingStream {
    connected: bool,
}

impl ReplicationStream for AdvancingStream {
    fn connect(&mut self, _params: &ConnectParams) -> Result<(), StreamError> {
        self.connected = true;
        Ok(())
    }

    fn test_connection(&mut self) -> Result<(), StreamError> {
        if self.connected {
            Ok(())
        } else {
            Err(StreamError::NotConfigured)
        }
    }

    fn identify(&mut self) -> Result<IdentifySystem, StreamError> {
        Ok(IdentifySystem {
            systemid: 6_900_000_000_000_000_000,
            timeline: Timeline(1),
            xlogpos: XLogRecPtr::new(0x0100_0000),
            dbname: None,
        })
    }

    fn get_server_setting(&mut self, name: &str) -> Result<String, StreamError> {
        match name {
            "wal_segment_size" => Ok("16777216".to_owned()),
            other => Err(StreamError::MissingSetting(other.to_owned())),
        }
    }

    fn create_physical_replication_slot(
        &mut self,
        _slot_name: &str,
        _options: &CreateSlotOptions,
    ) -> Result<(), StreamError> {
        Ok(())
    }

    fn timeline_history_file_content(
        &mut self,
        tli: Timeline,
    ) -> Result<(String, Vec<u8>), StreamError> {
        Ok((format!("{tli}.history"), Vec::new()))
    }

    fn walstreamer(
        &mut self,
        _slot_name: &str,
        _dest_dir: &std::path::Path,
    ) -> Result<std::process::Child, StreamError> {
        std::process::Command::new("true")
            .stdout(std::process::Stdio::null())
            .spawn()
            .map_err(StreamError::Io)
    }

    fn basebackup(
        &mut self,
        _profile: &archivectl::catalog::BackupProfileDescr,
        dest_dir: &std::path::Path,
    ) -> Result<(XLogRecPtr, XLogRecPtr), StreamError> {
        std::fs::create_dir_all(dest_dir).map_err(StreamError::Io)?;
        let start = self.identify()?.xlogpos;
        Ok((start, XLogRecPtr::new(start.0 + 0x0100_0000)))
    }
}

#[test]
fn create_archive_register_connection_start_basebackup() {
    let tmp = tempfile::tempdir().unwrap();
    let archive_root = tmp.path().join("archive_a");
    let mut catalog = Catalog::open(tmp.path().join("catalog.db")).unwrap();
    let mut variables = VariableRegistry::new();
    let mut stream = AdvancingStream::default();

    let mut archive_descr = ArchiveDescr::default();
    archive_descr.set_name("a");
    archive_descr.set_directory(archive_root.clone());
    dispatch(&Command::CreateArchive { descr: archive_descr }, &mut catalog, &mut variables, &mut stream)
        .unwrap();

    let connection_descr = ConnectionDescr {
        conn_type: Some(ConnectionType::Basebackup),
        host: Some("h".into()),
        dbname: Some("d".into()),
        user: Some("u".into()),
        port: Some(5432),
        ..Default::default()
    };
    dispatch(
        &Command::CreateStreamingConnection { archive: "a".into(), descr: connection_descr },
        &mut catalog,
        &mut variables,
        &mut stream,
    )
    .unwrap();

    dispatch(
        &Command::StartBasebackup { archive: "a".into(), profile: None, force_systemid_update: false },
        &mut catalog,
        &mut variables,
        &mut stream,
    )
    .unwrap();

    let archives = catalog.list_archives().unwrap();
    assert_eq!(archives.len(), 1);
    assert_eq!(archives[0].name.as_deref(), Some("a"));

    let archive_id = archives[0].id.unwrap();
    assert!(catalog.get_catalog_connection(archive_id, ConnectionType::Basebackup).is_ok());
    assert!(matches!(
        catalog.get_catalog_connection(archive_id, ConnectionType::Streamer),
        Err(archivectl::catalog::CatalogError::NoSuchConnection(..))
    ));

    let backups = catalog.get_backup_list(archive_id, false).unwrap();
    assert_eq!(backups.len(), 1);
    let backup = &backups[0];
    assert!(backup.invariant_holds());
    assert_eq!(backup.status, archivectl::catalog::BackupStatus::Ready);
    assert!(archive_root.join("base").join(backup.label.clone().unwrap()).is_dir());

    // Tablespace discovery is out of this scenario's scope for `dispatch`
    // itself, but the catalog must still support recording one.
    catalog
        .register_tablespace_for_backup(
            backup.id.unwrap(),
            &BackupTablespaceDescr {
                id: None,
                backup_id: Some(backup.id.unwrap()),
                spcoid: 1663,
                spclocation: None,
                spcsize: Some(0),
                affected: Vec::new(),
            },
        )
        .unwrap();
    let newest = catalog.get_base_backup(archive_id, BackupSelector::Newest).unwrap();
    assert_eq!(newest.tablespaces.len(), 1);

    let archive_dir = ArchiveDir::new(&archive_root);
    assert_eq!(archive_dir.verify().unwrap(), archivectl::catalog::schema::CATALOG_MAGIC);

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
