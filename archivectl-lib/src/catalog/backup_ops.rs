use rusqlite::params;

use crate::xlog::{Timeline, XLogRecPtr};

use super::{
    assert_bindable, BackupStatus, BackupTablespaceDescr, BaseBackupColumn, BaseBackupDescr,
    Catalog, CatalogError,
};

/// How to pick one base backup out of an archive's history.
#[derive(Debug, Clone)]
pub enum BackupSelector {
    Id(i64),
    Label(String),
    Newest,
    Oldest,
}

impl Catalog {
    pub fn register_basebackup(
        &mut self,
        archive_id: i64,
        descr: &BaseBackupDescr,
    ) -> Result<i64, CatalogError> {
        self.conn().execute(
            "INSERT INTO backup
                (archive_id, xlogpos_start, xlogpos_end, timeline, label, fsentry, started,
                 stopped, pinned, status, systemid, wal_segment_size, used_profile)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                archive_id,
                descr.xlogpos_start.map(|p| p.to_string()),
                descr.xlogpos_end.map(|p| p.to_string()),
                descr.timeline.0,
                descr.label,
                descr
                    .fsentry
                    .as_ref()
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                descr.started,
                descr.stopped,
                descr.pinned,
                descr.status.as_sql(),
                descr.systemid.map(|v| v as i64),
                descr.wal_segment_size as i64,
                descr.used_profile,
            ],
        )?;
        let id = self.conn().last_insert_rowid();
        for tablespace in &descr.tablespaces {
            self.register_tablespace_for_backup(id, tablespace)?;
        }
        Ok(id)
    }

    pub fn register_tablespace_for_backup(
        &mut self,
        backup_id: i64,
        descr: &BackupTablespaceDescr,
    ) -> Result<i64, CatalogError> {
        self.conn().execute(
            "INSERT INTO backup_tablespaces (backup_id, spcoid, spclocation, spcsize)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                backup_id,
                descr.spcoid,
                descr
                    .spclocation
                    .as_ref()
                    .map(|p| p.to_string_lossy().into_owned()),
                descr.spcsize,
            ],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    /// Bind the affected columns of `descr` against backup `id`. Computed
    /// columns (`duration_seconds`, `exceeds_retention_rule`) can never
    /// appear here; `assert_bindable` enforces that as a programmer error.
    pub fn update_base_backup(
        &mut self,
        id: i64,
        descr: &BaseBackupDescr,
    ) -> Result<(), CatalogError> {
        assert_bindable(&descr.affected);
        for col in &descr.affected {
            let value: Box<dyn rusqlite::ToSql> = match col {
                BaseBackupColumn::ArchiveId => Box::new(descr.archive_id),
                BaseBackupColumn::XlogposStart => {
                    Box::new(descr.xlogpos_start.map(|p| p.to_string()))
                }
                BaseBackupColumn::XlogposEnd => {
                    Box::new(descr.xlogpos_end.map(|p| p.to_string()))
                }
                BaseBackupColumn::Timeline => Box::new(descr.timeline.0),
                BaseBackupColumn::Label => Box::new(descr.label.clone()),
                BaseBackupColumn::Fsentry => Box::new(
                    descr
                        .fsentry
                        .as_ref()
                        .map(|p| p.to_string_lossy().into_owned()),
                ),
                BaseBackupColumn::Started => Box::new(descr.started),
                BaseBackupColumn::Stopped => Box::new(descr.stopped),
                BaseBackupColumn::Pinned => Box::new(descr.pinned),
                BaseBackupColumn::Status => Box::new(descr.status.as_sql()),
                BaseBackupColumn::Systemid => Box::new(descr.systemid.map(|v| v as i64)),
                BaseBackupColumn::WalSegmentSize => Box::new(descr.wal_segment_size as i64),
                BaseBackupColumn::UsedProfile => Box::new(descr.used_profile),
                BaseBackupColumn::DurationSeconds | BaseBackupColumn::ExceedsRetentionRule => {
                    unreachable!("rejected by assert_bindable")
                }
            };
            let sql = format!("UPDATE backup SET {} = ?1 WHERE id = ?2", col.sql_name());
            self.conn().execute(&sql, params![value, id])?;
        }
        Ok(())
    }

    /// Mark a backup `ready`: bind `xlogpos_end` and `stopped` and flip
    /// status, in one call, matching the invariant in
    /// `BaseBackupDescr::invariant_holds`.
    pub fn finalize_basebackup(
        &mut self,
        id: i64,
        xlogpos_end: XLogRecPtr,
        stopped: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), CatalogError> {
        self.conn().execute(
            "UPDATE backup SET xlogpos_end = ?1, stopped = ?2, status = ?3 WHERE id = ?4",
            params![
                xlogpos_end.to_string(),
                stopped,
                BackupStatus::Ready.as_sql(),
                id
            ],
        )?;
        Ok(())
    }

    pub fn abort_basebackup(&mut self, id: i64) -> Result<(), CatalogError> {
        self.conn().execute(
            "UPDATE backup SET status = ?1 WHERE id = ?2",
            params![BackupStatus::Aborted.as_sql(), id],
        )?;
        Ok(())
    }

    pub fn delete_base_backup(&mut self, id: i64) -> Result<(), CatalogError> {
        let affected = self
            .conn()
            .execute("DELETE FROM backup WHERE id = ?1", [id])?;
        if affected == 0 {
            return Err(CatalogError::NoSuchBaseBackup(id.to_string(), String::new()));
        }
        Ok(())
    }

    pub fn get_base_backup(
        &self,
        archive_id: i64,
        selector: BackupSelector,
    ) -> Result<BaseBackupDescr, CatalogError> {
        let row = match &selector {
            BackupSelector::Id(id) => self.conn().query_row(
                "SELECT id, archive_id, xlogpos_start, xlogpos_end, timeline, label, fsentry,
                        started, stopped, pinned, status, systemid, wal_segment_size, used_profile
                 FROM backup WHERE archive_id = ?1 AND id = ?2",
                params![archive_id, id],
                Self::row_to_backup,
            ),
            BackupSelector::Label(label) => self.conn().query_row(
                "SELECT id, archive_id, xlogpos_start, xlogpos_end, timeline, label, fsentry,
                        started, stopped, pinned, status, systemid, wal_segment_size, used_profile
                 FROM backup WHERE archive_id = ?1 AND label = ?2
                 ORDER BY started DESC LIMIT 1",
                params![archive_id, label],
                Self::row_to_backup,
            ),
            BackupSelector::Newest => self.conn().query_row(
                "SELECT id, archive_id, xlogpos_start, xlogpos_end, timeline, label, fsentry,
                        started, stopped, pinned, status, systemid, wal_segment_size, used_profile
                 FROM backup WHERE archive_id = ?1
                 ORDER BY started DESC LIMIT 1",
                params![archive_id],
                Self::row_to_backup,
            ),
            BackupSelector::Oldest => self.conn().query_row(
                "SELECT id, archive_id, xlogpos_start, xlogpos_end, timeline, label, fsentry,
                        started, stopped, pinned, status, systemid, wal_segment_size, used_profile
                 FROM backup WHERE archive_id = ?1
                 ORDER BY started ASC LIMIT 1",
                params![archive_id],
                Self::row_to_backup,
            ),
        };
        let mut descr = row.map_err(|err| match err {
            rusqlite::Error::QueryReturnedNoRows => {
                CatalogError::NoSuchBaseBackup(format!("{selector:?}"), archive_id.to_string())
            }
            other => other.into(),
        })?;
        descr.tablespaces = self.get_tablespaces_for_backup(descr.id.expect("fetched row has id"))?;
        Ok(descr)
    }

    /// All backups for `archive_id`, newest first. When `valid_only` is
    /// set, `aborted` and `in progress` rows are excluded — only `ready`
    /// backups are usable as restore targets.
    pub fn get_backup_list(
        &self,
        archive_id: i64,
        valid_only: bool,
    ) -> Result<Vec<BaseBackupDescr>, CatalogError> {
        let sql = if valid_only {
            "SELECT id, archive_id, xlogpos_start, xlogpos_end, timeline, label, fsentry,
                    started, stopped, pinned, status, systemid, wal_segment_size, used_profile
             FROM backup WHERE archive_id = ?1 AND status = 'ready' ORDER BY started DESC"
        } else {
            "SELECT id, archive_id, xlogpos_start, xlogpos_end, timeline, label, fsentry,
                    started, stopped, pinned, status, systemid, wal_segment_size, used_profile
             FROM backup WHERE archive_id = ?1 ORDER BY started DESC"
        };
        let mut stmt = self.conn().prepare(sql)?;
        let rows = stmt.query_map([archive_id], Self::row_to_backup)?;
        let mut result = Vec::new();
        for row in rows {
            let mut descr = row?;
            descr.tablespaces =
                self.get_tablespaces_for_backup(descr.id.expect("fetched row has id"))?;
            result.push(descr);
        }
        Ok(result)
    }

    fn get_tablespaces_for_backup(
        &self,
        backup_id: i64,
    ) -> Result<Vec<BackupTablespaceDescr>, CatalogError> {
        let mut stmt = self.conn().prepare(
            "SELECT id, backup_id, spcoid, spclocation, spcsize FROM backup_tablespaces
             WHERE backup_id = ?1",
        )?;
        let rows = stmt.query_map([backup_id], |row| {
            let spclocation: Option<String> = row.get(3)?;
            Ok(BackupTablespaceDescr {
                id: row.get(0)?,
                backup_id: row.get(1)?,
                spcoid: row.get(2)?,
                spclocation: spclocation.map(Into::into),
                spcsize: row.get(4)?,
                affected: Vec::new(),
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn row_to_backup(row: &rusqlite::Row) -> rusqlite::Result<BaseBackupDescr> {
        let xlogpos_start: Option<String> = row.get(2)?;
        let xlogpos_end: Option<String> = row.get(3)?;
        let fsentry: String = row.get(6)?;
        let status: String = row.get(10)?;
        let systemid: Option<i64> = row.get(11)?;
        let started: Option<chrono::DateTime<chrono::Utc>> = row.get(7)?;
        let stopped: Option<chrono::DateTime<chrono::Utc>> = row.get(8)?;
        let duration_seconds = match (started, stopped) {
            (Some(s), Some(e)) => Some((e - s).num_seconds()),
            _ => None,
        };
        Ok(BaseBackupDescr {
            id: row.get(0)?,
            archive_id: row.get(1)?,
            xlogpos_start: xlogpos_start.and_then(|s| s.parse().ok()),
            xlogpos_end: xlogpos_end.and_then(|s| s.parse().ok()),
            timeline: Timeline(row.get(4)?),
            label: row.get(5)?,
            fsentry: Some(fsentry.into()),
            started,
            stopped,
            pinned: row.get(9)?,
            status: status.parse().unwrap_or(BackupStatus::Aborted),
            systemid: systemid.map(|v| v as u64),
            wal_segment_size: row.get::<_, i64>(12)? as u64,
            used_profile: row.get(13)?,
            tablespaces: Vec::new(),
            duration_seconds,
            exceeds_retention_rule: None,
            affected: Vec::new(),
        })
    }
}
