use rusqlite::params;

use super::{BackupProfileColumn, BackupProfileDescr, Catalog, CatalogError};

impl Catalog {
    pub fn create_backup_profile(
        &mut self,
        descr: &BackupProfileDescr,
    ) -> Result<i64, CatalogError> {
        let name = descr
            .name
            .clone()
            .ok_or_else(|| CatalogError::Transaction("profile name is required".into()))?;
        self.conn().execute(
            "INSERT INTO backup_profiles
                (name, compress_type, max_rate, label, fast_checkpoint, include_wal,
                 wait_for_wal, noverify_checksums, manifest, manifest_checksums)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                name,
                descr.compress_type.as_sql(),
                descr.max_rate,
                descr.label,
                descr.fast_checkpoint,
                descr.include_wal,
                descr.wait_for_wal,
                descr.noverify_checksums,
                descr.manifest,
                descr.manifest_checksums,
            ],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    pub fn update_backup_profile(
        &mut self,
        id: i64,
        descr: &BackupProfileDescr,
    ) -> Result<(), CatalogError> {
        for col in &descr.affected {
            let value: Box<dyn rusqlite::ToSql> = match col {
                BackupProfileColumn::Name => Box::new(descr.name.clone()),
                BackupProfileColumn::CompressType => Box::new(descr.compress_type.as_sql()),
                BackupProfileColumn::MaxRate => Box::new(descr.max_rate),
                BackupProfileColumn::Label => Box::new(descr.label.clone()),
                BackupProfileColumn::FastCheckpoint => Box::new(descr.fast_checkpoint),
                BackupProfileColumn::IncludeWal => Box::new(descr.include_wal),
                BackupProfileColumn::WaitForWal => Box::new(descr.wait_for_wal),
                BackupProfileColumn::NoverifyChecksums => Box::new(descr.noverify_checksums),
                BackupProfileColumn::Manifest => Box::new(descr.manifest),
                BackupProfileColumn::ManifestChecksums => Box::new(descr.manifest_checksums),
            };
            let sql = format!(
                "UPDATE backup_profiles SET {} = ?1 WHERE id = ?2",
                col.sql_name()
            );
            self.conn().execute(&sql, params![value, id])?;
        }
        Ok(())
    }

    pub fn drop_backup_profile(&mut self, name: &str) -> Result<(), CatalogError> {
        let affected = self
            .conn()
            .execute("DELETE FROM backup_profiles WHERE name = ?1", [name])?;
        if affected == 0 {
            return Err(CatalogError::NoSuchBackupProfile(name.to_owned()));
        }
        Ok(())
    }

    pub fn get_backup_profile(&self, name: &str) -> Result<BackupProfileDescr, CatalogError> {
        self.conn()
            .query_row(
                "SELECT id, name, compress_type, max_rate, label, fast_checkpoint, include_wal,
                        wait_for_wal, noverify_checksums, manifest, manifest_checksums
                 FROM backup_profiles WHERE name = ?1",
                [name],
                Self::row_to_profile,
            )
            .map_err(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => {
                    CatalogError::NoSuchBackupProfile(name.to_owned())
                }
                other => other.into(),
            })
    }

    pub fn list_backup_profiles(&self) -> Result<Vec<BackupProfileDescr>, CatalogError> {
        let mut stmt = self.conn().prepare(
            "SELECT id, name, compress_type, max_rate, label, fast_checkpoint, include_wal,
                    wait_for_wal, noverify_checksums, manifest, manifest_checksums
             FROM backup_profiles ORDER BY name",
        )?;
        let rows = stmt.query_map([], Self::row_to_profile)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn row_to_profile(row: &rusqlite::Row) -> rusqlite::Result<BackupProfileDescr> {
        let compress_type: String = row.get(2)?;
        Ok(BackupProfileDescr {
            id: row.get(0)?,
            name: row.get(1)?,
            compress_type: compress_type.parse().unwrap_or(super::CompressType::None),
            max_rate: row.get(3)?,
            label: row.get(4)?,
            fast_checkpoint: row.get(5)?,
            include_wal: row.get(6)?,
            wait_for_wal: row.get(7)?,
            noverify_checksums: row.get(8)?,
            manifest: row.get(9)?,
            manifest_checksums: row.get(10)?,
            affected: Vec::new(),
        })
    }
}
