use rusqlite::params;

use super::{ArchiveColumn, ArchiveDescr, Catalog, CatalogError, Column};

impl Catalog {
    pub fn create_archive(&mut self, descr: &ArchiveDescr) -> Result<i64, CatalogError> {
        let name = descr
            .name
            .clone()
            .ok_or_else(|| CatalogError::Transaction("archive name is required".into()))?;
        let directory = descr
            .directory
            .clone()
            .ok_or_else(|| CatalogError::Transaction("archive directory is required".into()))?;

        if self.archive_exists(&name)? {
            return Err(CatalogError::DuplicateArchiveName(name));
        }

        self.conn().execute(
            "INSERT INTO archive (name, directory, compression_flag) VALUES (?1, ?2, ?3)",
            params![name, directory.to_string_lossy(), descr.compression_flag],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    fn archive_exists(&self, name: &str) -> Result<bool, CatalogError> {
        Ok(self.conn().query_row(
            "SELECT COUNT(*) > 0 FROM archive WHERE name = ?1",
            [name],
            |row| row.get(0),
        )?)
    }

    pub fn get_archive(&self, name: &str) -> Result<ArchiveDescr, CatalogError> {
        self.conn()
            .query_row(
                "SELECT id, name, directory, compression_flag FROM archive WHERE name = ?1",
                [name],
                Self::row_to_archive,
            )
            .map_err(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => {
                    CatalogError::NoSuchArchive(name.to_owned())
                }
                other => other.into(),
            })
    }

    pub fn list_archives(&self) -> Result<Vec<ArchiveDescr>, CatalogError> {
        let mut stmt = self
            .conn()
            .prepare("SELECT id, name, directory, compression_flag FROM archive ORDER BY name")?;
        let rows = stmt.query_map([], Self::row_to_archive)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn update_archive(&mut self, id: i64, descr: &ArchiveDescr) -> Result<(), CatalogError> {
        if descr.affected.is_empty() {
            return Ok(());
        }
        let sets: Vec<String> = descr
            .affected
            .iter()
            .map(|c| format!("{} = ?", c.sql_name()))
            .collect();
        let sql = format!("UPDATE archive SET {} WHERE id = ?", sets.join(", "));

        let mut stmt = self.conn().prepare(&sql)?;
        let mut idx = 1;
        for col in &descr.affected {
            match col {
                ArchiveColumn::Name => {
                    stmt.raw_bind_parameter(idx, descr.name.as_deref().unwrap_or_default())?;
                }
                ArchiveColumn::Directory => {
                    stmt.raw_bind_parameter(
                        idx,
                        descr
                            .directory
                            .as_ref()
                            .map(|d| d.to_string_lossy().into_owned())
                            .unwrap_or_default(),
                    )?;
                }
                ArchiveColumn::CompressionFlag => {
                    stmt.raw_bind_parameter(idx, descr.compression_flag)?;
                }
            }
            idx += 1;
        }
        stmt.raw_bind_parameter(idx, id)?;
        stmt.raw_execute()?;
        Ok(())
    }

    pub fn drop_archive(&mut self, name: &str) -> Result<(), CatalogError> {
        let affected = self
            .conn()
            .execute("DELETE FROM archive WHERE name = ?1", [name])?;
        if affected == 0 {
            return Err(CatalogError::NoSuchArchive(name.to_owned()));
        }
        Ok(())
    }

    fn row_to_archive(row: &rusqlite::Row) -> rusqlite::Result<ArchiveDescr> {
        let directory: String = row.get(2)?;
        Ok(ArchiveDescr {
            id: row.get(0)?,
            name: row.get(1)?,
            directory: Some(directory.into()),
            compression_flag: row.get(3)?,
            affected: Vec::new(),
        })
    }
}
