use rusqlite::params;

use super::{Catalog, CatalogError, StreamColumn, StreamDescr, StreamStatus, StreamType};

impl Catalog {
    pub fn register_stream(
        &mut self,
        archive_id: i64,
        descr: &StreamDescr,
    ) -> Result<i64, CatalogError> {
        let stype = descr
            .stype
            .ok_or_else(|| CatalogError::Transaction("stream type is required".into()))?;
        let status = descr.status.unwrap_or(StreamStatus::Starting);
        self.conn().execute(
            "INSERT INTO stream
                (archive_id, stype, slot_name, systemid, timeline, xlogpos, dbname, status,
                 create_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                archive_id,
                stype_as_sql(stype),
                descr.slot_name,
                descr.systemid.map(|v| v as i64),
                descr.timeline.map(|t| t.0),
                descr.xlogpos.map(|p| p.to_string()),
                descr.dbname,
                status.as_sql(),
                descr.create_date.unwrap_or_else(chrono::Utc::now),
            ],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    pub fn update_stream(&mut self, id: i64, descr: &StreamDescr) -> Result<(), CatalogError> {
        for col in &descr.affected {
            let value: Box<dyn rusqlite::ToSql> = match col {
                StreamColumn::ArchiveId => Box::new(descr.archive_id),
                StreamColumn::Stype => Box::new(descr.stype.map(stype_as_sql)),
                StreamColumn::SlotName => Box::new(descr.slot_name.clone()),
                StreamColumn::Systemid => Box::new(descr.systemid.map(|v| v as i64)),
                StreamColumn::Timeline => Box::new(descr.timeline.map(|t| t.0)),
                StreamColumn::Xlogpos => Box::new(descr.xlogpos.map(|p| p.to_string())),
                StreamColumn::Dbname => Box::new(descr.dbname.clone()),
                StreamColumn::Status => Box::new(descr.status.map(StreamStatus::as_sql)),
            };
            let sql = format!("UPDATE stream SET {} = ?1 WHERE id = ?2", col.sql_name());
            self.conn().execute(&sql, params![value, id])?;
        }
        Ok(())
    }

    pub fn set_stream_status(&mut self, id: i64, status: StreamStatus) -> Result<(), CatalogError> {
        self.conn().execute(
            "UPDATE stream SET status = ?1 WHERE id = ?2",
            params![status.as_sql(), id],
        )?;
        Ok(())
    }

    pub fn drop_stream(&mut self, id: i64) -> Result<(), CatalogError> {
        self.conn().execute("DELETE FROM stream WHERE id = ?1", [id])?;
        Ok(())
    }

    pub fn get_streams_for_archive(&self, archive_id: i64) -> Result<Vec<StreamDescr>, CatalogError> {
        let mut stmt = self.conn().prepare(
            "SELECT id, archive_id, stype, slot_name, systemid, timeline, xlogpos, dbname,
                    status, create_date
             FROM stream WHERE archive_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([archive_id], Self::row_to_stream)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn row_to_stream(row: &rusqlite::Row) -> rusqlite::Result<StreamDescr> {
        let stype: String = row.get(2)?;
        let xlogpos: Option<String> = row.get(6)?;
        let status: String = row.get(8)?;
        let systemid: Option<i64> = row.get(4)?;
        Ok(StreamDescr {
            id: row.get(0)?,
            archive_id: row.get(1)?,
            stype: stype_from_sql(&stype),
            slot_name: row.get(3)?,
            systemid: systemid.map(|v| v as u64),
            timeline: row.get::<_, Option<u32>>(5)?.map(crate::xlog::Timeline),
            xlogpos: xlogpos.and_then(|s| s.parse().ok()),
            dbname: row.get(7)?,
            status: status_from_sql(&status),
            create_date: row.get(9)?,
            affected: Vec::new(),
        })
    }
}

fn stype_as_sql(stype: StreamType) -> &'static str {
    match stype {
        StreamType::Physical => "physical",
        StreamType::Basebackup => "basebackup",
    }
}

fn stype_from_sql(s: &str) -> Option<StreamType> {
    match s {
        "physical" => Some(StreamType::Physical),
        "basebackup" => Some(StreamType::Basebackup),
        _ => None,
    }
}

fn status_from_sql(s: &str) -> Option<StreamStatus> {
    match s {
        "starting" => Some(StreamStatus::Starting),
        "streaming" => Some(StreamStatus::Streaming),
        "stopped" => Some(StreamStatus::Stopped),
        "failed" => Some(StreamStatus::Failed),
        _ => None,
    }
}
