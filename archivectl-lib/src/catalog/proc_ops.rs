use rusqlite::params;

use super::{Catalog, CatalogError, CatalogProcDescr, ProcState, ProcType};

impl Catalog {
    pub fn register_proc(&mut self, descr: &CatalogProcDescr) -> Result<(), CatalogError> {
        self.conn().execute(
            "INSERT INTO procs (pid, archive_id, type, started, state, shm_key, shm_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(pid, archive_id, type) DO UPDATE SET
                started = excluded.started, state = excluded.state,
                shm_key = excluded.shm_key, shm_id = excluded.shm_id",
            params![
                descr.pid,
                descr.archive_id,
                proc_type_as_sql(descr.proc_type),
                descr.started,
                proc_state_as_sql(descr.state),
                descr.shm_key,
                descr.shm_id,
            ],
        )?;
        Ok(())
    }

    pub fn unregister_proc(
        &mut self,
        pid: i32,
        archive_id: Option<i64>,
        proc_type: ProcType,
    ) -> Result<(), CatalogError> {
        self.conn().execute(
            "DELETE FROM procs WHERE pid = ?1 AND archive_id IS ?2 AND type = ?3",
            params![pid, archive_id, proc_type_as_sql(proc_type)],
        )?;
        Ok(())
    }

    pub fn update_proc(
        &mut self,
        pid: i32,
        archive_id: Option<i64>,
        proc_type: ProcType,
        state: ProcState,
    ) -> Result<(), CatalogError> {
        self.conn().execute(
            "UPDATE procs SET state = ?1 WHERE pid = ?2 AND archive_id IS ?3 AND type = ?4",
            params![proc_state_as_sql(state), pid, archive_id, proc_type_as_sql(proc_type)],
        )?;
        Ok(())
    }

    pub fn get_proc(
        &self,
        pid: i32,
        archive_id: Option<i64>,
        proc_type: ProcType,
    ) -> Result<CatalogProcDescr, CatalogError> {
        self.conn()
            .query_row(
                "SELECT pid, archive_id, type, started, state, shm_key, shm_id
                 FROM procs WHERE pid = ?1 AND archive_id IS ?2 AND type = ?3",
                params![pid, archive_id, proc_type_as_sql(proc_type)],
                Self::row_to_proc,
            )
            .map_err(Into::into)
    }

    pub fn get_all_procs(&self) -> Result<Vec<CatalogProcDescr>, CatalogError> {
        let mut stmt = self
            .conn()
            .prepare("SELECT pid, archive_id, type, started, state, shm_key, shm_id FROM procs")?;
        let rows = stmt.query_map([], Self::row_to_proc)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn row_to_proc(row: &rusqlite::Row) -> rusqlite::Result<CatalogProcDescr> {
        let proc_type: String = row.get(2)?;
        let state: String = row.get(4)?;
        Ok(CatalogProcDescr {
            pid: row.get(0)?,
            archive_id: row.get(1)?,
            proc_type: proc_type_from_sql(&proc_type),
            started: row.get(3)?,
            state: proc_state_from_sql(&state),
            shm_key: row.get(5)?,
            shm_id: row.get(6)?,
        })
    }
}

fn proc_type_as_sql(t: ProcType) -> &'static str {
    t.as_sql()
}

fn proc_type_from_sql(s: &str) -> ProcType {
    match s {
        "launcher" => ProcType::Launcher,
        "streamer" => ProcType::Streamer,
        _ => ProcType::Worker,
    }
}

fn proc_state_as_sql(s: ProcState) -> &'static str {
    match s {
        ProcState::Running => "running",
        ProcState::Shutdown => "shutdown",
    }
}

fn proc_state_from_sql(s: &str) -> ProcState {
    match s {
        "running" => ProcState::Running,
        _ => ProcState::Shutdown,
    }
}
