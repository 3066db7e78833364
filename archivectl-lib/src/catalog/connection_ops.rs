use rusqlite::params;

use super::{Catalog, CatalogError, ConnectionColumn, ConnectionDescr, ConnectionType};

impl Catalog {
    pub fn create_catalog_connection(
        &mut self,
        archive_id: i64,
        descr: &ConnectionDescr,
    ) -> Result<i64, CatalogError> {
        let conn_type = descr
            .conn_type
            .ok_or_else(|| CatalogError::Transaction("connection type is required".into()))?;
        self.conn().execute(
            "INSERT INTO connections (archive_id, type, dsn, host, port, user_name, dbname)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(archive_id, type) DO UPDATE SET
                dsn = excluded.dsn, host = excluded.host, port = excluded.port,
                user_name = excluded.user_name, dbname = excluded.dbname",
            params![
                archive_id,
                conn_type.as_sql(),
                descr.dsn,
                descr.host,
                descr.port,
                descr.user,
                descr.dbname,
            ],
        )?;
        self.get_catalog_connection(archive_id, conn_type)
            .map(|d| d.id.expect("just inserted"))
    }

    pub fn update_catalog_connection(
        &mut self,
        id: i64,
        descr: &ConnectionDescr,
    ) -> Result<(), CatalogError> {
        if descr.affected.is_empty() {
            return Ok(());
        }
        for col in &descr.affected {
            let value: Box<dyn rusqlite::ToSql> = match col {
                ConnectionColumn::Dsn => Box::new(descr.dsn.clone()),
                ConnectionColumn::Host => Box::new(descr.host.clone()),
                ConnectionColumn::Port => Box::new(descr.port),
                ConnectionColumn::User => Box::new(descr.user.clone()),
                ConnectionColumn::Dbname => Box::new(descr.dbname.clone()),
            };
            let sql = format!("UPDATE connections SET {} = ?1 WHERE id = ?2", col.sql_name());
            self.conn().execute(&sql, params![value, id])?;
        }
        Ok(())
    }

    pub fn drop_catalog_connection(
        &mut self,
        archive_id: i64,
        conn_type: ConnectionType,
    ) -> Result<(), CatalogError> {
        let affected = self.conn().execute(
            "DELETE FROM connections WHERE archive_id = ?1 AND type = ?2",
            params![archive_id, conn_type.as_sql()],
        )?;
        if affected == 0 {
            return Err(CatalogError::NoSuchConnection(
                conn_type.as_sql(),
                archive_id.to_string(),
            ));
        }
        Ok(())
    }

    pub fn get_catalog_connection(
        &self,
        archive_id: i64,
        conn_type: ConnectionType,
    ) -> Result<ConnectionDescr, CatalogError> {
        self.conn()
            .query_row(
                "SELECT id, archive_id, type, dsn, host, port, user_name, dbname
                 FROM connections WHERE archive_id = ?1 AND type = ?2",
                params![archive_id, conn_type.as_sql()],
                Self::row_to_connection,
            )
            .map_err(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => {
                    CatalogError::NoSuchConnection(conn_type.as_sql(), archive_id.to_string())
                }
                other => other.into(),
            })
    }

    fn row_to_connection(row: &rusqlite::Row) -> rusqlite::Result<ConnectionDescr> {
        let type_str: String = row.get(2)?;
        Ok(ConnectionDescr {
            id: row.get(0)?,
            archive_id: row.get(1)?,
            conn_type: type_str.parse().ok(),
            dsn: row.get(3)?,
            host: row.get(4)?,
            port: row.get(5)?,
            user: row.get(6)?,
            dbname: row.get(7)?,
            affected: Vec::new(),
        })
    }
}
