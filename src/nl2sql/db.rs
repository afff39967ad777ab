// SPDX-License-Identifier: MIT

//! SQLite collaborator
//!
//! Implements schema introspection, static validation, execution and
//! distinct-name lookup on top of rusqlite. Every call opens its own
//! read-only connection on a blocking thread.

use crate::adk::error::{Nl2SqlError, Result};
use crate::nl2sql::config::NameColumn;
use crate::nl2sql::resolver::NameSource;
use crate::nl2sql::schema::{ColumnDef, ConnectionHandle, SchemaDescription, SchemaProvider};
use crate::nl2sql::sql::{Row, SqlExecutor, SqlValidator, Validation};
use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::Value;

/// SQLite database reached through a connection URL or path
#[derive(Debug, Clone)]
pub struct SqliteDatabase {
    connection: ConnectionHandle,
}

impl SqliteDatabase {
    pub fn new(connection: ConnectionHandle) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    /// Run `f` against a fresh read-only connection on the blocking pool
    async fn with_connection<T, F>(connection: &ConnectionHandle, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let path = connection.sqlite_path().to_string();
        tokio::task::spawn_blocking(move || {
            let conn = open_read_only(&path)?;
            f(&conn)
        })
        .await?
    }
}

fn open_read_only(path: &str) -> Result<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
        | OpenFlags::SQLITE_OPEN_NO_MUTEX
        | OpenFlags::SQLITE_OPEN_URI;
    Connection::open_with_flags(path, flags).map_err(|e| {
        log::error!("Failed to open database {}: {}", path, e);
        Nl2SqlError::connectivity(format!("cannot open {}: {}", path, e))
    })
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn read_schema(conn: &Connection) -> Result<SchemaDescription> {
    let mut tables_stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let tables = tables_stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut columns_stmt =
        conn.prepare("SELECT name, type, pk, \"notnull\" FROM pragma_table_info(?1) ORDER BY cid")?;
    let mut schema = SchemaDescription::new();
    for table in tables {
        let columns = columns_stmt
            .query_map([&table], |row| {
                Ok(ColumnDef {
                    name: row.get(0)?,
                    data_type: row.get(1)?,
                    primary_key: row.get::<_, i64>(2)? > 0,
                    nullable: row.get::<_, i64>(3)? == 0,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        schema.tables.insert(table, columns);
    }
    Ok(schema)
}

fn check_statement(conn: &Connection, sql: &str) -> Validation {
    if sql.trim().is_empty() {
        return Validation::Invalid("empty SQL statement".to_string());
    }
    match conn.prepare(sql) {
        Ok(stmt) if stmt.readonly() => Validation::Valid,
        Ok(_) => Validation::Invalid("only read-only SELECT statements are allowed".to_string()),
        Err(rusqlite::Error::MultipleStatement) => {
            Validation::Invalid("multiple statements are not allowed".to_string())
        }
        Err(e) => Validation::Invalid(e.to_string()),
    }
}

/// Text values of the first column; other types are counted and skipped
fn read_names(conn: &Connection, sql: &str) -> Result<(Vec<String>, usize)> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;
    let mut names = Vec::new();
    let mut skipped = 0;
    while let Some(row) = rows.next()? {
        match row.get_ref(0)? {
            ValueRef::Text(t) => names.push(String::from_utf8_lossy(t).into_owned()),
            _ => skipped += 1,
        }
    }
    Ok((names, skipped))
}

fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(format!("<blob {} bytes>", b.len())),
    }
}

fn run_query(conn: &Connection, sql: &str) -> Result<Vec<Row>> {
    let mut stmt = conn.prepare(sql)?;
    let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Row::new();
        for (i, name) in names.iter().enumerate() {
            record.insert(name.clone(), value_to_json(row.get_ref(i)?));
        }
        out.push(record);
    }
    Ok(out)
}

#[async_trait]
impl SchemaProvider for SqliteDatabase {
    async fn fetch(&self, connection: &ConnectionHandle) -> Result<SchemaDescription> {
        let schema = Self::with_connection(connection, read_schema).await?;
        log::info!(
            "Loaded schema for {} ({} tables)",
            connection,
            schema.tables.len()
        );
        Ok(schema)
    }
}

#[async_trait]
impl SqlValidator for SqliteDatabase {
    async fn validate(&self, sql: &str, _schema: &SchemaDescription) -> Result<Validation> {
        let sql = sql.to_string();
        let result =
            Self::with_connection(&self.connection, move |conn| Ok(check_statement(conn, &sql)))
                .await?;
        if let Validation::Invalid(reason) = &result {
            log::warn!("SQL validation failed: {}", reason);
        }
        Ok(result)
    }
}

#[async_trait]
impl SqlExecutor for SqliteDatabase {
    async fn execute(&self, sql: &str, connection: &ConnectionHandle) -> Result<Vec<Row>> {
        let sql = sql.to_string();
        let rows = Self::with_connection(connection, move |conn| run_query(conn, &sql)).await?;
        log::info!("Query returned {} rows", rows.len());
        Ok(rows)
    }
}

#[async_trait]
impl NameSource for SqliteDatabase {
    async fn distinct_names(&self, column: &NameColumn) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT DISTINCT {col} FROM {table} WHERE {col} IS NOT NULL",
            col = quote_ident(&column.column),
            table = quote_ident(&column.table)
        );
        let (names, skipped) =
            Self::with_connection(&self.connection, move |conn| read_names(conn, &sql)).await?;
        if skipped > 0 {
            log::warn!(
                "Skipped {} non-text values in {}.{}",
                skipped,
                column.table,
                column.column
            );
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, SqliteDatabase) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feyod.sqlite");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE players (playerId INTEGER PRIMARY KEY, playerName TEXT NOT NULL, photo BLOB);
             CREATE TABLE goals (goalId INTEGER PRIMARY KEY, playerId INTEGER, minute REAL);
             INSERT INTO players VALUES (1, 'Santiago Giménez', x'0102'), (2, 'Sjaak Swart', NULL);
             INSERT INTO goals VALUES (1, 1, 12.5), (2, 1, 80.0), (3, 2, NULL);",
        )
        .unwrap();
        let db = SqliteDatabase::new(ConnectionHandle::new(format!(
            "sqlite:///{}",
            path.display()
        )));
        (dir, db)
    }

    #[tokio::test]
    async fn test_fetch_schema() {
        let (_dir, db) = fixture();
        let schema = db.fetch(db.connection()).await.unwrap();

        let players = schema.table("players").unwrap();
        assert_eq!(players.len(), 3);
        assert_eq!(players[0].name, "playerId");
        assert!(players[0].primary_key);
        assert!(!players[1].nullable);
        assert_eq!(players[1].data_type, "TEXT");
        assert!(schema.table("goals").is_some());
    }

    #[tokio::test]
    async fn test_unreachable_database_is_connectivity() {
        let db = SqliteDatabase::new(ConnectionHandle::new("/nonexistent/dir/missing.sqlite"));
        let err = db.fetch(db.connection()).await.unwrap_err();
        assert!(err.is_connectivity());
    }

    #[tokio::test]
    async fn test_validate() {
        let (_dir, db) = fixture();
        let schema = SchemaDescription::new();

        assert_eq!(
            db.validate("SELECT playerName FROM players", &schema)
                .await
                .unwrap(),
            Validation::Valid
        );

        match db.validate("SELECT nope FROM players", &schema).await.unwrap() {
            Validation::Invalid(reason) => assert!(reason.contains("no such column")),
            Validation::Valid => panic!("expected invalid"),
        }

        assert!(!db.validate("DELETE FROM players", &schema).await.unwrap().is_valid());
        assert!(!db.validate("   ", &schema).await.unwrap().is_valid());
        assert!(!db
            .validate("SELECT 1; SELECT 2", &schema)
            .await
            .unwrap()
            .is_valid());
    }

    #[tokio::test]
    async fn test_validate_does_not_execute() {
        let (_dir, db) = fixture();
        db.validate("SELECT COUNT(*) FROM goals", &SchemaDescription::new())
            .await
            .unwrap();
        let rows = db
            .execute("SELECT COUNT(*) AS n FROM goals", db.connection())
            .await
            .unwrap();
        assert_eq!(rows[0]["n"], 3);
    }

    #[tokio::test]
    async fn test_execute_converts_values() {
        let (_dir, db) = fixture();
        let rows = db
            .execute(
                "SELECT p.playerName, p.photo, g.minute FROM goals g JOIN players p ON p.playerId = g.playerId ORDER BY g.goalId",
                db.connection(),
            )
            .await
            .unwrap();

        assert_eq!(rows.len(), 3);
        let keys: Vec<&String> = rows[0].keys().collect();
        assert_eq!(keys, vec!["playerName", "photo", "minute"]);
        assert_eq!(rows[0]["playerName"], "Santiago Giménez");
        assert_eq!(rows[0]["photo"], "<blob 2 bytes>");
        assert_eq!(rows[0]["minute"], 12.5);
        assert!(rows[2]["minute"].is_null());
    }

    #[tokio::test]
    async fn test_execute_runtime_error() {
        let (_dir, db) = fixture();
        let err = db
            .execute("SELECT * FROM missing_table", db.connection())
            .await
            .unwrap_err();
        assert!(!err.is_connectivity());
    }

    #[tokio::test]
    async fn test_distinct_names() {
        let (_dir, db) = fixture();
        let mut names = db
            .distinct_names(&NameColumn::new("players", "playerName"))
            .await
            .unwrap();
        names.sort();
        assert_eq!(names, vec!["Santiago Giménez", "Sjaak Swart"]);
    }

    #[tokio::test]
    async fn test_distinct_names_skips_non_text() {
        let (dir, db) = fixture();
        let conn = Connection::open(dir.path().join("feyod.sqlite")).unwrap();
        conn.execute_batch(
            "CREATE TABLE clubs (clubName);
             INSERT INTO clubs VALUES ('Feyenoord'), (42), (x'00'), (NULL);",
        )
        .unwrap();

        let names = db
            .distinct_names(&NameColumn::new("clubs", "clubName"))
            .await
            .unwrap();
        assert_eq!(names, vec!["Feyenoord"]);
    }

    #[tokio::test]
    async fn test_distinct_names_missing_table_errors() {
        let (_dir, db) = fixture();
        assert!(db
            .distinct_names(&NameColumn::new("coaches", "coachName"))
            .await
            .is_err());
    }
}
