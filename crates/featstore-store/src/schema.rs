//! Database schema versioning.

use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use crate::error::Result;
use crate::query::QueryBuilder;

/// Current feature table schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Create the feature table described by `builder` if needed.
///
/// Several feature tables may share one database; each has its own row in
/// `schema_version`.
pub fn initialize(conn: &Connection, builder: &QueryBuilder) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            table_name TEXT PRIMARY KEY,
            version INTEGER NOT NULL
        );",
    )?;

    let version = get_schema_version(conn, builder.table())?;
    if version == 0 {
        debug!("Creating feature table {}", builder.table());
        conn.execute_batch(&builder.create_table_sql())?;
        set_schema_version(conn, builder.table(), SCHEMA_VERSION)?;
    }

    Ok(())
}

/// Forget the table so that the next [`initialize`] recreates it.
pub fn forget(conn: &Connection, table: &str) -> Result<()> {
    conn.execute("DELETE FROM schema_version WHERE table_name = ?1", [table])?;
    Ok(())
}

fn get_schema_version(conn: &Connection, table: &str) -> Result<i32> {
    let version = conn
        .query_row(
            "SELECT version FROM schema_version WHERE table_name = ?1",
            [table],
            |row| row.get(0),
        )
        .optional()?;
    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, table: &str, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (table_name, version) VALUES (?1, ?2)",
        rusqlite::params![table, version],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables(conn: &Connection) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_initialize_fresh_database() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn, &QueryBuilder::new("features")).unwrap();
        initialize(&conn, &QueryBuilder::new("systems")).unwrap();

        let tables = tables(&conn);
        assert!(tables.contains(&"features".to_string()));
        assert!(tables.contains(&"systems".to_string()));
        assert!(tables.contains(&"schema_version".to_string()));
    }

    #[test]
    fn test_schema_version_tracking() {
        let conn = Connection::open_in_memory().unwrap();
        let builder = QueryBuilder::new("features");
        initialize(&conn, &builder).unwrap();
        assert_eq!(get_schema_version(&conn, "features").unwrap(), SCHEMA_VERSION);
        assert_eq!(get_schema_version(&conn, "other").unwrap(), 0);

        // Idempotent
        initialize(&conn, &builder).unwrap();

        forget(&conn, "features").unwrap();
        assert_eq!(get_schema_version(&conn, "features").unwrap(), 0);
    }
}
