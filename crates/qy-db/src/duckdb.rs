//! DuckDB database backend implementation

use crate::error::{DbError, DbResult};
use crate::traits::{ColumnInfo, Database};
use async_trait::async_trait;
use duckdb::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// DuckDB database backend
pub struct DuckDbBackend {
    conn: Mutex<Connection>,
}

impl DuckDbBackend {
    /// Create a new in-memory DuckDB connection
    pub fn in_memory() -> DbResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create a new DuckDB connection from a file path
    pub fn from_path(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path).map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create from path string (handles :memory: special case)
    pub fn new(path: &str) -> DbResult<Self> {
        if path == ":memory:" {
            Self::in_memory()
        } else {
            Self::from_path(Path::new(path))
        }
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))
    }

    fn execute_sync(&self, sql: &str) -> DbResult<usize> {
        let conn = self.lock()?;
        conn.execute(sql, [])
            .map_err(|e| DbError::ExecutionError(format!("{}: {}", e, sql)))
    }

    fn execute_batch_sync(&self, sql: &str) -> DbResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(sql)
            .map_err(|e| DbError::ExecutionError(e.to_string()))
    }

    fn query_count_sync(&self, sql: &str) -> DbResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM ({})", sql), [], |row| {
                row.get(0)
            })
            .map_err(|e| DbError::ExecutionError(e.to_string()))?;
        Ok(count as usize)
    }

    /// Split `schema.table` into catalog lookup parts, defaulting to `main`
    fn split_relation(name: &str) -> (&str, &str) {
        match name.rfind('.') {
            Some(pos) => (&name[..pos], &name[pos + 1..]),
            None => ("main", name),
        }
    }

    fn relation_exists_sync(&self, name: &str) -> DbResult<bool> {
        let conn = self.lock()?;
        let (schema, table) = Self::split_relation(name);

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = ? AND table_name = ?",
                [schema, table],
                |row| row.get(0),
            )
            .map_err(|e| DbError::ExecutionError(e.to_string()))?;

        Ok(count > 0)
    }

    fn table_columns_sync(&self, name: &str) -> DbResult<Vec<ColumnInfo>> {
        let conn = self.lock()?;
        let (schema, table) = Self::split_relation(name);

        let mut stmt = conn
            .prepare(
                "SELECT column_name, data_type FROM information_schema.columns \
                 WHERE table_schema = ? AND table_name = ? ORDER BY ordinal_position",
            )
            .map_err(|e| DbError::ExecutionError(e.to_string()))?;

        let rows = stmt
            .query_map([schema, table], |row| {
                Ok(ColumnInfo {
                    name: row.get(0)?,
                    data_type: row.get(1)?,
                })
            })
            .map_err(|e| DbError::ExecutionError(e.to_string()))?;

        let mut columns = Vec::new();
        for row in rows {
            columns.push(row.map_err(|e| DbError::ExecutionError(e.to_string()))?);
        }
        if columns.is_empty() {
            return Err(DbError::TableNotFound(name.to_string()));
        }
        Ok(columns)
    }
}

#[async_trait]
impl Database for DuckDbBackend {
    async fn execute(&self, sql: &str) -> DbResult<usize> {
        self.execute_sync(sql)
    }

    async fn execute_batch(&self, sql: &str) -> DbResult<()> {
        self.execute_batch_sync(sql)
    }

    async fn create_table_as(&self, name: &str, select: &str, replace: bool) -> DbResult<()> {
        let sql = if replace {
            format!("CREATE OR REPLACE TABLE {} AS {}", name, select)
        } else {
            format!("CREATE TABLE {} AS {}", name, select)
        };
        self.execute_sync(&sql)?;
        Ok(())
    }

    async fn create_view_as(&self, name: &str, select: &str, replace: bool) -> DbResult<()> {
        let sql = if replace {
            format!("CREATE OR REPLACE VIEW {} AS {}", name, select)
        } else {
            format!("CREATE VIEW {} AS {}", name, select)
        };
        self.execute_sync(&sql)?;
        Ok(())
    }

    async fn relation_exists(&self, name: &str) -> DbResult<bool> {
        self.relation_exists_sync(name)
    }

    async fn table_columns(&self, name: &str) -> DbResult<Vec<ColumnInfo>> {
        self.table_columns_sync(name)
    }

    async fn query_count(&self, sql: &str) -> DbResult<usize> {
        self.query_count_sync(sql)
    }

    async fn load_csv(&self, table: &str, path: &str) -> DbResult<()> {
        let sql = format!(
            "CREATE OR REPLACE TABLE {} AS SELECT * FROM read_csv_auto('{}')",
            table,
            path.replace('\'', "''")
        );
        self.execute_sync(&sql)
            .map_err(|e| DbError::CsvError(e.to_string()))?;
        Ok(())
    }

    async fn drop_if_exists(&self, name: &str) -> DbResult<()> {
        // Views and tables live in the same namespace; try both.
        let _ = self.execute_sync(&format!("DROP VIEW IF EXISTS {}", name));
        let _ = self.execute_sync(&format!("DROP TABLE IF EXISTS {}", name));
        Ok(())
    }

    async fn create_schema_if_not_exists(&self, schema: &str) -> DbResult<()> {
        self.execute_sync(&format!("CREATE SCHEMA IF NOT EXISTS {}", schema))?;
        Ok(())
    }

    fn db_type(&self) -> &'static str {
        "duckdb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory() {
        let db = DuckDbBackend::in_memory().unwrap();
        assert_eq!(db.db_type(), "duckdb");
    }

    #[tokio::test]
    async fn test_create_table_as() {
        let db = DuckDbBackend::in_memory().unwrap();
        db.create_table_as("test_table", "SELECT 1 AS id, 'hello' AS name", false)
            .await
            .unwrap();

        assert!(db.relation_exists("test_table").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_view_as() {
        let db = DuckDbBackend::in_memory().unwrap();
        db.create_view_as("test_view", "SELECT 1 AS id", false)
            .await
            .unwrap();

        assert!(db.relation_exists("test_view").await.unwrap());
    }

    #[tokio::test]
    async fn test_query_count() {
        let db = DuckDbBackend::in_memory().unwrap();
        db.execute_batch("CREATE TABLE nums AS SELECT * FROM range(10) t(n)")
            .await
            .unwrap();

        let count = db.query_count("SELECT * FROM nums").await.unwrap();
        assert_eq!(count, 10);
    }

    #[tokio::test]
    async fn test_relation_not_exists() {
        let db = DuckDbBackend::in_memory().unwrap();
        assert!(!db.relation_exists("nonexistent").await.unwrap());
    }

    #[tokio::test]
    async fn test_table_columns_ordered() {
        let db = DuckDbBackend::in_memory().unwrap();
        db.create_table_as(
            "shaped",
            "SELECT 1 AS id, 'x' AS label, CAST(2.5 AS DOUBLE) AS score",
            false,
        )
        .await
        .unwrap();

        let cols = db.table_columns("shaped").await.unwrap();
        let names: Vec<&str> = cols.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "label", "score"]);
    }

    #[tokio::test]
    async fn test_table_columns_missing_relation() {
        let db = DuckDbBackend::in_memory().unwrap();
        assert!(matches!(
            db.table_columns("ghost").await,
            Err(DbError::TableNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_drop_if_exists() {
        let db = DuckDbBackend::in_memory().unwrap();
        db.create_table_as("to_drop", "SELECT 1 AS id", false)
            .await
            .unwrap();
        assert!(db.relation_exists("to_drop").await.unwrap());

        db.drop_if_exists("to_drop").await.unwrap();
        assert!(!db.relation_exists("to_drop").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_schema_if_not_exists() {
        let db = DuckDbBackend::in_memory().unwrap();
        db.create_schema_if_not_exists("staging").await.unwrap();
        db.create_table_as("staging.test_table", "SELECT 1 AS id", false)
            .await
            .unwrap();

        assert!(db.relation_exists("staging.test_table").await.unwrap());

        db.create_schema_if_not_exists("staging").await.unwrap();
    }

    #[tokio::test]
    async fn test_load_csv() {
        let db = DuckDbBackend::in_memory().unwrap();
        let dir = std::env::temp_dir().join(format!("qy-db-csv-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let csv = dir.join("seed.csv");
        std::fs::write(&csv, "id,name\n1,alpha\n2,beta\n").unwrap();

        db.load_csv("seeded", csv.to_str().unwrap()).await.unwrap();
        let count = db.query_count("SELECT * FROM seeded").await.unwrap();
        assert_eq!(count, 2);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
