//! Database connection pool contract (§4.5).
//!
//! The monitor needs exactly one capability from its surrounding
//! database: hand a task a connection to run statements on, and take it
//! back when the task is done. [`ConnectionPool`] is the narrow trait
//! that expresses that; [`PostgresPool`] is the concrete, feature-gated
//! implementation backed by `r2d2_postgres`, the same pairing the
//! original wires up with its own `setUpPool`.
//!
//! A task checks a connection out once, at task start, and returns it at
//! task end — exactly as `execTransaction`/`returnDBConnection` do
//! around the original's per-task dialogue.

use crate::error::{Error, Result};

/// A checked-out database connection, abstracted to what the SQL bridge
/// needs: run a statement, fetch rows, and know whether a command (not a
/// query) affected any rows.
pub trait Connection: Send {
    /// Executes `sql` with positional `$1, $2, ...`-style parameters and
    /// returns the result rows. Used for both `SELECT` and DML; DML
    /// returns zero rows.
    fn query(&mut self, sql: &str, params: &[&str]) -> Result<QueryResult>;
}

/// The rows (if any) and affected-row count of one statement execution.
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
    pub rows_affected: u64,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A pool that hands out [`Connection`]s, checked out for the duration
/// of one task (§4.5: one connection per transaction, held across every
/// embedded SQL statement in that task, returned at task end).
pub trait ConnectionPool: Send + Sync {
    fn get(&self) -> Result<Box<dyn Connection>>;
}

#[cfg(feature = "postgres-backend")]
pub use postgres_backend::PostgresPool;

#[cfg(feature = "postgres-backend")]
mod postgres_backend {
    use super::*;
    use postgres::NoTls;
    use r2d2_postgres::PostgresConnectionManager;

    type ManagedPool = r2d2::Pool<PostgresConnectionManager<NoTls>>;
    type PooledConn = r2d2::PooledConnection<PostgresConnectionManager<NoTls>>;

    /// A `postgres`/`r2d2`-backed pool, built from a libpq connection
    /// string (§6 `DB_CONNECT_STRING`).
    pub struct PostgresPool {
        inner: ManagedPool,
    }

    impl PostgresPool {
        pub fn connect(connect_string: &str, max_size: u32) -> Result<Self> {
            let manager = connect_string
                .parse()
                .map(|config| PostgresConnectionManager::new(config, NoTls))
                .map_err(|e| Error::Database(e.to_string()))?;
            let inner = r2d2::Pool::builder()
                .max_size(max_size)
                .build(manager)
                .map_err(|e| Error::Database(e.to_string()))?;
            Ok(PostgresPool { inner })
        }
    }

    impl ConnectionPool for PostgresPool {
        fn get(&self) -> Result<Box<dyn Connection>> {
            let conn = self.inner.get().map_err(|e| Error::Database(e.to_string()))?;
            Ok(Box::new(PostgresConnection { conn }))
        }
    }

    struct PostgresConnection {
        conn: PooledConn,
    }

    impl Connection for PostgresConnection {
        fn query(&mut self, sql: &str, params: &[&str]) -> Result<QueryResult> {
            let param_refs: Vec<&(dyn postgres::types::ToSql + Sync)> =
                params.iter().map(|p| p as &(dyn postgres::types::ToSql + Sync)).collect();
            let rows = self.conn.query(sql, &param_refs).map_err(|e| Error::Database(e.to_string()))?;

            let columns = rows.first().map(|r| r.columns().iter().map(|c| c.name().to_string()).collect()).unwrap_or_default();

            let mut out_rows = Vec::with_capacity(rows.len());
            for row in &rows {
                let mut values = Vec::with_capacity(row.len());
                for i in 0..row.len() {
                    let v: Option<String> = row.try_get(i).unwrap_or(None);
                    values.push(v);
                }
                out_rows.push(values);
            }

            Ok(QueryResult { columns, rows_affected: out_rows.len() as u64, rows: out_rows })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// An in-memory fake used by the interpreter/sql tests so they don't
    /// need a live database.
    struct FakeConnection {
        scripted: std::sync::Arc<Mutex<Vec<QueryResult>>>,
    }

    impl Connection for FakeConnection {
        fn query(&mut self, _sql: &str, _params: &[&str]) -> Result<QueryResult> {
            let mut scripted = self.scripted.lock().unwrap();
            if scripted.is_empty() {
                return Ok(QueryResult { columns: vec![], rows: vec![], rows_affected: 0 });
            }
            Ok(scripted.remove(0))
        }
    }

    pub struct FakeConnectionPool {
        pub scripted: std::sync::Arc<Mutex<Vec<QueryResult>>>,
    }

    impl ConnectionPool for FakeConnectionPool {
        fn get(&self) -> Result<Box<dyn Connection>> {
            Ok(Box::new(FakeConnection { scripted: self.scripted.clone() }))
        }
    }

    #[test]
    fn fake_pool_returns_scripted_result_then_empty() {
        let pool = FakeConnectionPool {
            scripted: std::sync::Arc::new(Mutex::new(vec![QueryResult {
                columns: vec!["A".into()],
                rows: vec![vec![Some("1".into())]],
                rows_affected: 1,
            }])),
        };
        let mut conn = pool.get().unwrap();
        let got = conn.query("SELECT 1", &[]).unwrap();
        assert!(!got.is_empty());
        let got2 = conn.query("SELECT 1", &[]).unwrap();
        assert!(got2.is_empty());
    }
}
