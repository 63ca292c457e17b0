//! The SQL bridge: embedded-SQL execution and row-to-field marshaling
//! (§4.5), grounded on `processCmd`/`_execSql`.
//!
//! A task holds at most one connection, checked out at task start and
//! returned at task end. Every `EXEC SQL` statement in the artifact's
//! token stream becomes one call to [`SqlBridge::execute`]; `BEGIN`,
//! `COMMIT` and `ROLLBACK` are handled by the caller driving the
//! underlying connection directly rather than through this bridge, since
//! they carry no host-variable bindings.

use crate::error::{Error, Result};
use crate::field::Field;
use crate::pool::Connection;

/// Standard `SQLCODE`/`SQLSTATE` pair the bridge reports after a
/// statement, mirrored into the artifact's SQL communication area by the
/// caller (`setSQLCA`, §4.5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SqlStatus {
    pub code: i32,
    pub state: [u8; 5],
}

impl SqlStatus {
    pub const OK: SqlStatus = SqlStatus { code: 0, state: *b"00000" };
    pub const NOT_FOUND: SqlStatus = SqlStatus { code: 100, state: *b"02000" };

    pub fn error(code: i32) -> Self {
        SqlStatus { code, state: *b"HV000" }
    }

    /// Writes this status into the SQL Status Area field the artifact
    /// registered (§3): the signed code as a 4-byte big-endian integer
    /// in the first four bytes, the 5-character state at bytes 119..123.
    pub fn write_to(&self, field: &mut Field) -> Result<()> {
        let bytes = field.as_bytes_mut();
        if bytes.len() < 124 {
            return Err(Error::InvalidLength("SQL status area shorter than 124 bytes"));
        }
        bytes[0..4].copy_from_slice(&self.code.to_be_bytes());
        bytes[119..124].copy_from_slice(&self.state);
        Ok(())
    }
}

/// Runs one embedded SQL statement against `conn`, binding `params` as
/// positional host variables and writing the first result row (if any)
/// into `into_fields` in column order.
///
/// The command/query branch is keyed on whether `into_fields` is empty
/// rather than on the SQL text (§4.5: "If no output fields are bound,
/// execute as a command... If outputs are bound, execute as a query"):
/// a statement with no output fields always reports `OK` regardless of
/// affected-row count; a statement with bound outputs reports
/// [`SqlStatus::NOT_FOUND`] on zero rows and `OK` otherwise.
pub fn execute(conn: &mut dyn Connection, sql: &str, params: &[&str], into_fields: &mut [Field]) -> Result<SqlStatus> {
    let result = conn.query(sql, params).map_err(|e| match e {
        Error::Database(msg) => Error::Database(msg),
        other => other,
    })?;

    if into_fields.is_empty() {
        return Ok(SqlStatus::OK);
    }

    if result.is_empty() {
        return Ok(SqlStatus::NOT_FOUND);
    }

    if let Some(row) = result.rows.first() {
        for (field, value) in into_fields.iter_mut().zip(row.iter()) {
            match value {
                Some(text) => field.set_from_text(text)?,
                None => field.set_from_text("")?,
            }
        }
    }

    Ok(SqlStatus::OK)
}
