//! Execution seam between the statement builders and a live connection.
//!
//! The engine only ever needs two primitives: run a statement, or run a
//! statement and read at most one row back. Abstracting them lets the merge
//! protocol be tested against a recording executor and run for real against
//! a `postgres` client or transaction.

use super::error::SqlError;
use super::param::Param;
use super::value::Statement;
use postgres::types::ToSql;

/// Executes rendered statements within one caller-owned session/transaction.
pub trait SqlExecutor {
    /// Run a statement, returning the number of affected rows.
    fn execute(&mut self, stmt: &Statement) -> Result<u64, SqlError>;

    /// Run a statement and return its first row, if any.
    fn query_opt(&mut self, stmt: &Statement) -> Result<Option<Vec<Param>>, SqlError>;
}

fn bind_refs(params: &[Param]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

fn decode_row(row: &postgres::Row) -> Result<Vec<Param>, SqlError> {
    (0..row.len())
        .map(|i| row.try_get::<_, Param>(i).map_err(SqlError::from))
        .collect()
}

impl SqlExecutor for postgres::Client {
    fn execute(&mut self, stmt: &Statement) -> Result<u64, SqlError> {
        Ok(postgres::Client::execute(self, stmt.sql.as_str(), &bind_refs(&stmt.params))?)
    }

    fn query_opt(&mut self, stmt: &Statement) -> Result<Option<Vec<Param>>, SqlError> {
        postgres::Client::query_opt(self, stmt.sql.as_str(), &bind_refs(&stmt.params))?
            .as_ref()
            .map(decode_row)
            .transpose()
    }
}

impl SqlExecutor for postgres::Transaction<'_> {
    fn execute(&mut self, stmt: &Statement) -> Result<u64, SqlError> {
        Ok(postgres::Transaction::execute(self, stmt.sql.as_str(), &bind_refs(&stmt.params))?)
    }

    fn query_opt(&mut self, stmt: &Statement) -> Result<Option<Vec<Param>>, SqlError> {
        postgres::Transaction::query_opt(self, stmt.sql.as_str(), &bind_refs(&stmt.params))?
            .as_ref()
            .map(decode_row)
            .transpose()
    }
}

impl<E: SqlExecutor + ?Sized> SqlExecutor for &mut E {
    fn execute(&mut self, stmt: &Statement) -> Result<u64, SqlError> {
        (**self).execute(stmt)
    }

    fn query_opt(&mut self, stmt: &Statement) -> Result<Option<Vec<Param>>, SqlError> {
        (**self).query_opt(stmt)
    }
}
