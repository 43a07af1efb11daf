//! Refresh the materialized views built over the ingested tables.

use super::TaskError;
use crate::config::Settings;
use fin_ingest_core::sql::{connect, SqlExecutor, Statement};
use tracing::info;

pub const PROFILE: &str = "refresh";

/// Stored procedure that refreshes every reporting view.
pub const REFRESH_PROCEDURE: &str = "refresh_mv";

/// Call the refresh procedure. The procedure manages its own transactions,
/// so `exec` should be a plain client rather than an open transaction.
pub fn refresh(exec: &mut impl SqlExecutor) -> Result<(), TaskError> {
    info!("Refreshing materialized views");
    let stmt = Statement {
        sql: format!("CALL {REFRESH_PROCEDURE}();"),
        params: Vec::new(),
    };
    exec.execute(&stmt)?;
    Ok(())
}

pub fn run(settings: &Settings) -> Result<(), TaskError> {
    let mut client = connect(&settings.db)?;
    refresh(&mut client)
}
