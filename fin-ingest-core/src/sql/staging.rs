//! Bulk loader: session-scoped staging tables and paged multi-row inserts.

use super::column::{column_list, ColumnDef};
use super::error::SqlError;
use super::executor::SqlExecutor;
use super::param::Param;
use super::value::Statement;
use tracing::debug;

/// Rows per `INSERT ... VALUES` statement.
pub const PAGE_SIZE: usize = 1000;

/// Upper bound on bound parameters in one statement (wire protocol limit).
pub const MAX_PARAMS: usize = 65_535;

/// A positional row matching a staging column list.
pub type Row = Vec<Param>;

/// What happens to a temporary table when its transaction commits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OnCommit {
    #[default]
    Drop,
    DeleteRows,
    PreserveRows,
}

impl OnCommit {
    fn as_sql(self) -> &'static str {
        match self {
            OnCommit::Drop => "DROP",
            OnCommit::DeleteRows => "DELETE ROWS",
            OnCommit::PreserveRows => "PRESERVE ROWS",
        }
    }
}

/// Handle to a created staging table.
#[derive(Debug, Clone, PartialEq)]
pub struct StagingTable {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl StagingTable {
    pub fn column_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.columns.iter().map(|c| c.name)
    }
}

/// `CREATE TEMPORARY TABLE` statement text.
pub fn build_create_staging(name: &str, columns: &[ColumnDef], on_commit: OnCommit) -> Statement {
    let cols = columns.iter().map(ColumnDef::ddl).collect::<Vec<_>>().join(", ");
    Statement {
        sql: format!(
            "CREATE TEMPORARY TABLE {name} ({cols}) ON COMMIT {};",
            on_commit.as_sql()
        ),
        params: Vec::new(),
    }
}

/// Create a staging table visible only to the current session.
pub fn create_staging(
    exec: &mut impl SqlExecutor,
    name: &str,
    columns: &[ColumnDef],
    on_commit: OnCommit,
) -> Result<StagingTable, SqlError> {
    if columns.is_empty() {
        return Err(SqlError::config(format!(
            "staging table '{name}' needs at least one column"
        )));
    }

    debug!("Creating temp table: {name}");
    let stmt = build_create_staging(name, columns, on_commit);
    debug!("Query: {}", stmt.sql);
    exec.execute(&stmt)?;

    Ok(StagingTable {
        name: name.to_string(),
        columns: columns.to_vec(),
    })
}

/// Rows per page for a given column count.
pub fn page_size(column_count: usize) -> usize {
    PAGE_SIZE.min(MAX_PARAMS / column_count.max(1)).max(1)
}

/// Build the paged insert statements for `rows`. Validates every row first.
pub fn build_load_statements(
    table: &str,
    columns: &[&str],
    rows: &[Row],
) -> Result<Vec<Statement>, SqlError> {
    if columns.is_empty() {
        return Err(SqlError::config(format!("no columns to load into '{table}'")));
    }
    if let Some((index, row)) = rows
        .iter()
        .enumerate()
        .find(|(_, row)| row.len() != columns.len())
    {
        return Err(SqlError::RowArity {
            index,
            expected: columns.len(),
            actual: row.len(),
        });
    }

    let head = format!(
        "INSERT INTO {table} ({}) VALUES ",
        column_list(columns.iter().copied())
    );

    Ok(rows
        .chunks(page_size(columns.len()))
        .map(|page| {
            let mut stmt = Statement::new();
            stmt.push_str(&head);
            for (i, row) in page.iter().enumerate() {
                if i > 0 {
                    stmt.push_str(", ");
                }
                let values: Vec<String> = row.iter().map(|v| stmt.bind(v.clone())).collect();
                stmt.push_str(&format!("({})", values.join(", ")));
            }
            stmt.push_str(";");
            stmt
        })
        .collect())
}

/// Bulk-append rows to a staging table. Row order is not preserved by the table.
pub fn load_rows(
    exec: &mut impl SqlExecutor,
    staging: &StagingTable,
    rows: &[Row],
) -> Result<u64, SqlError> {
    let columns: Vec<&str> = staging.column_names().collect();
    load_into(exec, &staging.name, &columns, rows)
}

/// Bulk-append rows into any table with an explicit column list.
pub fn load_into(
    exec: &mut impl SqlExecutor,
    table: &str,
    columns: &[&str],
    rows: &[Row],
) -> Result<u64, SqlError> {
    debug!("Inserting data into table: {table}");
    let statements = build_load_statements(table, columns, rows)?;

    let mut inserted = 0;
    for stmt in &statements {
        inserted += exec.execute(stmt)?;
    }
    debug!("Inserted {inserted} rows in {} pages", statements.len());
    Ok(inserted)
}
