//! Set-based merge of a staging set into a target table.
//!
//! Generates a single `MERGE` statement:
//!
//! ```text
//! MERGE INTO target AS t USING source AS s ON (t.k = s.k AND ...)
//!  WHEN NOT MATCHED THEN INSERT (k, ..., d, ...) VALUES (s.k, ..., s.d, ...)
//!  WHEN MATCHED AND (t.d IS DISTINCT FROM s.d OR ...) THEN UPDATE SET d = s.d, ...
//! ```
//!
//! The distinct-from guard keeps unchanged rows untouched, so re-running a
//! merge over identical data writes nothing.

use super::error::SqlError;
use super::executor::SqlExecutor;
use super::value::{render_value, SqlValue, Statement};
use tracing::debug;

pub const TARGET_ALIAS: &str = "t";
pub const SOURCE_ALIAS: &str = "s";

/// Which clauses a merge emits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MergeMode {
    /// Insert missing rows, update changed ones.
    #[default]
    Merge,
    /// Insert missing rows, leave existing ones alone.
    Insert,
    /// Update existing rows, never insert.
    Update,
}

/// Column name paired with the value written for it.
pub type Keyed = (String, SqlValue);

/// Case-insensitive membership test for column names.
pub(crate) fn contains_column<'a>(
    names: impl IntoIterator<Item = &'a str>,
    name: &str,
) -> bool {
    names.into_iter().any(|n| n.eq_ignore_ascii_case(name))
}

/// Drop repeated names, keeping the first occurrence and the original order.
pub(crate) fn dedup_by_name<T>(items: &[T], name: impl Fn(&T) -> &str) -> Vec<&T> {
    let mut out: Vec<&T> = Vec::with_capacity(items.len());
    for item in items {
        if !contains_column(out.iter().map(|o| name(*o)), name(item)) {
            out.push(item);
        }
    }
    out
}

/// Description of one set-based merge.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeSpec {
    pub target: String,
    pub source: String,
    /// Key columns; matched by equality against the target.
    pub on: Vec<Keyed>,
    /// Data columns; inserted and, when changed, updated.
    pub data: Vec<Keyed>,
    pub mode: MergeMode,
}

impl MergeSpec {
    /// Merge from `source` (a table or staging table) into `target`.
    pub fn new(target: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            source: source.into(),
            on: Vec::new(),
            data: Vec::new(),
            mode: MergeMode::default(),
        }
    }

    /// Key column taken from the source column of the same name.
    pub fn on_column(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.on.push((name.clone(), SqlValue::Column(name)));
        self
    }

    /// Key column fixed to a value for every source row.
    pub fn on_value(mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.on.push((name.into(), value.into()));
        self
    }

    /// Data columns taken from the source columns of the same names.
    pub fn data_columns<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            self.data.push((name.clone(), SqlValue::Column(name)));
        }
        self
    }

    /// Data column set to a value for every source row.
    pub fn data_value(mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.data.push((name.into(), value.into()));
        self
    }

    /// `Insert` drops the update clause, `Update` the insert clause.
    pub fn mode(mut self, mode: MergeMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Result of [`merge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Nothing to insert or update; no statement was sent.
    Skipped,
    /// The statement ran and touched this many rows.
    Merged { rows: u64 },
}

/// Render the merge statement, or `None` when the merge is a no-op.
pub fn build_merge(spec: &MergeSpec) -> Result<Option<Statement>, SqlError> {
    let on = dedup_by_name(&spec.on, |(n, _)| n.as_str());
    let data: Vec<&Keyed> = dedup_by_name(&spec.data, |(n, _)| n.as_str())
        .into_iter()
        .filter(|(n, _)| !contains_column(on.iter().map(|(k, _)| k.as_str()), n))
        .collect();

    let mut insert: Vec<&Keyed> = on.iter().chain(data.iter()).copied().collect();
    let mut update: Vec<&Keyed> = data.clone();

    match spec.mode {
        MergeMode::Merge => {}
        MergeMode::Insert => update.clear(),
        MergeMode::Update => insert.clear(),
    }

    if insert.is_empty() && update.is_empty() {
        return Ok(None);
    }
    if on.is_empty() {
        return Err(SqlError::config(format!(
            "merge into '{}' needs at least one key column",
            spec.target
        )));
    }

    let (t, s) = (TARGET_ALIAS, SOURCE_ALIAS);
    let mut stmt = Statement::new();

    let on_sql: Vec<String> = on
        .iter()
        .map(|(col, val)| format!("{t}.{col} = {}", render_value(val, Some(s), &mut stmt)))
        .collect();
    let head = format!(
        "MERGE INTO {} AS {t} USING {} AS {s} ON ({})",
        spec.target,
        spec.source,
        on_sql.join(" AND ")
    );
    stmt.push_str(&head);

    if !insert.is_empty() {
        let cols: Vec<&str> = insert.iter().map(|(c, _)| c.as_str()).collect();
        let vals: Vec<String> = insert
            .iter()
            .map(|(_, v)| render_value(v, Some(s), &mut stmt))
            .collect();
        let clause = format!(
            " WHEN NOT MATCHED THEN INSERT ({}) VALUES ({})",
            cols.join(", "),
            vals.join(", ")
        );
        stmt.push_str(&clause);
    }

    if !update.is_empty() {
        let guard: Vec<String> = update
            .iter()
            .map(|(c, v)| {
                format!("{t}.{c} IS DISTINCT FROM {}", render_value(v, Some(s), &mut stmt))
            })
            .collect();
        let assign: Vec<String> = update
            .iter()
            .map(|(c, v)| format!("{c} = {}", render_value(v, Some(s), &mut stmt)))
            .collect();
        let clause = format!(
            " WHEN MATCHED AND ({}) THEN UPDATE SET {}",
            guard.join(" OR "),
            assign.join(", ")
        );
        stmt.push_str(&clause);
    }

    stmt.push_str(";");
    Ok(Some(stmt))
}

pub(crate) fn log_statement(stmt: &Statement) {
    debug!("Query: {}", stmt.sql);
    if !stmt.params.is_empty() {
        let params: Vec<String> = stmt.params.iter().map(ToString::to_string).collect();
        debug!("Params: [{}]", params.join(", "));
    }
}

/// Merge `spec.source` into `spec.target`.
pub fn merge(exec: &mut impl SqlExecutor, spec: &MergeSpec) -> Result<MergeOutcome, SqlError> {
    debug!("Merging into: {}, from: {}", spec.target, spec.source);

    let Some(stmt) = build_merge(spec)? else {
        debug!("Nothing to merge");
        return Ok(MergeOutcome::Skipped);
    };

    log_statement(&stmt);
    let rows = exec.execute(&stmt)?;
    debug!("Merge done, {rows} rows affected");

    Ok(MergeOutcome::Merged { rows })
}
