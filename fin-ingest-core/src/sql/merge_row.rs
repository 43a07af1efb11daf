//! Single-row merge through `INSERT ... ON CONFLICT`, with returning-with-fallback.
//!
//! When returning columns are requested the insert is wrapped so that the
//! statement yields the row whether it was inserted, updated, or skipped:
//!
//! ```text
//! WITH merged_row AS (INSERT ... ON CONFLICT ... RETURNING id)
//! SELECT * FROM merged_row
//! UNION ALL
//! SELECT id FROM target AS t
//!  WHERE t.k IS NOT DISTINCT FROM $n AND ... AND NOT EXISTS (SELECT NULL FROM merged_row)
//! ```
//!
//! Both branches run in one statement, so there is no window between the
//! write attempt and the read of the existing id.

use super::error::SqlError;
use super::executor::SqlExecutor;
use super::merge::{contains_column, dedup_by_name, log_statement, MergeMode, TARGET_ALIAS};
use super::param::Param;
use super::value::Statement;
use tracing::debug;

/// An ordered column-name to value mapping. Every value is bound as a parameter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamedRow(Vec<(String, Param)>);

impl NamedRow {
    /// Row with no columns.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`NamedRow::push`].
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Param>) -> Self {
        self.push(column, value);
        self
    }

    /// Append a column. Columns keep insertion order in the rendered statement.
    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Param>) {
        self.0.push((column.into(), value.into()));
    }

    /// Case-insensitive lookup, first match wins.
    pub fn get(&self, column: &str) -> Option<&Param> {
        self.0
            .iter()
            .find(|(c, _)| c.eq_ignore_ascii_case(column))
            .map(|(_, v)| v)
    }

    /// Column names in insertion order.
    pub fn columns(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.iter().map(|(c, _)| c.as_str())
    }

    /// Column-value pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &(String, Param)> + '_ {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<Param>> FromIterator<(K, V)> for NamedRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Description of one single-row merge.
#[derive(Debug, Clone, PartialEq)]
pub struct RowMerge {
    pub target: String,
    pub row: NamedRow,
    pub key: Vec<String>,
    pub returning: Vec<String>,
    pub mode: MergeMode,
}

impl RowMerge {
    /// Merge `row` into `target` in `Merge` mode, with no key and nothing returned.
    pub fn new(target: impl Into<String>, row: NamedRow) -> Self {
        Self {
            target: target.into(),
            row,
            key: Vec::new(),
            returning: Vec::new(),
            mode: MergeMode::default(),
        }
    }

    /// Conflict target. Must name columns of the row.
    pub fn key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Columns to read back, whether the row was written or already present.
    pub fn returning<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.returning = columns.into_iter().map(Into::into).collect();
        self
    }

    /// `Update` is rejected: `ON CONFLICT` has no update-only form.
    pub fn mode(mut self, mode: MergeMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Values read back from a returning merge.
#[derive(Debug, Clone, PartialEq)]
pub enum Returned {
    /// Exactly one column was requested.
    Scalar(Param),
    /// Several columns, in request order.
    Columns(Vec<(String, Param)>),
}

impl Returned {
    pub fn get(&self, column: &str) -> Option<&Param> {
        match self {
            Returned::Scalar(v) => Some(v),
            Returned::Columns(cols) => cols
                .iter()
                .find(|(c, _)| c.eq_ignore_ascii_case(column))
                .map(|(_, v)| v),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Returned::Scalar(v) => v.as_i64(),
            Returned::Columns(_) => None,
        }
    }
}

// Single-row merges support `Merge` and `Insert` only.
fn unsupported_mode(spec: &RowMerge) -> SqlError {
    SqlError::config(format!(
        "invalid or unsupported merge mode for single-row merge into '{}': {:?}",
        spec.target, spec.mode
    ))
}

/// Name of the CTE holding the inserted or updated row.
const RETURNED_CTE: &str = "merged_row";

/// Render the statement for a single-row merge.
pub fn build_merge_row(spec: &RowMerge) -> Result<Statement, SqlError> {
    let target = &spec.target;
    if spec.mode == MergeMode::Update {
        return Err(unsupported_mode(spec));
    }
    if spec.row.is_empty() {
        return Err(SqlError::config(format!("empty row for '{target}'")));
    }

    let key = dedup_by_name(&spec.key, String::as_str);
    let returning = dedup_by_name(&spec.returning, String::as_str);
    let needs_key = spec.mode == MergeMode::Merge || !returning.is_empty();

    if needs_key {
        if key.is_empty() {
            return Err(SqlError::config(format!(
                "single-row merge into '{target}' needs key columns"
            )));
        }
        if let Some(missing) = key.iter().find(|k| spec.row.get(k).is_none()) {
            return Err(SqlError::config(format!(
                "key column '{missing}' is not part of the row for '{target}'"
            )));
        }
    }

    let t = TARGET_ALIAS;
    let q = RETURNED_CTE;
    let mut stmt = Statement::new();

    let cols: Vec<&str> = spec.row.columns().collect();
    let vals: Vec<String> = spec.row.iter().map(|(_, v)| stmt.bind(v.clone())).collect();
    let mut insert = format!(
        "INSERT INTO {target} AS {t} ({}) VALUES ({})",
        cols.join(", "),
        vals.join(", ")
    );

    let key_list = key.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(", ");
    match spec.mode {
        MergeMode::Merge => {
            let update: Vec<&str> = cols
                .iter()
                .copied()
                .filter(|c| !contains_column(key.iter().map(|k| k.as_str()), c))
                .collect();
            if update.is_empty() {
                insert.push_str(&format!(" ON CONFLICT ({key_list}) DO NOTHING"));
            } else {
                let assign: Vec<String> =
                    update.iter().map(|c| format!("{c} = EXCLUDED.{c}")).collect();
                let guard: Vec<String> = update
                    .iter()
                    .map(|c| format!("{t}.{c} IS DISTINCT FROM EXCLUDED.{c}"))
                    .collect();
                insert.push_str(&format!(
                    " ON CONFLICT ({key_list}) DO UPDATE SET {} WHERE {}",
                    assign.join(", "),
                    guard.join(" OR ")
                ));
            }
        }
        MergeMode::Insert => insert.push_str(" ON CONFLICT DO NOTHING"),
        MergeMode::Update => return Err(unsupported_mode(spec)),
    }

    if returning.is_empty() {
        stmt.push_str(&insert);
    } else if target.eq_ignore_ascii_case(RETURNED_CTE) {
        return Err(SqlError::config(format!(
            "target '{target}' collides with the returning CTE name"
        )));
    } else {
        let ret_list = returning
            .iter()
            .map(|r| r.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let mut lookup = Vec::with_capacity(key.len());
        for k in &key {
            let value = spec.row.get(k).cloned().unwrap_or(Param::Null);
            lookup.push(format!("{t}.{k} IS NOT DISTINCT FROM {}", stmt.bind(value)));
        }
        stmt.push_str(&format!(
            "WITH {q} AS ({insert} RETURNING {ret_list}) \
             SELECT * FROM {q} UNION ALL \
             SELECT {ret_list} FROM {target} AS {t} \
             WHERE {} AND NOT EXISTS (SELECT NULL FROM {q})",
            lookup.join(" AND ")
        ));
    }

    stmt.push_str(";");
    Ok(stmt)
}

/// Merge one row. Returns the requested columns, or `None` when none were requested.
pub fn merge_row(
    exec: &mut impl SqlExecutor,
    spec: &RowMerge,
) -> Result<Option<Returned>, SqlError> {
    debug!("Merging row into: {}", spec.target);

    let stmt = build_merge_row(spec)?;
    log_statement(&stmt);

    if spec.returning.is_empty() {
        exec.execute(&stmt)?;
        debug!("Row merged");
        return Ok(None);
    }

    let missing = || SqlError::MissingReturnedRow {
        table: spec.target.clone(),
    };
    let values = exec.query_opt(&stmt)?.ok_or_else(missing)?;
    let returning = dedup_by_name(&spec.returning, String::as_str);

    let returned = if returning.len() == 1 {
        Returned::Scalar(values.into_iter().next().ok_or_else(missing)?)
    } else {
        if values.len() != returning.len() {
            return Err(missing());
        }
        Returned::Columns(
            returning
                .iter()
                .map(|c| c.to_string())
                .zip(values)
                .collect(),
        )
    };

    debug!("Return: {returned:?}");
    debug!("Row merged");
    Ok(Some(returned))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset_row(name: &str) -> NamedRow {
        NamedRow::new()
            .with("market", "CBR")
            .with("code", "USD")
            .with("name", name)
            .with("unit", None::<&str>)
    }

    #[test]
    fn merge_mode_updates_non_key_columns_with_guard() {
        let spec = RowMerge::new("assets", asset_row("CBR USD")).key(["market", "code"]);
        let stmt = build_merge_row(&spec).unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO assets AS t (market, code, name, unit) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (market, code) DO UPDATE SET name = EXCLUDED.name, unit = EXCLUDED.unit \
             WHERE t.name IS DISTINCT FROM EXCLUDED.name OR t.unit IS DISTINCT FROM EXCLUDED.unit;"
        );
        assert_eq!(stmt.params.len(), 4);
        assert_eq!(stmt.params[3], Param::Null);
    }

    #[test]
    fn insert_mode_does_nothing_on_conflict() {
        let spec = RowMerge::new("assets", asset_row("x"))
            .key(["market", "code"])
            .mode(MergeMode::Insert);
        let stmt = build_merge_row(&spec).unwrap();
        assert!(stmt.sql.ends_with("VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING;"));
    }

    #[test]
    fn insert_mode_without_returning_needs_no_key() {
        let spec = RowMerge::new("assets", asset_row("x")).mode(MergeMode::Insert);
        assert!(build_merge_row(&spec).is_ok());
    }

    #[test]
    fn update_mode_is_rejected() {
        let spec = RowMerge::new("assets", asset_row("x"))
            .key(["market", "code"])
            .mode(MergeMode::Update);
        assert!(build_merge_row(&spec).unwrap_err().is_config());
    }

    #[test]
    fn key_only_row_falls_back_to_do_nothing() {
        let row = NamedRow::new().with("market", "CBR").with("code", "USD");
        let spec = RowMerge::new("assets", row).key(["market", "code"]);
        let stmt = build_merge_row(&spec).unwrap();
        assert!(stmt.sql.ends_with("ON CONFLICT (market, code) DO NOTHING;"));
    }

    #[test]
    fn returning_wraps_insert_with_fallback_select() {
        let spec = RowMerge::new("assets", asset_row("CBR USD"))
            .key(["market", "code"])
            .returning(["id"]);
        let stmt = build_merge_row(&spec).unwrap();
        assert!(stmt.sql.starts_with("WITH merged_row AS (INSERT INTO assets AS t"));
        assert!(stmt.sql.contains(" RETURNING id) SELECT * FROM merged_row UNION ALL SELECT id FROM assets AS t WHERE "));
        assert!(stmt.sql.ends_with(
            "WHERE t.market IS NOT DISTINCT FROM $5 AND t.code IS NOT DISTINCT FROM $6 \
             AND NOT EXISTS (SELECT NULL FROM merged_row);"
        ));
        assert_eq!(stmt.params.len(), 6);
        assert_eq!(stmt.params[4], Param::from("CBR"));
        assert_eq!(stmt.params[5], Param::from("USD"));
        assert_eq!(stmt.placeholder_count(), stmt.params.len());
    }

    #[test]
    fn target_named_like_the_cte_is_rejected() {
        let row = NamedRow::new().with("dt", "2024-01-02").with("v", 1i64);
        let spec = RowMerge::new("Merged_Row", row.clone()).key(["dt"]).returning(["dt"]);
        assert!(build_merge_row(&spec).unwrap_err().is_config());

        // Without RETURNING there is no CTE to collide with.
        let spec = RowMerge::new("merged_row", row).key(["dt"]);
        assert!(build_merge_row(&spec).is_ok());

        let spec = RowMerge::new("q", asset_row("x")).key(["market", "code"]).returning(["id"]);
        assert!(build_merge_row(&spec).unwrap().sql.contains("SELECT id FROM q AS t WHERE"));
    }

    #[test]
    fn key_missing_from_row_is_rejected() {
        let spec = RowMerge::new("assets", asset_row("x"))
            .key(["market", "ticker"])
            .returning(["id"]);
        let err = build_merge_row(&spec).unwrap_err();
        assert!(err.to_string().contains("ticker"));
    }

    #[test]
    fn merge_mode_without_key_is_rejected() {
        let spec = RowMerge::new("assets", asset_row("x"));
        assert!(build_merge_row(&spec).unwrap_err().is_config());
    }

    #[test]
    fn key_lookup_is_case_insensitive() {
        let spec = RowMerge::new("assets", asset_row("x")).key(["MARKET", "Code"]);
        let stmt = build_merge_row(&spec).unwrap();
        assert!(stmt.sql.contains("DO UPDATE SET name = EXCLUDED.name, unit = EXCLUDED.unit"));
    }

    #[test]
    fn returned_accessors() {
        let r = Returned::Columns(vec![
            ("id".into(), Param::Int(3)),
            ("name".into(), Param::from("x")),
        ]);
        assert_eq!(r.get("ID"), Some(&Param::Int(3)));
        assert_eq!(r.as_i64(), None);
        assert_eq!(Returned::Scalar(Param::Int(3)).as_i64(), Some(3));
    }
}
