//! Typed SQL values and the pure functions that render them into statement text.
//!
//! Every value that reaches SQL text goes through [`render_value`]. Bound
//! parameters are pushed onto the statement's parameter list at the exact
//! moment their placeholder is written, so placeholder numbering and the
//! parameter list can never drift apart, even when the same value is
//! emitted several times (insert values, change guard, update assignment).

use super::param::Param;
use rust_decimal::Decimal;

/// How a value is written into SQL text.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// The literal `NULL`.
    Null,
    /// A single-quoted literal. Not escaped: only trusted, caller-controlled
    /// strings may take this path.
    Str(String),
    /// A `$n` placeholder with the value sent out of band.
    Param(Param),
    /// Inlined verbatim, e.g. `NOW()`.
    Raw(String),
    /// A column reference, qualified with the rendering context's alias.
    Column(String),
    Int(i64),
    Decimal(Decimal),
    Bool(bool),
}

impl SqlValue {
    /// Reference to a column, qualified by the rendering alias if any.
    pub fn col(name: impl Into<String>) -> Self {
        SqlValue::Column(name.into())
    }

    /// Expression emitted verbatim, e.g. `NOW()`. Never pass untrusted input.
    pub fn raw(expr: impl Into<String>) -> Self {
        SqlValue::Raw(expr.into())
    }

    /// Bound parameter; rendered as the next `$n` placeholder.
    pub fn param(value: impl Into<Param>) -> Self {
        SqlValue::Param(value.into())
    }

    /// Quoted literal without escaping. Trusted constants only; use [`SqlValue::param`] otherwise.
    pub fn str(value: impl Into<String>) -> Self {
        SqlValue::Str(value.into())
    }
}

impl From<Param> for SqlValue {
    fn from(v: Param) -> Self {
        SqlValue::Param(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Str(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Str(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

/// SQL text plus the parameters its placeholders refer to, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Param>,
}

impl Statement {
    /// Empty text, no parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `value` to the parameter list and return its placeholder.
    pub fn bind(&mut self, value: Param) -> String {
        self.params.push(value);
        format!("${}", self.params.len())
    }

    /// Append SQL text verbatim.
    pub fn push_str(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    /// Number of distinct `$n` placeholders in the text.
    pub fn placeholder_count(&self) -> usize {
        let mut seen = std::collections::BTreeSet::new();
        let bytes = self.sql.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'$' {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                if end > start {
                    seen.insert(&self.sql[start..end]);
                }
                i = end.max(start);
            } else {
                i += 1;
            }
        }
        seen.len()
    }
}

/// Render one value. `alias` qualifies column references.
pub fn render_value(value: &SqlValue, alias: Option<&str>, stmt: &mut Statement) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Column(name) => match alias {
            Some(alias) => format!("{alias}.{name}"),
            None => name.clone(),
        },
        SqlValue::Param(p) => stmt.bind(p.clone()),
        SqlValue::Raw(expr) => expr.clone(),
        SqlValue::Str(s) => format!("'{s}'"),
        SqlValue::Int(v) => v.to_string(),
        SqlValue::Decimal(v) => v.to_string(),
        SqlValue::Bool(v) => v.to_string(),
    }
}
