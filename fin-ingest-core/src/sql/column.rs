//! Column and storage type descriptors used for DDL and DML generation.

use std::fmt;

/// Closed set of scalar storage kinds the engine can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// Variable-length string with an optional maximum length.
    Varchar(Option<u32>),
    /// Fixed-point decimal.
    Decimal { precision: u8, scale: u8 },
    BigInt,
    /// Timestamp with time zone.
    TimestampTz,
}

impl ColumnType {
    /// Unbounded `VARCHAR`.
    pub const fn varchar() -> Self {
        ColumnType::Varchar(None)
    }

    /// `VARCHAR(max_len)`.
    pub const fn varchar_n(max_len: u32) -> Self {
        ColumnType::Varchar(Some(max_len))
    }

    /// `DECIMAL(precision, scale)`.
    pub const fn decimal(precision: u8, scale: u8) -> Self {
        ColumnType::Decimal { precision, scale }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Varchar(None) => write!(f, "VARCHAR"),
            ColumnType::Varchar(Some(n)) => write!(f, "VARCHAR({n})"),
            ColumnType::Decimal { precision, scale } => write!(f, "DECIMAL({precision}, {scale})"),
            ColumnType::BigInt => write!(f, "BIGINT"),
            ColumnType::TimestampTz => write!(f, "TIMESTAMP WITH TIME ZONE"),
        }
    }
}

/// A named, typed column.
///
/// Immutable and cheap to declare as a `const` at the call site that owns
/// the table layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnDef {
    pub name: &'static str,
    pub ty: ColumnType,
}

impl ColumnDef {
    pub const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self { name, ty }
    }

    /// Column with the default type (`VARCHAR`).
    pub const fn named(name: &'static str) -> Self {
        Self::new(name, ColumnType::varchar())
    }

    /// `name TYPE`, as used inside `CREATE TABLE`.
    pub fn ddl(&self) -> String {
        format!("{} {}", self.name, self.ty)
    }
}

/// Join column names with `", "`.
pub fn column_list<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    names.into_iter().collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_rendering() {
        assert_eq!(ColumnType::varchar().to_string(), "VARCHAR");
        assert_eq!(ColumnType::varchar_n(15).to_string(), "VARCHAR(15)");
        assert_eq!(ColumnType::decimal(20, 4).to_string(), "DECIMAL(20, 4)");
        assert_eq!(ColumnType::BigInt.to_string(), "BIGINT");
        assert_eq!(ColumnType::TimestampTz.to_string(), "TIMESTAMP WITH TIME ZONE");
    }

    #[test]
    fn ddl_fragment() {
        const DT: ColumnDef = ColumnDef::new("dt", ColumnType::TimestampTz);
        assert_eq!(DT.ddl(), "dt TIMESTAMP WITH TIME ZONE");
        assert_eq!(ColumnDef::named("name").ddl(), "name VARCHAR");
    }

    #[test]
    fn joins_names() {
        assert_eq!(column_list(["a", "b", "c"]), "a, b, c");
        assert_eq!(column_list(Vec::<&str>::new()), "");
    }
}
