//! Owned bound-parameter values and their driver conversions.

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use postgres::types::{to_sql_checked, FromSql, IsNull, ToSql, Type};
use rust_decimal::Decimal;
use std::error::Error;
use std::fmt;

type BoxError = Box<dyn Error + Sync + Send>;

/// A value sent to (or read back from) the database out of band.
///
/// The variant decides the wire encoding; the server-inferred parameter
/// type decides the target column type, with a few lossless widenings
/// (integer width, date to midnight timestamp).
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Null,
    Text(String),
    Int(i64),
    Decimal(Decimal),
    Bool(bool),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
}

impl Param {
    pub fn is_null(&self) -> bool {
        matches!(self, Param::Null)
    }

    /// Integer value, if this is an `Int`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Param::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Text value, if this is a `Text`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Param::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Null => write!(f, "NULL"),
            Param::Text(v) => write!(f, "{v:?}"),
            Param::Int(v) => write!(f, "{v}"),
            Param::Decimal(v) => write!(f, "{v}"),
            Param::Bool(v) => write!(f, "{v}"),
            Param::Date(v) => write!(f, "{v}"),
            Param::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
        }
    }
}

impl From<&str> for Param {
    fn from(v: &str) -> Self {
        Param::Text(v.to_string())
    }
}

impl From<String> for Param {
    fn from(v: String) -> Self {
        Param::Text(v)
    }
}

impl From<i64> for Param {
    fn from(v: i64) -> Self {
        Param::Int(v)
    }
}

impl From<i32> for Param {
    fn from(v: i32) -> Self {
        Param::Int(v.into())
    }
}

impl From<Decimal> for Param {
    fn from(v: Decimal) -> Self {
        Param::Decimal(v)
    }
}

impl From<bool> for Param {
    fn from(v: bool) -> Self {
        Param::Bool(v)
    }
}

impl From<NaiveDate> for Param {
    fn from(v: NaiveDate) -> Self {
        Param::Date(v)
    }
}

impl From<DateTime<Utc>> for Param {
    fn from(v: DateTime<Utc>) -> Self {
        Param::Timestamp(v)
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(v: Option<T>) -> Self {
        v.map_or(Param::Null, Into::into)
    }
}

impl ToSql for Param {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            Param::Null => Ok(IsNull::Yes),
            Param::Text(v) => v.to_sql_checked(ty, out),
            Param::Int(v) => {
                if *ty == Type::INT2 {
                    i16::try_from(*v)?.to_sql(ty, out)
                } else if *ty == Type::INT4 {
                    i32::try_from(*v)?.to_sql(ty, out)
                } else {
                    v.to_sql_checked(ty, out)
                }
            }
            Param::Decimal(v) => v.to_sql_checked(ty, out),
            Param::Bool(v) => v.to_sql_checked(ty, out),
            Param::Date(v) => {
                let midnight = v.and_time(NaiveTime::MIN);
                if *ty == Type::TIMESTAMPTZ {
                    midnight.and_utc().to_sql(ty, out)
                } else if *ty == Type::TIMESTAMP {
                    midnight.to_sql(ty, out)
                } else {
                    v.to_sql_checked(ty, out)
                }
            }
            Param::Timestamp(v) => {
                if *ty == Type::TIMESTAMP {
                    v.naive_utc().to_sql(ty, out)
                } else {
                    v.to_sql_checked(ty, out)
                }
            }
        }
    }

    // Each variant checks the concrete type in `to_sql`.
    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

impl<'a> FromSql<'a> for Param {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        if *ty == Type::INT8 {
            Ok(Param::Int(i64::from_sql(ty, raw)?))
        } else if *ty == Type::INT4 {
            Ok(Param::Int(i32::from_sql(ty, raw)?.into()))
        } else if *ty == Type::INT2 {
            Ok(Param::Int(i16::from_sql(ty, raw)?.into()))
        } else if *ty == Type::NUMERIC {
            Ok(Param::Decimal(Decimal::from_sql(ty, raw)?))
        } else if *ty == Type::BOOL {
            Ok(Param::Bool(bool::from_sql(ty, raw)?))
        } else if *ty == Type::DATE {
            Ok(Param::Date(NaiveDate::from_sql(ty, raw)?))
        } else if *ty == Type::TIMESTAMPTZ {
            Ok(Param::Timestamp(DateTime::<Utc>::from_sql(ty, raw)?))
        } else if *ty == Type::TIMESTAMP {
            Ok(Param::Timestamp(NaiveDateTime::from_sql(ty, raw)?.and_utc()))
        } else if <String as FromSql>::accepts(ty) {
            Ok(Param::Text(String::from_sql(ty, raw)?))
        } else {
            Err(format!("unsupported column type: {ty}").into())
        }
    }

    fn from_sql_null(_ty: &Type) -> Result<Self, BoxError> {
        Ok(Param::Null)
    }

    fn accepts(ty: &Type) -> bool {
        [
            Type::INT8,
            Type::INT4,
            Type::INT2,
            Type::NUMERIC,
            Type::BOOL,
            Type::DATE,
            Type::TIMESTAMPTZ,
            Type::TIMESTAMP,
        ]
        .contains(ty)
            || <String as FromSql>::accepts(ty)
    }
}
