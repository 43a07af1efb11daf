//! Trades of one asset from a CSV file.
//!
//! The header names the columns: `dt` is required, and any of `o`, `h`,
//! `l`, `c`, `v` may follow in any order. Only the columns present are
//! merged, so a close-only file leaves stored highs and lows alone. Empty
//! cells load as NULL.
//!
//! `dt` is either an RFC 3339 timestamp or a plain `YYYY-MM-DD` date.

use super::{in_transaction, volume_param, TaskError};
use crate::config::Settings;
use chrono::{DateTime, NaiveDate, Utc};
use fin_ingest_core::sql::{connect, ColumnDef, MergeOutcome, Param, Row, SqlExecutor};
use fin_ingest_core::store::{self, trades, AggType};
use rust_decimal::Decimal;
use std::io;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

pub const PROFILE: &str = "import-csv";

/// Which asset the file belongs to and how to store it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvImport {
    pub market: String,
    pub code: String,
    pub name: Option<String>,
    pub unit: Option<String>,
    pub agg_type: AggType,
    /// Overwrite changed rows instead of only adding missing ones.
    pub update: bool,
}

/// Parsed file: the value columns found in the header and one row per record.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvTrades {
    pub columns: Vec<ColumnDef>,
    pub rows: Vec<Row>,
}

fn header_index(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name))
}

fn parse_dt(raw: &str) -> Option<Param> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(Param::Timestamp(ts.with_timezone(&Utc)));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok().map(Param::Date)
}

fn parse_value(column: &ColumnDef, raw: &str) -> Result<Param, String> {
    if raw.is_empty() {
        return Ok(Param::Null);
    }
    let value = Decimal::from_str(raw).map_err(|e| format!("{}: '{raw}': {e}", column.name))?;
    if column.name == trades::V.name {
        volume_param(value).map_err(|e| format!("{}: {e}", column.name))
    } else {
        Ok(Param::Decimal(value))
    }
}

/// Parse trades from CSV text.
pub fn read_trades<R: io::Read>(reader: R) -> Result<CsvTrades, TaskError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = rdr.headers()?.clone();

    let dt_idx = header_index(&headers, trades::DT.name)
        .ok_or_else(|| TaskError::InvalidCsv("missing 'dt' column".to_string()))?;

    let value_cols: Vec<(ColumnDef, usize)> = trades::OHLCV
        .iter()
        .filter_map(|c| header_index(&headers, c.name).map(|i| (*c, i)))
        .collect();
    if value_cols.is_empty() {
        return Err(TaskError::InvalidCsv(
            "no value columns (expected any of o, h, l, c, v)".to_string(),
        ));
    }

    let known = value_cols.len() + 1;
    if headers.len() > known {
        let ignored: Vec<&str> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != dt_idx && !value_cols.iter().any(|(_, vi)| vi == i))
            .map(|(_, h)| h)
            .collect();
        warn!("Ignoring CSV columns: {}", ignored.join(", "));
    }

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let invalid = |message: String| TaskError::InvalidRecord { line, message };

        let raw_dt = record.get(dt_idx).unwrap_or_default();
        let dt = parse_dt(raw_dt).ok_or_else(|| invalid(format!("dt: invalid date '{raw_dt}'")))?;

        let mut row = Vec::with_capacity(value_cols.len() + 1);
        row.push(dt);
        for (col, idx) in &value_cols {
            row.push(parse_value(col, record.get(*idx).unwrap_or_default()).map_err(invalid)?);
        }
        rows.push(row);
    }

    Ok(CsvTrades {
        columns: value_cols.into_iter().map(|(c, _)| c).collect(),
        rows,
    })
}

/// Upsert the asset and merge the parsed trades into it.
pub fn load(
    exec: &mut impl SqlExecutor,
    import: &CsvImport,
    data: &CsvTrades,
) -> Result<MergeOutcome, TaskError> {
    let asset_id = store::insert_asset(
        exec,
        &import.market,
        &import.code,
        import.name.as_deref(),
        import.unit.as_deref(),
        import.update,
    )?;
    let outcome = store::insert_trades(
        exec,
        asset_id,
        &data.rows,
        &data.columns,
        import.agg_type,
        import.update,
    )?;
    Ok(outcome)
}

/// Import `path` in one transaction.
pub fn run(settings: &Settings, import: &CsvImport, path: &Path) -> Result<MergeOutcome, TaskError> {
    info!("Importing {} as {} {}", path.display(), import.market, import.code);

    let file = std::fs::File::open(path).map_err(csv::Error::from)?;
    let data = read_trades(file)?;
    if data.rows.is_empty() {
        warn!("No rows in {}", path.display());
        return Ok(MergeOutcome::Skipped);
    }
    info!("Read {} rows", data.rows.len());

    let mut client = connect(&settings.db)?;
    let outcome = in_transaction(&mut client, |tx| load(tx, import, &data))?;
    info!("Import done: {outcome:?}");
    Ok(outcome)
}
