//! Table layouts and write helpers for the financial store.
//!
//! - `assets(id, market, code, name, unit)`, unique on `(market, code)`
//! - `trades(asset_id, agg_type, dt, o, h, l, c, v, unit)`, unique on `(asset_id, agg_type, dt)`
//! - `accounts(id, broker, code, name)`, unique on `(broker, code)`

use crate::sql::{
    create_staging, load_rows, merge, merge_row, ColumnDef, ColumnType, MergeMode, MergeOutcome,
    MergeSpec, NamedRow, OnCommit, Row, RowMerge, SqlError, SqlExecutor,
};
use tracing::debug;

pub mod assets {
    use super::*;

    pub const TABLE: &str = "assets";
    pub const MARKET: ColumnDef = ColumnDef::new("market", ColumnType::varchar_n(15));
    pub const CODE: ColumnDef = ColumnDef::new("code", ColumnType::varchar_n(25));
    pub const NAME: ColumnDef = ColumnDef::new("name", ColumnType::varchar());
    pub const UNIT: ColumnDef = ColumnDef::new("unit", ColumnType::varchar_n(15));
}

pub mod trades {
    use super::*;

    pub const TABLE: &str = "trades";
    pub const DT: ColumnDef = ColumnDef::new("dt", ColumnType::TimestampTz);
    pub const O: ColumnDef = ColumnDef::new("o", ColumnType::decimal(20, 4));
    pub const H: ColumnDef = ColumnDef::new("h", ColumnType::decimal(20, 4));
    pub const L: ColumnDef = ColumnDef::new("l", ColumnType::decimal(20, 4));
    pub const C: ColumnDef = ColumnDef::new("c", ColumnType::decimal(20, 4));
    pub const V: ColumnDef = ColumnDef::new("v", ColumnType::BigInt);
    pub const UNIT: ColumnDef = ColumnDef::new("unit", ColumnType::varchar_n(15));

    /// Open, high, low, close, volume.
    pub const OHLCV: [ColumnDef; 5] = [O, H, L, C, V];
}

pub mod accounts {
    use super::*;

    pub const TABLE: &str = "accounts";
    pub const BROKER: ColumnDef = ColumnDef::new("broker", ColumnType::varchar_n(15));
    pub const CODE: ColumnDef = ColumnDef::new("code", ColumnType::varchar_n(15));
    pub const NAME: ColumnDef = ColumnDef::new("name", ColumnType::varchar());
}

/// How a trade row was aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggType {
    Intraday,
    Snapshot,
    Daily,
    /// Opening value, e.g. balance.
    Open,
    /// Closing value, e.g. balance.
    Close,
}

impl AggType {
    pub fn code(self) -> &'static str {
        match self {
            AggType::Intraday => "I",
            AggType::Snapshot => "S",
            AggType::Daily => "D",
            AggType::Open => "O",
            AggType::Close => "C",
        }
    }
}

impl std::str::FromStr for AggType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "I" => Ok(AggType::Intraday),
            "S" => Ok(AggType::Snapshot),
            "D" => Ok(AggType::Daily),
            "O" => Ok(AggType::Open),
            "C" => Ok(AggType::Close),
            other => Err(format!("unknown aggregation type: {other} (expected one of I, S, D, O, C)")),
        }
    }
}

const STAGING_TABLE: &str = "temp";

fn mode_for(update: bool) -> MergeMode {
    if update {
        MergeMode::Merge
    } else {
        MergeMode::Insert
    }
}

fn returned_id(
    table: &str,
    returned: Option<crate::sql::Returned>,
) -> Result<i64, SqlError> {
    returned
        .as_ref()
        .and_then(|r| r.as_i64())
        .ok_or_else(|| SqlError::MissingReturnedRow {
            table: table.to_string(),
        })
}

/// Default asset display name: `"{market} {code}"`, plus `", {unit}"` when known.
pub fn default_asset_name(market: &str, code: &str, unit: Option<&str>) -> String {
    match unit {
        Some(unit) => format!("{market} {code}, {unit}"),
        None => format!("{market} {code}"),
    }
}

/// Insert an asset (or refresh its name/unit when `update`) and return its id.
pub fn insert_asset(
    exec: &mut impl SqlExecutor,
    market: &str,
    code: &str,
    name: Option<&str>,
    unit: Option<&str>,
    update: bool,
) -> Result<i64, SqlError> {
    let name = name
        .map(str::to_string)
        .unwrap_or_else(|| default_asset_name(market, code, unit));
    debug!("Updating asset: {name}");

    let row = NamedRow::new()
        .with(assets::MARKET.name, market)
        .with(assets::CODE.name, code)
        .with(assets::NAME.name, name)
        .with(assets::UNIT.name, unit);
    let spec = RowMerge::new(assets::TABLE, row)
        .key([assets::MARKET.name, assets::CODE.name])
        .returning(["id"])
        .mode(mode_for(update));

    returned_id(assets::TABLE, merge_row(exec, &spec)?)
}

/// Insert an account (or refresh its name when `update`) and return its id.
pub fn insert_account(
    exec: &mut impl SqlExecutor,
    broker: &str,
    code: &str,
    name: Option<&str>,
    update: bool,
) -> Result<i64, SqlError> {
    let name = name
        .map(str::to_string)
        .unwrap_or_else(|| format!("{broker} {code}"));
    debug!("Updating account: {name}");

    let row = NamedRow::new()
        .with(accounts::BROKER.name, broker)
        .with(accounts::CODE.name, code)
        .with(accounts::NAME.name, name);
    let spec = RowMerge::new(accounts::TABLE, row)
        .key([accounts::BROKER.name, accounts::CODE.name])
        .returning(["id"])
        .mode(mode_for(update));

    returned_id(accounts::TABLE, merge_row(exec, &spec)?)
}

/// Load `rows` (`dt` followed by one value per `value_cols`) for one asset
/// through a staging table and merge them into `trades`.
///
/// Must run inside a transaction: the staging table is dropped on commit.
pub fn insert_trades(
    exec: &mut impl SqlExecutor,
    asset_id: i64,
    rows: &[Row],
    value_cols: &[ColumnDef],
    agg_type: AggType,
    update: bool,
) -> Result<MergeOutcome, SqlError> {
    debug!("Loading trades for asset id: {asset_id}");

    let value_cols: &[ColumnDef] = if value_cols.is_empty() {
        &[trades::C]
    } else {
        value_cols
    };

    let mut cols = Vec::with_capacity(value_cols.len() + 1);
    cols.push(trades::DT);
    cols.extend_from_slice(value_cols);

    let staging = create_staging(exec, STAGING_TABLE, &cols, OnCommit::Drop)?;
    load_rows(exec, &staging, rows)?;

    let spec = MergeSpec::new(trades::TABLE, &staging.name)
        .on_value("asset_id", asset_id)
        .on_value("agg_type", agg_type.code())
        .on_column(trades::DT.name)
        .data_columns(value_cols.iter().map(|c| c.name))
        .mode(mode_for(update));

    merge(exec, &spec)
}
