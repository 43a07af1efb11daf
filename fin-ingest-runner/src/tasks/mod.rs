//! Ingestion tasks. Each item is written in its own transaction.
//! `refresh` runs after loads and rebuilds the reporting views.

pub mod csv_import;
pub mod finam_accounts;
pub mod finam_bars;
pub mod refresh;

use crate::config::ConfigError;
use fin_ingest_core::api::ApiError;
use fin_ingest_core::sql::{Param, SqlError};
use postgres::{Client, Transaction};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors from the task layer.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("database error: {0}")]
    Sql(#[from] SqlError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid asset name pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("fractional volumes are not supported: {0}")]
    FractionalVolume(Decimal),

    #[error("volume out of range: {0}")]
    VolumeOutOfRange(Decimal),

    #[error("invalid CSV: {0}")]
    InvalidCsv(String),

    #[error("line {line}: {message}")]
    InvalidRecord { line: u64, message: String },
}

/// Run `f` in a transaction, committing on success and rolling back otherwise.
pub fn in_transaction<R>(
    client: &mut Client,
    f: impl FnOnce(&mut Transaction<'_>) -> Result<R, TaskError>,
) -> Result<R, TaskError> {
    let mut tx = client.transaction().map_err(SqlError::from)?;
    let out = f(&mut tx)?;
    tx.commit().map_err(SqlError::from)?;
    Ok(out)
}

/// Volumes are stored as integers.
pub fn volume_param(volume: Decimal) -> Result<Param, TaskError> {
    if !volume.fract().is_zero() {
        return Err(TaskError::FractionalVolume(volume));
    }
    volume
        .to_i64()
        .map(Param::Int)
        .ok_or(TaskError::VolumeOutOfRange(volume))
}
