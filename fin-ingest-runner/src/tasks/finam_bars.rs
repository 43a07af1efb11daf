//! Daily bars from the Finam Trade API into `trades`.
//!
//! Assets are resolved per exchange (MIC) by exact tickers and by regular
//! expressions searched in asset names. Each asset is fetched and loaded on
//! its own, so one bad instrument does not stop the rest.

use super::{in_transaction, volume_param, TaskError};
use crate::config::{AssetSearch, Settings};
use crate::period::Period;
use crate::safely::for_each_safely;
use fin_ingest_core::api::{FinamApi, FinamAsset, FinamBar, Transport};
use fin_ingest_core::sql::{connect, MergeOutcome, Param, Row, SqlExecutor};
use fin_ingest_core::store::{self, trades, AggType};
use postgres::Client;
use regex::Regex;
use std::collections::HashSet;
use tracing::{info, warn};

pub const PROFILE: &str = "finam";

fn on_mic<'a>(available: &'a [FinamAsset], mic: &'a str) -> impl Iterator<Item = &'a FinamAsset> + 'a {
    available.iter().filter(move |a| a.mic == mic)
}

/// Resolve search entries against the API's asset list.
///
/// Ticker matches come first, then pattern matches, without duplicates.
pub fn find_assets(
    available: &[FinamAsset],
    searches: &[AssetSearch],
) -> Result<Vec<FinamAsset>, TaskError> {
    let mut found: Vec<FinamAsset> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();

    let requested: usize = searches.iter().map(|s| s.tickers.len()).sum();
    for search in searches.iter().filter(|s| !s.tickers.is_empty()) {
        for asset in on_mic(available, &search.mic).filter(|a| search.tickers.contains(&a.ticker)) {
            if seen.insert(&asset.symbol) {
                found.push(asset.clone());
            }
        }
    }
    if found.len() != requested {
        warn!("Found {} assets, but {requested} were requested", found.len());
    }

    for search in searches {
        for pattern in &search.patterns {
            let re = Regex::new(pattern)?;
            let mut matched = 0usize;
            for asset in on_mic(available, &search.mic).filter(|a| re.is_match(&a.name)) {
                matched += 1;
                if seen.insert(&asset.symbol) {
                    found.push(asset.clone());
                }
            }
            if matched == 0 {
                warn!("Found no assets for {} by pattern: {pattern}", search.mic);
            }
        }
    }

    Ok(found)
}

/// `dt, o, h, l, c, v` rows. Rejects the whole batch on a fractional volume.
pub fn bars_to_rows(bars: &[FinamBar]) -> Result<Vec<Row>, TaskError> {
    bars.iter()
        .map(|b| {
            Ok(vec![
                Param::Timestamp(b.timestamp),
                Param::Decimal(b.open),
                Param::Decimal(b.high),
                Param::Decimal(b.low),
                Param::Decimal(b.close),
                volume_param(b.volume)?,
            ])
        })
        .collect()
}

/// Upsert the asset (refreshing its name) and merge its daily trades.
pub fn load_asset(
    exec: &mut impl SqlExecutor,
    asset: &FinamAsset,
    rows: &[Row],
) -> Result<MergeOutcome, TaskError> {
    info!("Loading into DB: {} {}", asset.mic, asset.ticker);

    let asset_id = store::insert_asset(exec, &asset.mic, &asset.ticker, Some(&asset.name), None, true)?;
    let outcome = store::insert_trades(exec, asset_id, rows, &trades::OHLCV, AggType::Daily, true)?;
    Ok(outcome)
}

fn process_asset<T: Transport>(
    api: &mut FinamApi<T>,
    client: &mut Client,
    asset: &FinamAsset,
    period: Period,
    time_frame: &str,
) -> Result<(), TaskError> {
    info!("Processing: {}, period: {period}", asset.symbol);

    let bars = api.bars(&asset.symbol, period.start, period.end, time_frame)?;
    let (Some(first), Some(last)) = (
        bars.iter().map(|b| b.timestamp).min(),
        bars.iter().map(|b| b.timestamp).max(),
    ) else {
        warn!("No bars retrieved");
        return Ok(());
    };
    info!(
        "Fetched {} bars, period: {} to {}",
        bars.len(),
        first.to_rfc3339(),
        last.to_rfc3339()
    );

    let rows = bars_to_rows(&bars)?;
    in_transaction(client, |tx| load_asset(tx, asset, &rows))?;
    Ok(())
}

/// Ingest bars for every configured asset. `Ok(false)` when some asset failed.
pub fn run(settings: &Settings, period: Period) -> Result<bool, TaskError> {
    let mut api = FinamApi::connect(&settings.api_base_url, settings.read_secret()?)?;
    let mut client = connect(&settings.db)?;

    let available = api.assets()?;
    let assets = find_assets(&available, &settings.assets)?;
    info!("Assets to process: {}", assets.len());

    Ok(for_each_safely(assets, |asset| {
        process_asset(&mut api, &mut client, asset, period, &settings.time_frame)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::testing::Recorder;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn asset(mic: &str, ticker: &str, name: &str) -> FinamAsset {
        FinamAsset {
            mic: mic.to_string(),
            ticker: ticker.to_string(),
            name: name.to_string(),
            symbol: format!("{ticker}@{mic}"),
        }
    }

    fn catalogue() -> Vec<FinamAsset> {
        vec![
            asset("MISX", "SBER", "Сбербанк"),
            asset("MISX", "SBERP", "Сбербанк-п"),
            asset("MISX", "GAZP", "Газпром"),
            asset("RUSX", "SBER", "Сбербанк"),
            asset("MISX", "LQDT", "ВИМ - Ликвидность"),
        ]
    }

    fn search(mic: &str, tickers: &[&str], patterns: &[&str]) -> AssetSearch {
        AssetSearch {
            mic: mic.to_string(),
            tickers: tickers.iter().map(|s| s.to_string()).collect(),
            patterns: patterns.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn symbols(assets: &[FinamAsset]) -> Vec<&str> {
        assets.iter().map(|a| a.symbol.as_str()).collect()
    }

    #[test]
    fn tickers_match_within_their_exchange() {
        let found = find_assets(&catalogue(), &[search("MISX", &["SBER", "GAZP", "NOPE"], &[])]).unwrap();
        assert_eq!(symbols(&found), vec!["SBER@MISX", "GAZP@MISX"]);
    }

    #[test]
    fn patterns_add_without_duplicates() {
        let searches = [
            search("MISX", &["SBER"], &["^Сбер", "Ликвидность$"]),
            search("RUSX", &[], &["NOTHING"]),
        ];
        let found = find_assets(&catalogue(), &searches).unwrap();
        assert_eq!(symbols(&found), vec!["SBER@MISX", "SBERP@MISX", "LQDT@MISX"]);
    }

    #[test]
    fn bad_pattern_is_an_error() {
        let err = find_assets(&catalogue(), &[search("MISX", &[], &["("])]).unwrap_err();
        assert!(matches!(err, TaskError::Pattern(_)));
    }

    fn bar(volume: &str) -> FinamBar {
        let p = Decimal::from_str("100.5").unwrap();
        FinamBar {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 21, 0, 0).unwrap(),
            open: p,
            high: p,
            low: p,
            close: p,
            volume: Decimal::from_str(volume).unwrap(),
        }
    }

    #[test]
    fn fractional_volume_rejects_batch() {
        assert_eq!(bars_to_rows(&[bar("10")]).unwrap()[0][5], Param::Int(10));
        assert!(matches!(
            bars_to_rows(&[bar("10"), bar("0.5")]),
            Err(TaskError::FractionalVolume(_))
        ));
    }

    #[test]
    fn load_asset_upserts_asset_then_trades() {
        let mut rec = Recorder::returning_id(5);
        let rows = bars_to_rows(&[bar("10")]).unwrap();
        let a = asset("MISX", "SBER", "Сбербанк");

        load_asset(&mut rec, &a, &rows).unwrap();

        let sql = rec.sql();
        assert_eq!(sql.len(), 4);
        assert!(sql[0].contains("INSERT INTO assets AS t (market, code, name, unit)"));
        assert!(sql[0].contains("ON CONFLICT (market, code) DO UPDATE SET"));
        assert_eq!(rec.statements[0].params[2], Param::from("Сбербанк"));
        assert!(sql[1].starts_with("CREATE TEMPORARY TABLE temp (dt TIMESTAMP WITH TIME ZONE, o DECIMAL(20, 4)"));
        assert_eq!(sql[2], "INSERT INTO temp (dt, o, h, l, c, v) VALUES ($1, $2, $3, $4, $5, $6);");
        assert!(sql[3].contains("ON (t.asset_id = 5 AND t.agg_type = 'D' AND t.dt = s.dt)"));
    }
}
