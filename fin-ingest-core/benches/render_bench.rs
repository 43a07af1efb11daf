//! Criterion benchmarks for statement rendering.
//!
//! Benchmarks:
//! 1. Paged bulk-load statements (1k..100k OHLCV rows)
//! 2. Set-based MERGE rendering
//! 3. Single-row merge with returning-with-fallback

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rust_decimal::Decimal;

use fin_ingest_core::sql::staging::build_load_statements;
use fin_ingest_core::sql::{build_merge, build_merge_row, MergeSpec, NamedRow, Param, Row, RowMerge};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_rows(n: usize) -> Vec<Row> {
    let base = chrono::NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();
    (0..n)
        .map(|i| {
            let close = Decimal::new(10_000 + (i as i64 % 700), 2);
            vec![
                Param::Date(base + chrono::Duration::days(i as i64)),
                Param::Decimal(close - Decimal::new(30, 2)),
                Param::Decimal(close + Decimal::new(150, 2)),
                Param::Decimal(close - Decimal::new(150, 2)),
                Param::Decimal(close),
                Param::Int(1_000_000 + (i as i64 % 500_000)),
            ]
        })
        .collect()
}

// ── 1. Bulk load ─────────────────────────────────────────────────────

fn bench_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("bulk_load");
    let columns = ["dt", "o", "h", "l", "c", "v"];

    for row_count in [1_000usize, 10_000, 100_000] {
        let rows = make_rows(row_count);
        group.bench_with_input(
            BenchmarkId::new("ohlcv", row_count),
            &rows,
            |b, rows| {
                b.iter(|| build_load_statements(black_box("temp"), &columns, black_box(rows)).unwrap())
            },
        );
    }
    group.finish();
}

// ── 2. Set-based merge ───────────────────────────────────────────────

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");

    let spec = MergeSpec::new("trades", "temp")
        .on_value("asset_id", 42i64)
        .on_value("agg_type", "D")
        .on_column("dt")
        .data_columns(["o", "h", "l", "c", "v"]);

    group.bench_function("trades_ohlcv", |b| {
        b.iter(|| build_merge(black_box(&spec)).unwrap())
    });
    group.finish();
}

// ── 3. Single-row merge ──────────────────────────────────────────────

fn bench_merge_row(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_row");

    let spec = RowMerge::new(
        "assets",
        NamedRow::new()
            .with("market", "CBR")
            .with("code", "USD")
            .with("name", "Доллар США")
            .with("unit", "RUB"),
    )
    .key(["market", "code"])
    .returning(["id"]);

    group.bench_function("asset_returning_id", |b| {
        b.iter(|| build_merge_row(black_box(&spec)).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_load, bench_merge, bench_merge_row);
criterion_main!(benches);
