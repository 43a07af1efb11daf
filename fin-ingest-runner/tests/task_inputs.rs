//! Task inputs read from disk: layered settings and CSV trade files.

use fin_ingest_core::sql::Param;
use fin_ingest_runner::config::{ConfigSources, Settings, CONFIG_DIR_ENV};
use fin_ingest_runner::tasks::csv_import::read_trades;
use fin_ingest_runner::tasks::{finam_accounts, finam_bars};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(dir: &Path, name: &str, content: &str) {
    let path = dir.join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// A config directory laid out the way deployments ship it.
fn deployment() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "fin-ingest.toml",
        r#"
logLevel = "info"
tokenFile = "finam.token"

[db]
host = "db.internal"
dbname = "fin"
user = "ingest"
"#,
    );
    write(
        dir.path(),
        "task/finam.toml",
        r#"
[[assets]]
mic = "MISX"
tickers = ["SBER", "GAZP"]

[[assets]]
mic = "RTSX"
patterns = ["^Индекс"]
"#,
    );
    write(
        dir.path(),
        "task/acc-finam.toml",
        r#"
logLevel = "debug"

[acc-db]
host = "acc.internal"
dbname = "acc"
"#,
    );
    dir
}

fn sources(dir: &TempDir) -> ConfigSources {
    let root = dir.path().display().to_string();
    ConfigSources::locate(move |name| (name == CONFIG_DIR_ENV).then(|| root.clone()), &[])
}

#[test]
fn each_task_sees_its_own_profile() {
    let dir = deployment();
    let sources = sources(&dir);

    let bars = Settings::load_from(&sources, Some(finam_bars::PROFILE), Vec::new()).unwrap();
    assert_eq!(bars.assets.len(), 2);
    assert_eq!(bars.assets[1].patterns, vec!["^Индекс"]);
    assert!(bars.assets[1].tickers.is_empty());
    assert_eq!(bars.accounts_db().host, "db.internal");

    let accounts = Settings::load_from(&sources, Some(finam_accounts::PROFILE), Vec::new()).unwrap();
    assert!(accounts.assets.is_empty());
    assert_eq!(accounts.log_level, "debug");
    assert_eq!(accounts.accounts_db().host, "acc.internal");
    assert_eq!(accounts.accounts_db().port, 5432);
    assert_eq!(accounts.db.dbname, "fin");
}

#[test]
fn environment_beats_profile() {
    let dir = deployment();
    let env = vec![
        ("FIN_INGEST__ACC_DB__HOST".to_string(), "override.internal".to_string()),
        ("FIN_INGEST__LOG_LEVEL".to_string(), "warn".to_string()),
    ];
    let settings = Settings::load_from(&sources(&dir), Some(finam_accounts::PROFILE), env).unwrap();
    assert_eq!(settings.accounts_db().host, "override.internal");
    assert_eq!(settings.log_level, "warn");
}

#[test]
fn secret_comes_from_token_file() {
    let dir = deployment();
    write(dir.path(), "finam.token", "long-lived-secret\n");

    let mut settings = Settings::load_from(&sources(&dir), None, Vec::new()).unwrap();
    settings.token_file = Some(dir.path().join("finam.token"));
    assert_eq!(settings.read_secret().unwrap(), "long-lived-secret");
}

#[test]
fn csv_file_round_trip() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "usd.csv",
        "dt,o,h,l,c\n2024-01-09,89.6,90.1,89.4,89.7\n2024-01-10,89.7,,,90.0\n",
    );

    let file = fs::File::open(dir.path().join("usd.csv")).unwrap();
    let data = read_trades(file).unwrap();

    let names: Vec<&str> = data.columns.iter().map(|c| c.name).collect();
    assert_eq!(names, vec!["o", "h", "l", "c"]);
    assert_eq!(data.rows.len(), 2);
    assert_eq!(data.rows[1][2], Param::Null);
    assert_eq!(data.rows[1][3], Param::Null);
}
