//! fin-ingest runner: typed configuration, periods, ingestion tasks.
//!
//! This crate builds on `fin-ingest-core` to provide:
//! - Layered TOML settings (base file, task profile, environment)
//! - Finam bars and accounts ingestion
//! - CSV trade import
//! - Per-item failure isolation, one transaction per item

pub mod config;
pub mod period;
pub mod safely;
pub mod tasks;

pub use config::{AssetSearch, ConfigError, ConfigSources, Settings};
pub use period::{Period, PeriodError};
pub use safely::for_each_safely;
pub use tasks::csv_import::CsvImport;
pub use tasks::TaskError;

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn settings_are_send_sync() {
        assert_send::<Settings>();
        assert_sync::<Settings>();
        assert_send::<Period>();
        assert_sync::<Period>();
    }

    #[test]
    fn errors_are_send_sync() {
        assert_send::<ConfigError>();
        assert_sync::<ConfigError>();
        assert_send::<TaskError>();
        assert_sync::<TaskError>();
    }
}
