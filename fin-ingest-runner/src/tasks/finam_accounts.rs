//! Broker accounts visible to the Finam session into `accounts`.

use super::{in_transaction, TaskError};
use crate::config::Settings;
use crate::period::Period;
use crate::safely::for_each_safely;
use fin_ingest_core::api::FinamApi;
use fin_ingest_core::sql::{connect, SqlExecutor};
use fin_ingest_core::store;
use tracing::{debug, info};

pub const PROFILE: &str = "acc-finam";
pub const BROKER: &str = "FINAM";

/// Register one account. Existing accounts keep their names.
pub fn store_account(exec: &mut impl SqlExecutor, account_id: &str) -> Result<i64, TaskError> {
    let id = store::insert_account(exec, BROKER, account_id, None, false)?;
    debug!("Account {account_id} has id {id}");
    Ok(id)
}

/// Register every account of the session. `Ok(false)` when some account failed.
pub fn run(settings: &Settings, period: Period) -> Result<bool, TaskError> {
    let mut api = FinamApi::connect(&settings.api_base_url, settings.read_secret()?)?;
    let mut client = connect(settings.accounts_db())?;

    let account_ids = api.account_ids()?;
    info!("Accounts to process: {}", account_ids.len());

    Ok(for_each_safely(account_ids, |account_id| {
        info!("Processing account: {account_id}, period: {period}");
        in_transaction(&mut client, |tx| store_account(tx, account_id)).map(|_| ())
    }))
}
