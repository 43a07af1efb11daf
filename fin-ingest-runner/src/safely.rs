//! Per-item failure isolation.

use std::fmt::{Debug, Display};
use tracing::error;

/// Run `process` for every item, logging failures and carrying on.
///
/// Returns `false` if any item failed.
pub fn for_each_safely<T, E, I, F>(items: I, mut process: F) -> bool
where
    I: IntoIterator<Item = T>,
    T: Debug,
    E: Display,
    F: FnMut(&T) -> Result<(), E>,
{
    let mut success = true;
    for item in items {
        if let Err(e) = process(&item) {
            error!("Failed to process: {item:?}: {e}");
            success = false;
        }
    }
    success
}
