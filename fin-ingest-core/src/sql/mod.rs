//! SQL merge/upsert generation engine.
//!
//! Statement builders are pure: they turn a merge description into a
//! [`Statement`] (text plus ordered parameters). Execution goes through the
//! [`SqlExecutor`] seam, bound by the caller to a single transaction.

pub mod column;
pub mod connect;
pub mod error;
pub mod executor;
pub mod merge;
pub mod merge_row;
pub mod param;
pub mod staging;
pub mod value;

pub use column::{ColumnDef, ColumnType};
pub use connect::{connect, DbParams};
pub use error::SqlError;
pub use executor::SqlExecutor;
pub use merge::{build_merge, merge, MergeMode, MergeOutcome, MergeSpec};
pub use merge_row::{build_merge_row, merge_row, NamedRow, Returned, RowMerge};
pub use param::Param;
pub use staging::{create_staging, load_into, load_rows, OnCommit, Row, StagingTable};
pub use value::{render_value, SqlValue, Statement};
