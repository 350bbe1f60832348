//! Store trait definitions

use aftershock_api::Trace;
use std::path::PathBuf;
use std::time::Duration;

use crate::StoreResult;

/// Durable history of experiment runs.
///
/// A run starts with [`HistoryStorage::create_new_working_dir`]; the trace
/// and result recorded afterwards belong to that run.
pub trait HistoryStorage: Send + Sync {
    /// Allocate the next run and its working directory
    fn create_new_working_dir(&self) -> StoreResult<PathBuf>;

    /// Record the trace of the current run
    fn record_new_trace(&self, trace: &Trace) -> StoreResult<()>;

    /// Record whether the current run validated, and how long it took
    fn record_result(&self, successful: bool, required_time: Duration) -> StoreResult<()>;

    /// Finish the current run. Further recording fails.
    fn close(&self) -> StoreResult<()>;

    /// Number of runs with a recorded trace
    fn nr_stored_histories(&self) -> StoreResult<usize>;

    /// Trace recorded for the run with the given index, if any
    fn get_stored_trace(&self, run_index: u64) -> StoreResult<Option<Trace>>;
}
