//! SQLite-based history storage

use aftershock_api::Trace;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

use crate::{HistoryStorage, StoreError, StoreResult};

#[derive(Debug, Default)]
struct RunState {
    current: Option<i64>,
    closed: bool,
}

/// History storage backed by `<storage>/history.db`
pub struct SqliteHistoryStorage {
    storage_dir: PathBuf,
    conn: Mutex<Connection>,
    state: Mutex<RunState>,
}

impl SqliteHistoryStorage {
    /// Open or create the history of the given storage directory
    pub fn open(storage_dir: impl AsRef<Path>) -> StoreResult<Self> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;
        let conn = Connection::open(aftershock_util::history_db_path(&storage_dir))?;
        let store = Self {
            storage_dir,
            conn: Mutex::new(conn),
            state: Mutex::new(RunState::default()),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- One row per run
            CREATE TABLE IF NOT EXISTS runs (
                idx INTEGER PRIMARY KEY,
                working_dir TEXT NOT NULL,
                started_at TEXT NOT NULL,
                trace_json TEXT,
                successful INTEGER,
                required_time_ms INTEGER,
                finished_at TEXT
            );
            "#,
        )?;

        debug!("History schema initialized");
        Ok(())
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection lock poisoned".into()))
    }

    fn state(&self) -> StoreResult<MutexGuard<'_, RunState>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Database("run state lock poisoned".into()))
    }

    fn current_run(&self) -> StoreResult<i64> {
        let state = self.state()?;
        if state.closed {
            return Err(StoreError::Closed);
        }
        state.current.ok_or(StoreError::NoActiveRun)
    }
}

impl HistoryStorage for SqliteHistoryStorage {
    fn create_new_working_dir(&self) -> StoreResult<PathBuf> {
        let mut state = self.state()?;
        if state.closed {
            return Err(StoreError::Closed);
        }

        let conn = self.conn()?;
        let idx: i64 = conn.query_row(
            "SELECT COALESCE(MAX(idx) + 1, 0) FROM runs",
            [],
            |row| row.get(0),
        )?;

        let dir = aftershock_util::working_dir(&self.storage_dir, idx as u64);
        std::fs::create_dir_all(&dir)?;

        conn.execute(
            "INSERT INTO runs (idx, working_dir, started_at) VALUES (?, ?, ?)",
            params![
                idx,
                dir.to_string_lossy().into_owned(),
                aftershock_util::now().to_rfc3339()
            ],
        )?;

        state.current = Some(idx);
        info!(run = idx, dir = %dir.display(), "Working directory created");
        Ok(dir)
    }

    fn record_new_trace(&self, trace: &Trace) -> StoreResult<()> {
        let idx = self.current_run()?;
        let trace_json = serde_json::to_string(trace)?;

        let conn = self.conn()?;
        conn.execute(
            "UPDATE runs SET trace_json = ? WHERE idx = ?",
            params![trace_json, idx],
        )?;

        debug!(run = idx, actions = trace.len(), "Trace recorded");
        Ok(())
    }

    fn record_result(&self, successful: bool, required_time: Duration) -> StoreResult<()> {
        let idx = self.current_run()?;
        let required_ms = required_time.as_millis() as i64;

        let conn = self.conn()?;
        conn.execute(
            "UPDATE runs SET successful = ?, required_time_ms = ? WHERE idx = ?",
            params![successful, required_ms, idx],
        )?;

        debug!(run = idx, successful, required_ms, "Result recorded");
        Ok(())
    }

    fn close(&self) -> StoreResult<()> {
        let mut state = self.state()?;
        if let Some(idx) = state.current.take() {
            let conn = self.conn()?;
            conn.execute(
                "UPDATE runs SET finished_at = ? WHERE idx = ?",
                params![aftershock_util::now().to_rfc3339(), idx],
            )?;
            debug!(run = idx, "Run closed");
        }
        state.closed = true;
        Ok(())
    }

    fn nr_stored_histories(&self) -> StoreResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM runs WHERE trace_json IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn get_stored_trace(&self, run_index: u64) -> StoreResult<Option<Trace>> {
        let conn = self.conn()?;
        let trace_json: Option<Option<String>> = conn
            .query_row(
                "SELECT trace_json FROM runs WHERE idx = ?",
                [run_index as i64],
                |row| row.get(0),
            )
            .optional()?;

        match trace_json.flatten() {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aftershock_api::Event;
    use aftershock_util::EntityId;
    use tempfile::tempdir;

    fn sample_trace() -> Trace {
        let mut trace = Trace::new();
        let event = Event::func_call(EntityId::new("zk1"), "foo");
        trace.push(event.make_accept_action().unwrap());
        trace
    }

    #[test]
    fn test_working_dirs_are_sequential() {
        let dir = tempdir().unwrap();
        let store = SqliteHistoryStorage::open(dir.path()).unwrap();

        let first = store.create_new_working_dir().unwrap();
        assert_eq!(first, dir.path().join("00000000"));
        assert!(first.is_dir());

        let second = store.create_new_working_dir().unwrap();
        assert_eq!(second, dir.path().join("00000001"));
        assert!(dir.path().join("history.db").exists());
    }

    #[test]
    fn test_record_requires_run() {
        let dir = tempdir().unwrap();
        let store = SqliteHistoryStorage::open(dir.path()).unwrap();

        let result = store.record_new_trace(&Trace::new());
        assert!(matches!(result, Err(StoreError::NoActiveRun)));
    }

    #[test]
    fn test_trace_and_result() {
        let dir = tempdir().unwrap();
        let store = SqliteHistoryStorage::open(dir.path()).unwrap();
        assert_eq!(store.nr_stored_histories().unwrap(), 0);

        store.create_new_working_dir().unwrap();
        let trace = sample_trace();
        store.record_new_trace(&trace).unwrap();
        store
            .record_result(true, Duration::from_millis(1500))
            .unwrap();
        store.close().unwrap();

        assert_eq!(store.nr_stored_histories().unwrap(), 1);
        let stored = store.get_stored_trace(0).unwrap().unwrap();
        assert!(aftershock_api::are_traces_equal(&trace, &stored));
        assert!(store.get_stored_trace(7).unwrap().is_none());
    }

    #[test]
    fn test_closed_store_rejects_recording() {
        let dir = tempdir().unwrap();
        let store = SqliteHistoryStorage::open(dir.path()).unwrap();
        store.create_new_working_dir().unwrap();
        store.close().unwrap();

        assert!(matches!(
            store.record_result(false, Duration::ZERO),
            Err(StoreError::Closed)
        ));
        assert!(matches!(
            store.create_new_working_dir(),
            Err(StoreError::Closed)
        ));
    }

    #[test]
    fn test_history_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = SqliteHistoryStorage::open(dir.path()).unwrap();
            store.create_new_working_dir().unwrap();
            store.record_new_trace(&sample_trace()).unwrap();
            store.close().unwrap();
        }

        let store = SqliteHistoryStorage::open(dir.path()).unwrap();
        assert_eq!(store.nr_stored_histories().unwrap(), 1);
        let next = store.create_new_working_dir().unwrap();
        assert_eq!(next, dir.path().join("00000001"));
    }
}
