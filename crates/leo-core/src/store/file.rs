use super::{stamp_new_row, Query, Row, Store};
use crate::error::{LeoError, Result};
use crate::io::atomic_write;
use crate::paths;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// One pretty-printed JSON array per table at `.leo/db/<table>.json`.
///
/// Every write rewrites the whole table atomically. The mutex serializes
/// writers within a process; nothing coordinates across processes.
pub struct FileStore {
    root: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn load(&self, table: &str) -> Result<Vec<Row>> {
        let path = paths::table_path(&self.root, table);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = std::fs::read_to_string(&path)?;
        if data.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&data)
            .map_err(|e| LeoError::store(table, format!("{}: {e}", path.display())))
    }

    fn save(&self, table: &str, rows: &[Row]) -> Result<()> {
        let data = serde_json::to_string_pretty(rows)?;
        atomic_write(&paths::table_path(&self.root, table), data.as_bytes())
    }
}

impl Store for FileStore {
    fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>> {
        Ok(query.apply(&self.load(table)?))
    }

    fn insert(&self, table: &str, row: Row) -> Result<Row> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| LeoError::store(table, "file store lock poisoned"))?;
        let mut rows = self.load(table)?;
        let row = stamp_new_row(row);
        rows.push(row.clone());
        self.save(table, &rows)?;
        Ok(row)
    }

    fn update(&self, table: &str, query: &Query, fields: Row) -> Result<usize> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| LeoError::store(table, "file store lock poisoned"))?;
        let mut rows = self.load(table)?;
        let mut n = 0;
        for row in rows.iter_mut().filter(|r| query.matches(r)) {
            for (k, v) in &fields {
                row.insert(k.clone(), v.clone());
            }
            n += 1;
        }
        if n > 0 {
            self.save(table, &rows)?;
        }
        Ok(n)
    }
}
