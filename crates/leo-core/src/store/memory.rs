use super::{stamp_new_row, Query, Row, Store};
use crate::error::{LeoError, Result};
use std::collections::HashMap;
use std::sync::Mutex;

/// In-process tables. Rows keep insertion order.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Vec<Row>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All rows of `table` in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .lock()
            .map(|t| t.get(table).cloned().unwrap_or_default())
            .unwrap_or_default()
    }
}

impl Store for MemoryStore {
    fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>> {
        let tables = self
            .tables
            .lock()
            .map_err(|_| LeoError::store(table, "memory store poisoned"))?;
        Ok(tables
            .get(table)
            .map(|rows| query.apply(rows))
            .unwrap_or_default())
    }

    fn insert(&self, table: &str, row: Row) -> Result<Row> {
        let row = stamp_new_row(row);
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| LeoError::store(table, "memory store poisoned"))?;
        tables.entry(table.to_string()).or_default().push(row.clone());
        Ok(row)
    }

    fn update(&self, table: &str, query: &Query, fields: Row) -> Result<usize> {
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| LeoError::store(table, "memory store poisoned"))?;
        let Some(rows) = tables.get_mut(table) else {
            return Ok(0);
        };
        let mut n = 0;
        for row in rows.iter_mut().filter(|r| query.matches(r)) {
            for (k, v) in &fields {
                row.insert(k.clone(), v.clone());
            }
            n += 1;
        }
        Ok(n)
    }
}
