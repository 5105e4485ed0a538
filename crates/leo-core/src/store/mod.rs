//! Relational store abstraction.
//!
//! Every table the governance core touches is reached through the [`Store`]
//! trait: exact-match filters, a single `order by` column, and a row limit.
//! That is the whole query surface. "Most recent" lookups are expressed as
//! `order_desc("created_at").limit(1)`.
//!
//! Three backends exist:
//!
//! - [`MemoryStore`]: in-process tables behind a mutex, used by tests.
//! - [`FileStore`]: one JSON array per table under `.leo/db/`.
//! - [`SupabaseStore`]: PostgREST over blocking HTTP.
//!
//! [`Db`] wraps any backend with typed accessors for the LEO tables.

mod file;
mod memory;
mod repo;
mod supabase;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use repo::{fields, Db};
pub use supabase::SupabaseStore;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::{LeoError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;

pub type Row = serde_json::Map<String, Value>;

// ---------------------------------------------------------------------------
// Table names
// ---------------------------------------------------------------------------

pub mod tables {
    pub const STRATEGIC_DIRECTIVES: &str = "strategic_directives_v2";
    pub const PRDS: &str = "product_requirements_v2";
    pub const USER_STORIES: &str = "user_stories";
    pub const HANDOFFS: &str = "sd_phase_handoffs";
    pub const RETROSPECTIVES: &str = "retrospectives";
    pub const SUB_AGENT_RESULTS: &str = "sub_agent_execution_results";
    pub const IMPROVEMENTS: &str = "protocol_improvement_queue";
    pub const ASSESSMENTS: &str = "improvement_quality_assessments";
    pub const CONSTITUTION_VIOLATIONS: &str = "constitution_violations";
    pub const AEGIS_VIOLATIONS: &str = "aegis_violations";
    pub const ELIGIBILITY_AUDIT: &str = "auto_eligibility_audit";
    pub const UAT_CASES: &str = "uat_test_cases";
    pub const UAT_RESULTS: &str = "uat_test_results";
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Gte(String, Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(column.to_string(), value.into()));
        self
    }

    pub fn gte(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Gte(column.to_string(), value.into()));
        self
    }

    pub fn order_desc(mut self, column: &str) -> Self {
        self.order = Some((column.to_string(), Direction::Desc));
        self
    }

    pub fn order_asc(mut self, column: &str) -> Self {
        self.order = Some((column.to_string(), Direction::Asc));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// True if `row` satisfies every filter.
    pub fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|f| match f {
            Filter::Eq(col, want) => row.get(col).is_some_and(|v| values_equal(v, want)),
            Filter::Gte(col, bound) => row
                .get(col)
                .and_then(|v| compare_values(v, bound))
                .is_some_and(|o| o != Ordering::Less),
        })
    }

    /// Filter, order, and truncate an in-memory table. Rows are given in
    /// insertion order; ties keep the most recently inserted row first when
    /// ordering descending.
    pub fn apply(&self, rows: &[Row]) -> Vec<Row> {
        let mut out: Vec<Row> = rows.iter().filter(|r| self.matches(r)).cloned().collect();
        if let Some((col, dir)) = &self.order {
            if *dir == Direction::Desc {
                out.reverse();
            }
            out.sort_by(|a, b| {
                let ord = match (a.get(col), b.get(col)) {
                    (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
                    (Some(_), None) => Ordering::Greater,
                    (None, Some(_)) => Ordering::Less,
                    (None, None) => Ordering::Equal,
                };
                match dir {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                }
            });
        }
        if let Some(n) = self.limit {
            out.truncate(n);
        }
        out
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => {
            match (DateTime::parse_from_rfc3339(x), DateTime::parse_from_rfc3339(y)) {
                (Ok(tx), Ok(ty)) => Some(tx.cmp(&ty)),
                _ => Some(x.cmp(y)),
            }
        }
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

pub trait Store: Send + Sync {
    fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>>;

    /// Insert a row and return it as stored (with generated `id` and
    /// `created_at` when the caller left them out).
    fn insert(&self, table: &str, row: Row) -> Result<Row>;

    /// Merge `fields` into every row matching `query`. Returns the number of
    /// rows updated.
    fn update(&self, table: &str, query: &Query, fields: Row) -> Result<usize>;

    fn count(&self, table: &str, query: &Query) -> Result<usize> {
        Ok(self.select(table, query)?.len())
    }
}

/// Backend named by `store.backend`. Supabase needs a URL and a key.
pub fn open(root: &Path, cfg: &StoreConfig) -> Result<Arc<dyn Store>> {
    match cfg.backend {
        StoreBackend::File => Ok(Arc::new(FileStore::new(root))),
        StoreBackend::Supabase => {
            let url = cfg
                .supabase_url()
                .ok_or_else(|| LeoError::store("*", "no Supabase URL configured"))?;
            let key = cfg
                .supabase_key()
                .ok_or_else(|| LeoError::store("*", "no Supabase key in the environment"))?;
            Ok(Arc::new(SupabaseStore::new(&url, &key)))
        }
    }
}

/// Timestamp format used for `created_at`/`updated_at`. Fixed width so that
/// string ordering equals chronological ordering.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Fill `id` and `created_at` for local backends.
pub(crate) fn stamp_new_row(mut row: Row) -> Row {
    if !row.contains_key("id") {
        row.insert(
            "id".to_string(),
            Value::String(uuid::Uuid::new_v4().to_string()),
        );
    }
    if !row.contains_key("created_at") {
        row.insert("created_at".to_string(), Value::String(now_timestamp()));
    }
    row
}

/// Build a [`Row`] from any serializable value. Non-object values yield an
/// empty row.
pub fn to_row<T: serde::Serialize>(value: &T) -> Result<Row> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        _ => Ok(Row::new()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(v: Value) -> Row {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn eq_filter_compares_numbers_numerically() {
        let q = Query::new().eq("score", 85);
        assert!(q.matches(&row(json!({"score": 85.0}))));
        assert!(!q.matches(&row(json!({"score": 84}))));
        assert!(!q.matches(&row(json!({}))));
    }

    #[test]
    fn gte_filter_on_timestamps() {
        let q = Query::new().gte("created_at", "2026-01-02T00:00:00.000000Z");
        assert!(q.matches(&row(json!({"created_at": "2026-01-02T00:00:00.000000Z"}))));
        assert!(q.matches(&row(json!({"created_at": "2026-01-03T00:00:00.000000Z"}))));
        assert!(!q.matches(&row(json!({"created_at": "2026-01-01T23:59:59.000000Z"}))));
    }

    #[test]
    fn gte_filter_compares_mixed_timestamp_formats_chronologically() {
        let q = Query::new().gte("applied_at", "2026-03-01T12:00:00.000000Z");
        // Same instant, offset spelling and no fraction.
        assert!(q.matches(&row(json!({"applied_at": "2026-03-01T12:00:00+00:00"}))));
        // Later instant written with a negative offset sorts before as a string.
        assert!(q.matches(&row(json!({"applied_at": "2026-03-01T08:30:00-04:00"}))));
        // Earlier instant with higher fractional precision.
        assert!(!q.matches(&row(json!({"applied_at": "2026-03-01T11:59:59.999999999Z"}))));
        // Earlier instant written with a positive offset sorts after as a string.
        assert!(!q.matches(&row(json!({"applied_at": "2026-03-01T13:00:00+02:00"}))));
    }

    #[test]
    fn apply_orders_and_limits() {
        let rows = vec![
            row(json!({"id": "a", "created_at": "2026-01-01"})),
            row(json!({"id": "b", "created_at": "2026-01-03"})),
            row(json!({"id": "c", "created_at": "2026-01-02"})),
        ];
        let out = Query::new().order_desc("created_at").limit(2).apply(&rows);
        let ids: Vec<_> = out.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn desc_ties_prefer_latest_insert() {
        let rows = vec![
            row(json!({"id": "first", "created_at": "2026-01-01"})),
            row(json!({"id": "second", "created_at": "2026-01-01"})),
        ];
        let out = Query::new().order_desc("created_at").limit(1).apply(&rows);
        assert_eq!(out[0]["id"], "second");
    }

    #[test]
    fn stamp_keeps_caller_id() {
        let r = stamp_new_row(row(json!({"id": "keep"})));
        assert_eq!(r["id"], "keep");
        assert!(r.contains_key("created_at"));
    }
}
