use super::{tables, to_row, Query, Row, Store};
use crate::error::{LeoError, Result};
use crate::records::{
    Improvement, PhaseHandoff, ProductRequirement, QualityAssessment, Retrospective,
    StrategicDirective, SubAgentResult, UatCase, UatResult, UserStory,
    IMPROVEMENT_STATUS_APPLIED, STORY_STATUS_COMPLETED, STORY_VALIDATION_VALIDATED,
};
use crate::types::{HandoffType, RiskTier};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;

/// Typed accessors over a [`Store`] for the LEO tables.
#[derive(Clone)]
pub struct Db {
    store: Arc<dyn Store>,
}

fn decode<T: DeserializeOwned>(table: &str, row: Row) -> Result<T> {
    serde_json::from_value(Value::Object(row)).map_err(|e| LeoError::store(table, e.to_string()))
}

fn decode_all<T: DeserializeOwned>(table: &str, rows: Vec<Row>) -> Result<Vec<T>> {
    rows.into_iter().map(|r| decode(table, r)).collect()
}

/// Build a field map from `json!` object literals.
pub fn fields(value: Value) -> Row {
    match value {
        Value::Object(m) => m,
        _ => Row::new(),
    }
}

impl Db {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    fn first<T: DeserializeOwned>(&self, table: &str, query: Query) -> Result<Option<T>> {
        let mut rows = self.store.select(table, &query.limit(1))?;
        if rows.is_empty() {
            return Ok(None);
        }
        decode(table, rows.remove(0)).map(Some)
    }

    fn all<T: DeserializeOwned>(&self, table: &str, query: Query) -> Result<Vec<T>> {
        decode_all(table, self.store.select(table, &query)?)
    }

    // -----------------------------------------------------------------------
    // Strategic directives
    // -----------------------------------------------------------------------

    /// Look up an SD by UUID or human key. UUID-shaped input is tried as an
    /// id first; anything else is tried as a key first. PostgREST rejects a
    /// non-UUID value against the `id` column, so the id fallback for a
    /// non-UUID reference treats a store error as "no row".
    pub fn find_sd(&self, id_or_key: &str) -> Result<Option<StrategicDirective>> {
        let t = tables::STRATEGIC_DIRECTIVES;
        let by_id = || Query::new().eq("id", id_or_key);
        let by_key = || Query::new().eq("sd_key", id_or_key);

        if uuid::Uuid::parse_str(id_or_key).is_ok() {
            if let Some(sd) = self.first(t, by_id())? {
                return Ok(Some(sd));
            }
            return self.first(t, by_key());
        }

        if let Some(sd) = self.first(t, by_key())? {
            return Ok(Some(sd));
        }
        match self.first(t, by_id()) {
            Err(LeoError::Store { message, .. }) => {
                tracing::debug!(sd = id_or_key, "id lookup rejected: {message}");
                Ok(None)
            }
            other => other,
        }
    }

    pub fn sd(&self, id_or_key: &str) -> Result<StrategicDirective> {
        self.find_sd(id_or_key)?
            .ok_or_else(|| LeoError::SdNotFound(id_or_key.to_string()))
    }

    pub fn children(&self, parent_id: &str) -> Result<Vec<StrategicDirective>> {
        self.all(
            tables::STRATEGIC_DIRECTIVES,
            Query::new().eq("parent_sd_id", parent_id).order_asc("created_at"),
        )
    }

    pub fn update_sd(&self, id: &str, mut fields: Row) -> Result<usize> {
        fields.insert("updated_at".into(), json!(super::now_timestamp()));
        self.store
            .update(tables::STRATEGIC_DIRECTIVES, &Query::new().eq("id", id), fields)
    }

    pub fn insert_sd(&self, fields: Row) -> Result<StrategicDirective> {
        let row = self.store.insert(tables::STRATEGIC_DIRECTIVES, fields)?;
        decode(tables::STRATEGIC_DIRECTIVES, row)
    }

    // -----------------------------------------------------------------------
    // PRDs and user stories
    // -----------------------------------------------------------------------

    pub fn prd_for_sd(&self, sd_id: &str) -> Result<Option<ProductRequirement>> {
        self.first(
            tables::PRDS,
            Query::new().eq("sd_id", sd_id).order_desc("created_at"),
        )
    }

    pub fn update_prd(&self, id: &str, mut fields: Row) -> Result<usize> {
        fields.insert("updated_at".into(), json!(super::now_timestamp()));
        self.store
            .update(tables::PRDS, &Query::new().eq("id", id), fields)
    }

    pub fn stories_for_prd(&self, prd_id: &str) -> Result<Vec<UserStory>> {
        self.all(tables::USER_STORIES, Query::new().eq("prd_id", prd_id))
    }

    pub fn stories_for_sd(&self, sd_id: &str) -> Result<Vec<UserStory>> {
        self.all(tables::USER_STORIES, Query::new().eq("sd_id", sd_id))
    }

    /// Force every story matching `column = value` to completed/validated.
    pub fn finalize_stories(&self, column: &str, value: &str) -> Result<usize> {
        self.store.update(
            tables::USER_STORIES,
            &Query::new().eq(column, value),
            fields(json!({
                "status": STORY_STATUS_COMPLETED,
                "validation_status": STORY_VALIDATION_VALIDATED,
            })),
        )
    }

    // -----------------------------------------------------------------------
    // Handoffs
    // -----------------------------------------------------------------------

    /// Most recent handoff of `kind` for the SD, optionally only accepted ones.
    pub fn latest_handoff(
        &self,
        sd_id: &str,
        kind: HandoffType,
        accepted_only: bool,
    ) -> Result<Option<PhaseHandoff>> {
        let mut q = Query::new()
            .eq("sd_id", sd_id)
            .eq("handoff_type", kind.as_str());
        if accepted_only {
            q = q.eq("status", "accepted");
        }
        self.first(tables::HANDOFFS, q.order_desc("created_at"))
    }

    pub fn handoffs(&self, sd_id: &str) -> Result<Vec<PhaseHandoff>> {
        self.all(
            tables::HANDOFFS,
            Query::new().eq("sd_id", sd_id).order_desc("created_at"),
        )
    }

    pub fn insert_handoff(&self, handoff: &PhaseHandoff) -> Result<Row> {
        let mut row = to_row(handoff)?;
        if handoff.id.is_empty() {
            row.remove("id");
        }
        if handoff.created_at.is_none() {
            row.remove("created_at");
        }
        self.store.insert(tables::HANDOFFS, row)
    }

    // -----------------------------------------------------------------------
    // Retrospectives and sub-agent results
    // -----------------------------------------------------------------------

    pub fn latest_retro(&self, sd_id: &str) -> Result<Option<Retrospective>> {
        self.first(
            tables::RETROSPECTIVES,
            Query::new().eq("sd_id", sd_id).order_desc("created_at"),
        )
    }

    pub fn insert_retro(&self, fields: Row) -> Result<Retrospective> {
        let row = self.store.insert(tables::RETROSPECTIVES, fields)?;
        decode(tables::RETROSPECTIVES, row)
    }

    pub fn update_retro(&self, id: &str, fields: Row) -> Result<usize> {
        self.store
            .update(tables::RETROSPECTIVES, &Query::new().eq("id", id), fields)
    }

    pub fn sub_agent_results(&self, sd_id: &str) -> Result<Vec<SubAgentResult>> {
        self.all(
            tables::SUB_AGENT_RESULTS,
            Query::new().eq("sd_id", sd_id).order_desc("created_at"),
        )
    }

    pub fn insert_sub_agent_result(&self, fields: Row) -> Result<Row> {
        self.store.insert(tables::SUB_AGENT_RESULTS, fields)
    }

    // -----------------------------------------------------------------------
    // Improvement queue
    // -----------------------------------------------------------------------

    pub fn improvement(&self, id: &str) -> Result<Improvement> {
        self.first(tables::IMPROVEMENTS, Query::new().eq("id", id))?
            .ok_or_else(|| LeoError::ImprovementNotFound(id.to_string()))
    }

    pub fn pending_improvements(&self) -> Result<Vec<Improvement>> {
        self.all(
            tables::IMPROVEMENTS,
            Query::new().eq("status", "PENDING").order_asc("created_at"),
        )
    }

    pub fn set_improvement_status(&self, id: &str, status: &str) -> Result<usize> {
        self.store.update(
            tables::IMPROVEMENTS,
            &Query::new().eq("id", id),
            fields(json!({"status": status, "updated_at": super::now_timestamp()})),
        )
    }

    /// AUTO-tier improvements applied at or after `since`.
    pub fn count_auto_applied_since(&self, since: DateTime<Utc>) -> Result<usize> {
        self.store.count(
            tables::IMPROVEMENTS,
            &Query::new()
                .eq("status", IMPROVEMENT_STATUS_APPLIED)
                .eq("risk_tier", RiskTier::Auto.as_str())
                .gte(
                    "applied_at",
                    since.to_rfc3339_opts(SecondsFormat::Micros, true),
                ),
        )
    }

    pub fn insert_assessment(&self, assessment: &QualityAssessment) -> Result<Row> {
        self.store
            .insert(tables::ASSESSMENTS, to_row(assessment)?)
    }

    pub fn latest_assessment(&self, improvement_id: &str) -> Result<Option<QualityAssessment>> {
        self.first(
            tables::ASSESSMENTS,
            Query::new()
                .eq("improvement_id", improvement_id)
                .order_desc("created_at"),
        )
    }

    // -----------------------------------------------------------------------
    // UAT
    // -----------------------------------------------------------------------

    pub fn uat_case(&self, id: &str) -> Result<Option<UatCase>> {
        self.first(tables::UAT_CASES, Query::new().eq("id", id))
    }

    pub fn uat_result(&self, id: &str) -> Result<UatResult> {
        self.first(tables::UAT_RESULTS, Query::new().eq("id", id))?
            .ok_or_else(|| LeoError::UatResultNotFound(id.to_string()))
    }

    pub fn uat_results_for_run(&self, run_id: &str) -> Result<Vec<UatResult>> {
        self.all(tables::UAT_RESULTS, Query::new().eq("run_id", run_id))
    }

    pub fn update_uat_result(&self, id: &str, fields: Row) -> Result<usize> {
        self.store
            .update(tables::UAT_RESULTS, &Query::new().eq("id", id), fields)
    }

    /// Raw insert for audit and violation tables.
    pub fn insert(&self, table: &str, fields: Row) -> Result<Row> {
        self.store.insert(table, fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn db() -> (Arc<MemoryStore>, Db) {
        let mem = Arc::new(MemoryStore::new());
        (mem.clone(), Db::new(mem))
    }

    #[test]
    fn find_sd_by_id_or_key() {
        let (_, db) = db();
        db.insert_sd(fields(json!({"id": "uuid-1", "sd_key": "SD-ONE"})))
            .unwrap();
        assert_eq!(db.sd("uuid-1").unwrap().key(), "SD-ONE");
        assert_eq!(db.sd("SD-ONE").unwrap().id, "uuid-1");
        assert!(matches!(db.sd("nope"), Err(LeoError::SdNotFound(_))));
    }

    #[test]
    fn latest_accepted_handoff_wins() {
        let (mem, db) = db();
        for (status, at) in [
            ("accepted", "2026-01-01T00:00:00.000000Z"),
            ("rejected", "2026-01-03T00:00:00.000000Z"),
            ("accepted", "2026-01-02T00:00:00.000000Z"),
        ] {
            mem.insert(
                tables::HANDOFFS,
                fields(json!({
                    "sd_id": "s1",
                    "handoff_type": "EXEC-TO-PLAN",
                    "status": status,
                    "created_at": at,
                })),
            )
            .unwrap();
        }
        let h = db
            .latest_handoff("s1", HandoffType::ExecToPlan, true)
            .unwrap()
            .unwrap();
        assert_eq!(h.created_at.as_deref(), Some("2026-01-02T00:00:00.000000Z"));
        let any = db
            .latest_handoff("s1", HandoffType::ExecToPlan, false)
            .unwrap()
            .unwrap();
        assert!(!any.is_accepted());
    }

    #[test]
    fn finalize_stories_marks_validated() {
        let (mem, db) = db();
        mem.insert(
            tables::USER_STORIES,
            fields(json!({"prd_id": "p1", "status": "draft"})),
        )
        .unwrap();
        assert_eq!(db.finalize_stories("prd_id", "p1").unwrap(), 1);
        let s = &db.stories_for_prd("p1").unwrap()[0];
        assert!(s.is_completed());
        assert_eq!(s.validation_status.as_deref(), Some("validated"));
    }

    #[test]
    fn counts_recent_auto_applies_only() {
        let (mem, db) = db();
        let now = Utc::now();
        let recent = (now - chrono::Duration::hours(1)).to_rfc3339_opts(SecondsFormat::Micros, true);
        let old = (now - chrono::Duration::hours(30)).to_rfc3339_opts(SecondsFormat::Micros, true);
        for (tier, at) in [("AUTO", &recent), ("AUTO", &old), ("GOVERNED", &recent)] {
            mem.insert(
                tables::IMPROVEMENTS,
                fields(json!({"status": "APPLIED", "risk_tier": tier, "applied_at": at})),
            )
            .unwrap();
        }
        let since = now - chrono::Duration::hours(24);
        assert_eq!(db.count_auto_applied_since(since).unwrap(), 1);
    }
}
