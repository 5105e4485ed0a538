//! Shared fixture for gate tests.

use crate::gate::{evaluate, Gate, GateResult, GateSubject, OrchestratorView};
use crate::records::StrategicDirective;
use crate::sd_type::profile_for;
use crate::store::{fields, Db, MemoryStore, Row};
use crate::types::SdType;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

pub(crate) struct Fixture {
    pub dir: TempDir,
    pub db: Db,
    pub sd: StrategicDirective,
    pub sd_type: SdType,
    pub orchestrator: OrchestratorView,
    pub prior: BTreeMap<String, GateResult>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            db: Db::new(Arc::new(MemoryStore::new())),
            sd: StrategicDirective {
                id: "sd-1".into(),
                sd_key: Some("SD-TEST-001".into()),
                title: "Test directive".into(),
                sd_type: Some("feature".into()),
                metadata: json!({}),
                ..Default::default()
            },
            sd_type: SdType::Feature,
            orchestrator: OrchestratorView::default(),
            prior: BTreeMap::new(),
        }
    }

    pub fn with_type(mut self, t: SdType) -> Self {
        self.sd_type = t;
        self.sd.sd_type = Some(t.as_str().to_string());
        self
    }

    pub fn orchestrator(mut self, children: Vec<StrategicDirective>) -> Self {
        self.orchestrator = OrchestratorView {
            is_parent: true,
            children,
        };
        self
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn insert(&self, table: &str, row: Value) -> Row {
        self.db.insert(table, fields(row)).unwrap()
    }

    pub fn run(&self, gate: &dyn Gate) -> GateResult {
        let subject = GateSubject {
            sd: &self.sd,
            sd_type: self.sd_type,
            profile: profile_for(self.sd_type.as_str()),
            orchestrator: &self.orchestrator,
            db: &self.db,
            root: self.dir.path(),
        };
        evaluate(gate, &subject, &self.prior)
    }
}
