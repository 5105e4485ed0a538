//! Effective SD type resolution and the per-type lookup tables that drive
//! gate selection, scoring weights, and thresholds.

use crate::error::{LeoError, Result};
use crate::llm::{complete_json, LlmClient};
use crate::records::StrategicDirective;
use crate::types::SdType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeSource {
    Declared,
    Ai,
    Category,
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeResolution {
    pub sd_type: SdType,
    pub confidence: u8,
    pub source: TypeSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct ResolveOptions {
    pub use_ai: bool,
    pub use_cache: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            use_ai: true,
            use_cache: true,
        }
    }
}

/// External classifier consulted when an SD has no declared type.
pub trait SdClassifier: Send + Sync {
    fn classify(&self, sd: &StrategicDirective) -> Result<TypeResolution>;
}

// ---------------------------------------------------------------------------
// ClassificationCache
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// AI classifications keyed by SD id. Lives as long as its owner; entries
/// are only dropped by [`ClassificationCache::clear`].
#[derive(Default)]
pub struct ClassificationCache {
    entries: Mutex<HashMap<String, TypeResolution>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ClassificationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, sd_id: &str) -> Option<TypeResolution> {
        let found = self
            .entries
            .lock()
            .ok()
            .and_then(|m| m.get(sd_id).cloned());
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    pub fn insert(&self, sd_id: &str, resolution: TypeResolution) {
        if let Ok(mut m) = self.entries.lock() {
            m.insert(sd_id.to_string(), resolution);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut m) = self.entries.lock() {
            m.clear();
        }
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.lock().map(|m| m.len()).unwrap_or(0),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

// ---------------------------------------------------------------------------
// SdTypeChecker
// ---------------------------------------------------------------------------

pub struct SdTypeChecker {
    classifier: Option<Arc<dyn SdClassifier>>,
    cache: Arc<ClassificationCache>,
}

impl SdTypeChecker {
    pub fn new(classifier: Option<Arc<dyn SdClassifier>>, cache: Arc<ClassificationCache>) -> Self {
        Self { classifier, cache }
    }

    /// Declared-only checker with a private cache.
    pub fn offline() -> Self {
        Self::new(None, Arc::new(ClassificationCache::new()))
    }

    pub fn cache(&self) -> &ClassificationCache {
        &self.cache
    }

    /// Declared type (100) → AI classifier → valid category (70) →
    /// `feature` (30). Classifier failures fall through silently.
    pub fn effective_type(&self, sd: &StrategicDirective, opts: ResolveOptions) -> TypeResolution {
        if let Some(t) = sd.sd_type.as_deref().and_then(SdType::parse) {
            return TypeResolution {
                sd_type: t,
                confidence: 100,
                source: TypeSource::Declared,
                reasoning: None,
            };
        }

        if opts.use_ai {
            if let Some(classifier) = &self.classifier {
                if opts.use_cache {
                    if let Some(hit) = self.cache.get(&sd.id) {
                        return hit;
                    }
                }
                match classifier.classify(sd) {
                    Ok(res) => {
                        if opts.use_cache {
                            self.cache.insert(&sd.id, res.clone());
                        }
                        return res;
                    }
                    Err(e) => tracing::warn!(sd = %sd.key(), "AI type classification failed: {e}"),
                }
            }
        }

        if let Some(t) = sd.category.as_deref().and_then(SdType::parse) {
            return TypeResolution {
                sd_type: t,
                confidence: 70,
                source: TypeSource::Category,
                reasoning: None,
            };
        }

        TypeResolution {
            sd_type: SdType::Feature,
            confidence: 30,
            source: TypeSource::Default,
            reasoning: None,
        }
    }
}

// ---------------------------------------------------------------------------
// LlmSdClassifier
// ---------------------------------------------------------------------------

const CLASSIFY_SYSTEM: &str = "You classify software work items. Reply with a JSON object \
{\"sd_type\": string, \"confidence\": integer 0-100, \"reasoning\": string}.";

pub struct LlmSdClassifier {
    llm: Arc<dyn LlmClient>,
}

impl LlmSdClassifier {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

impl SdClassifier for LlmSdClassifier {
    fn classify(&self, sd: &StrategicDirective) -> Result<TypeResolution> {
        let allowed: Vec<&str> = SdType::all().iter().map(|t| t.as_str()).collect();
        let prompt = format!(
            "Allowed types: {}\n\nTitle: {}\nCategory: {}\nDescription: {}",
            allowed.join(", "),
            sd.title,
            sd.category.as_deref().unwrap_or("-"),
            sd.description.as_deref().unwrap_or("-"),
        );
        let v = complete_json(self.llm.as_ref(), CLASSIFY_SYSTEM, &prompt)?;
        let raw = v.get("sd_type").and_then(|t| t.as_str()).unwrap_or("");
        let sd_type = SdType::parse(raw).ok_or_else(|| LeoError::InvalidSdType(raw.to_string()))?;
        let confidence = v
            .get("confidence")
            .and_then(|c| c.as_f64())
            .map(|c| c.clamp(0.0, 100.0) as u8)
            .unwrap_or(50);
        Ok(TypeResolution {
            sd_type,
            confidence,
            source: TypeSource::Ai,
            reasoning: v
                .get("reasoning")
                .and_then(|r| r.as_str())
                .map(str::to_string),
        })
    }
}

// ---------------------------------------------------------------------------
// Type profiles
// ---------------------------------------------------------------------------

/// Weighting of the four delivery dimensions; always sums to 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScoringWeights {
    pub requirements: u32,
    pub implementation: u32,
    pub testing: u32,
    pub documentation: u32,
}

impl ScoringWeights {
    pub fn total(&self) -> u32 {
        self.requirements + self.implementation + self.testing + self.documentation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThresholdProfile {
    pub prd_quality: u32,
    pub retrospective: u32,
    pub traceability: u32,
    pub workflow_roi: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ValidationProfile {
    pub requires_prd: bool,
    pub requires_user_stories: bool,
    pub requires_sub_agents: bool,
    pub is_non_code: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TypeProfile {
    pub weights: ScoringWeights,
    pub thresholds: ThresholdProfile,
    pub skipped_sub_agents: &'static [&'static str],
    pub requires_design_database_gates: bool,
    pub validation: ValidationProfile,
}

const fn profile(
    w: [u32; 4],
    t: [u32; 4],
    skipped: &'static [&'static str],
    design_db: bool,
    v: [bool; 4],
) -> TypeProfile {
    TypeProfile {
        weights: ScoringWeights {
            requirements: w[0],
            implementation: w[1],
            testing: w[2],
            documentation: w[3],
        },
        thresholds: ThresholdProfile {
            prd_quality: t[0],
            retrospective: t[1],
            traceability: t[2],
            workflow_roi: t[3],
        },
        skipped_sub_agents: skipped,
        requires_design_database_gates: design_db,
        validation: ValidationProfile {
            requires_prd: v[0],
            requires_user_stories: v[1],
            requires_sub_agents: v[2],
            is_non_code: v[3],
        },
    }
}

/// Row used for names outside the nine known types.
pub const DEFAULT_PROFILE: TypeProfile = profile(
    [25, 40, 25, 10],
    [70, 65, 70, 70],
    &[],
    false,
    [true, true, true, false],
);

// Columns: weights req/impl/test/doc, thresholds prd/retro/trace/roi,
// skipped sub-agents, design+database gates, prd/stories/sub-agents/non-code.
const PROFILES: &[(&str, TypeProfile)] = &[
    (
        "feature",
        profile([25, 40, 25, 10], [70, 65, 70, 70], &[], true, [true, true, true, false]),
    ),
    (
        "enhancement",
        profile([25, 40, 25, 10], [65, 60, 70, 65], &["DESIGN"], false, [true, true, true, false]),
    ),
    (
        "bugfix",
        profile(
            [20, 50, 25, 5],
            [60, 55, 60, 60],
            &["DESIGN", "STORIES"],
            false,
            [false, false, true, false],
        ),
    ),
    (
        "infrastructure",
        profile(
            [30, 40, 20, 10],
            [60, 55, 60, 60],
            &["DESIGN", "UAT"],
            false,
            [false, false, true, true],
        ),
    ),
    (
        "database",
        profile([25, 40, 25, 10], [70, 65, 70, 70], &["DESIGN"], true, [true, true, true, false]),
    ),
    (
        "security",
        profile([25, 35, 30, 10], [75, 70, 75, 70], &[], false, [true, true, true, false]),
    ),
    (
        "documentation",
        profile(
            [30, 10, 10, 50],
            [50, 50, 50, 50],
            &["TESTING", "DESIGN", "DATABASE", "PERFORMANCE"],
            false,
            [false, false, false, true],
        ),
    ),
    (
        "process",
        profile(
            [40, 20, 10, 30],
            [55, 50, 55, 55],
            &["TESTING", "DESIGN", "DATABASE"],
            false,
            [false, false, false, true],
        ),
    ),
    (
        "refactor",
        profile([20, 45, 30, 5], [65, 60, 65, 65], &["DESIGN"], false, [true, false, true, false]),
    ),
];

/// Profile for a type name; unknown names get [`DEFAULT_PROFILE`].
pub fn profile_for(name: &str) -> TypeProfile {
    let name = name.trim().to_ascii_lowercase();
    PROFILES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, p)| *p)
        .unwrap_or(DEFAULT_PROFILE)
}

pub fn scoring_weights(name: &str) -> ScoringWeights {
    profile_for(name).weights
}

pub fn threshold_profile(name: &str) -> ThresholdProfile {
    profile_for(name).thresholds
}

pub fn skipped_sub_agents(name: &str) -> &'static [&'static str] {
    profile_for(name).skipped_sub_agents
}

pub fn requires_design_database_gates(name: &str) -> bool {
    profile_for(name).requires_design_database_gates
}

pub fn validation_profile(name: &str) -> ValidationProfile {
    profile_for(name).validation
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
