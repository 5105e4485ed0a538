use crate::error::{LeoError, Result};
use crate::paths;
use crate::types::Operation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// StoreConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    File,
    Supabase,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Project URL. Falls back to `NEXT_PUBLIC_SUPABASE_URL` / `SUPABASE_URL`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl StoreConfig {
    pub fn supabase_url(&self) -> Option<String> {
        self.url
            .clone()
            .or_else(|| env_nonempty("NEXT_PUBLIC_SUPABASE_URL"))
            .or_else(|| env_nonempty("SUPABASE_URL"))
    }

    /// Service role key wins over the anon key when both are set.
    pub fn supabase_key(&self) -> Option<String> {
        env_nonempty("SUPABASE_SERVICE_ROLE_KEY")
            .or_else(|| env_nonempty("NEXT_PUBLIC_SUPABASE_ANON_KEY"))
    }
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

// ---------------------------------------------------------------------------
// ProtocolConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    #[serde(default = "default_protocol_dir")]
    pub dir: String,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,
    #[serde(default = "default_watch_interval")]
    pub watch_interval_seconds: u64,
}

fn default_protocol_dir() -> String {
    paths::DEFAULT_PROTOCOL_DIR.to_string()
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_watch_interval() -> u64 {
    60
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            dir: default_protocol_dir(),
            cache_ttl_seconds: default_cache_ttl(),
            watch_interval_seconds: default_watch_interval(),
        }
    }
}

// ---------------------------------------------------------------------------
// HandoffConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffConfig {
    #[serde(default = "default_plan_threshold")]
    pub plan_verification_threshold: u32,
    #[serde(default = "default_true")]
    pub enforce_protocol_reads: bool,
    /// Repository checked by git enforcement and documentation links.
    /// Relative paths resolve against the project root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_path: Option<String>,
}

fn default_plan_threshold() -> u32 {
    70
}

fn default_true() -> bool {
    true
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            plan_verification_threshold: default_plan_threshold(),
            enforce_protocol_reads: true,
            repo_path: None,
        }
    }
}

impl HandoffConfig {
    pub fn repo_root(&self, root: &Path) -> PathBuf {
        match &self.repo_path {
            Some(p) => root.join(p),
            None => root.to_path_buf(),
        }
    }
}

// ---------------------------------------------------------------------------
// AutoApplyConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoApplyConfig {
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    #[serde(default = "default_min_safety")]
    pub min_safety: f64,
    #[serde(default = "default_allowed_operations")]
    pub allowed_operations: Vec<String>,
    #[serde(default = "default_daily_limit")]
    pub daily_limit: usize,
}

fn default_min_score() -> f64 {
    85.0
}

fn default_min_safety() -> f64 {
    9.0
}

fn default_allowed_operations() -> Vec<String> {
    vec![Operation::Insert.as_str().to_string()]
}

fn default_daily_limit() -> usize {
    3
}

impl Default for AutoApplyConfig {
    fn default() -> Self {
        Self {
            min_score: default_min_score(),
            min_safety: default_min_safety(),
            allowed_operations: default_allowed_operations(),
            daily_limit: default_daily_limit(),
        }
    }
}

impl AutoApplyConfig {
    /// Parsed operations; unknown names are dropped (and reported by
    /// [`Config::validate`]).
    pub fn allowed(&self) -> Vec<Operation> {
        self.allowed_operations
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// JudgeConfig
// ---------------------------------------------------------------------------

pub const CRITERIA: [&str; 5] = ["safety", "specificity", "necessity", "evidence", "atomicity"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeConfig {
    #[serde(default = "default_weights")]
    pub weights: BTreeMap<String, u32>,
    /// Route violation records to `aegis_violations`. `USE_AEGIS=true`
    /// overrides a `false` here.
    #[serde(default)]
    pub use_aegis: bool,
}

pub fn default_weights() -> BTreeMap<String, u32> {
    [
        ("safety", 25),
        ("specificity", 20),
        ("necessity", 20),
        ("evidence", 20),
        ("atomicity", 15),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            weights: default_weights(),
            use_aegis: false,
        }
    }
}

impl JudgeConfig {
    pub fn aegis_enabled(&self) -> bool {
        self.use_aegis
            || env_nonempty("USE_AEGIS")
                .is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1")
    }
}

// ---------------------------------------------------------------------------
// LlmConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl LlmConfig {
    pub fn api_key(&self) -> Option<String> {
        env_nonempty(&self.api_key_env)
    }
}

// ---------------------------------------------------------------------------
// ProjectConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub project: ProjectConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub handoff: HandoffConfig,
    #[serde(default)]
    pub auto_apply: AutoApplyConfig,
    #[serde(default)]
    pub judge: JudgeConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

fn default_version() -> u32 {
    1
}

impl Config {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            version: 1,
            project: ProjectConfig {
                name: project_name.into(),
                description: None,
            },
            store: StoreConfig::default(),
            protocol: ProtocolConfig::default(),
            handoff: HandoffConfig::default(),
            auto_apply: AutoApplyConfig::default(),
            judge: JudgeConfig::default(),
            llm: LlmConfig::default(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(LeoError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn protocol_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.protocol.dir)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut push = |level: WarnLevel, message: String| {
            warnings.push(ConfigWarning { level, message });
        };

        // 1. Judge weights must cover known criteria and sum to 100
        for name in self.judge.weights.keys() {
            if !CRITERIA.contains(&name.as_str()) {
                push(
                    WarnLevel::Warning,
                    format!("unknown criterion '{name}' in judge.weights"),
                );
            }
        }
        let total: u32 = self.judge.weights.values().sum();
        if total != 100 {
            push(
                WarnLevel::Error,
                format!("judge.weights sum to {total}, expected 100"),
            );
        }

        // 2. Auto-apply thresholds and operations
        if !(0.0..=100.0).contains(&self.auto_apply.min_score) {
            push(
                WarnLevel::Error,
                format!(
                    "auto_apply.min_score={} is outside 0-100",
                    self.auto_apply.min_score
                ),
            );
        }
        if !(0.0..=10.0).contains(&self.auto_apply.min_safety) {
            push(
                WarnLevel::Error,
                format!(
                    "auto_apply.min_safety={} is outside 0-10",
                    self.auto_apply.min_safety
                ),
            );
        }
        for op in &self.auto_apply.allowed_operations {
            match op.parse::<Operation>() {
                Err(_) => push(
                    WarnLevel::Warning,
                    format!("unknown operation '{op}' in auto_apply.allowed_operations"),
                ),
                Ok(Operation::Delete) | Ok(Operation::Update) => push(
                    WarnLevel::Warning,
                    format!("auto_apply.allowed_operations includes {op}, which the risk classifier always governs"),
                ),
                Ok(_) => {}
            }
        }
        if self.auto_apply.daily_limit == 0 {
            push(
                WarnLevel::Warning,
                "auto_apply.daily_limit is 0; no improvement can ever auto-apply".to_string(),
            );
        }

        // 3. Handoff threshold
        if self.handoff.plan_verification_threshold > 100 {
            push(
                WarnLevel::Error,
                format!(
                    "handoff.plan_verification_threshold={} exceeds the 100-point scale",
                    self.handoff.plan_verification_threshold
                ),
            );
        }

        // 4. Store backend
        if self.store.backend == StoreBackend::Supabase {
            if self.store.supabase_url().is_none() {
                push(
                    WarnLevel::Error,
                    "store.backend is supabase but no URL is configured \
                     (store.url, NEXT_PUBLIC_SUPABASE_URL or SUPABASE_URL)"
                        .to_string(),
                );
            }
            if self.store.supabase_key().is_none() {
                push(
                    WarnLevel::Error,
                    "store.backend is supabase but neither SUPABASE_SERVICE_ROLE_KEY \
                     nor NEXT_PUBLIC_SUPABASE_ANON_KEY is set"
                        .to_string(),
                );
            }
        }

        // 5. Protocol cache
        if self.protocol.cache_ttl_seconds == 0 {
            push(
                WarnLevel::Warning,
                "protocol.cache_ttl_seconds is 0; every check re-reads the store".to_string(),
            );
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::new("governance");
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.project.name, "governance");
        assert_eq!(parsed.version, 1);
        assert_eq!(parsed.handoff.plan_verification_threshold, 70);
        assert_eq!(parsed.auto_apply.allowed(), vec![Operation::Insert]);
    }

    #[test]
    fn minimal_yaml_fills_defaults() {
        let yaml = "project:\n  name: p\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.store.backend, StoreBackend::File);
        assert_eq!(cfg.protocol.cache_ttl_seconds, 300);
        assert_eq!(cfg.protocol.watch_interval_seconds, 60);
        assert_eq!(cfg.auto_apply.daily_limit, 3);
        assert_eq!(cfg.judge.weights.values().sum::<u32>(), 100);
    }

    #[test]
    fn load_missing_is_not_initialized() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(LeoError::NotInitialized)
        ));
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::new("p");
        cfg.protocol.dir = "protocol".to_string();
        cfg.save(dir.path()).unwrap();
        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.protocol_dir(dir.path()), dir.path().join("protocol"));
    }

    #[test]
    fn default_config_has_no_errors() {
        let cfg = Config::new("p");
        assert!(cfg
            .validate()
            .iter()
            .all(|w| w.level != WarnLevel::Error));
    }

    #[test]
    fn validate_flags_bad_weights_and_operations() {
        let mut cfg = Config::new("p");
        cfg.judge.weights.insert("safety".to_string(), 30);
        cfg.auto_apply.allowed_operations = vec!["INSERT".into(), "TRUNCATE".into()];
        cfg.auto_apply.min_safety = 11.0;
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("sum to 105")));
        assert!(warnings.iter().any(|w| w.message.contains("TRUNCATE")));
        assert!(warnings.iter().any(|w| w.message.contains("min_safety")));
    }

    #[test]
    fn validate_flags_delete_as_auto_operation() {
        let mut cfg = Config::new("p");
        cfg.auto_apply.allowed_operations = vec!["DELETE".into()];
        assert!(cfg
            .validate()
            .iter()
            .any(|w| w.level == WarnLevel::Warning && w.message.contains("DELETE")));
    }
}
