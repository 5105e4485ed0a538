use anyhow::Context;
use leo_core::config::Config;
use leo_core::llm::{LlmClient, OpenAiClient};
use leo_core::store::{self, Db};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Loaded config plus the store it names.
pub struct Ctx {
    pub root: PathBuf,
    pub config: Config,
    pub db: Db,
}

impl Ctx {
    pub fn open(root: &Path) -> anyhow::Result<Self> {
        let config = Config::load(root).context("failed to load config")?;
        let backend = store::open(root, &config.store).context("failed to open store")?;
        Ok(Self {
            root: root.to_path_buf(),
            config,
            db: Db::new(backend),
        })
    }

    /// Configured model client, `None` when its API key is unset.
    pub fn llm(&self) -> Option<Arc<dyn LlmClient>> {
        OpenAiClient::from_config(&self.config.llm).map(|c| Arc::new(c) as Arc<dyn LlmClient>)
    }

    pub fn require_llm(&self) -> anyhow::Result<Arc<dyn LlmClient>> {
        self.llm().with_context(|| {
            format!(
                "no LLM configured: set {} (model {})",
                self.config.llm.api_key_env, self.config.llm.model
            )
        })
    }
}
