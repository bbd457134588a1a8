use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use uw_blob::BlobStore;
use uw_config::UwConfig;
use uw_core::identity::Caller;
use uw_db::service::UwService;
use uw_llm::{Generative, HttpGenerative, LlmError, RetryPolicy, RetryingGenerative};
use uw_pipeline::{ModelIntake, Pipeline};

use crate::cli::GlobalFlags;

/// Shared application resources initialized once at startup.
pub struct AppContext {
    pub pipeline: Pipeline,
    pub caller: Caller,
}

impl AppContext {
    /// Open the database and blob store and wire the pipeline.
    ///
    /// Without a model endpoint the context still opens; only commands that
    /// reach the model fail, with the configuration hint from
    /// [`LlmError::NotConfigured`].
    pub async fn init(config: &UwConfig, flags: &GlobalFlags) -> anyhow::Result<Self> {
        ensure_parent_dir(&config.database.path)?;
        let store = UwService::new_local(&config.database.path)
            .await
            .with_context(|| format!("failed to open database at {}", config.database.path))?;
        let blobs = BlobStore::from_config(&config.storage).context("failed to open blob store")?;

        let generative: Arc<dyn Generative> = match HttpGenerative::from_config(&config.llm) {
            Ok(client) => Arc::new(RetryingGenerative::new(
                client,
                RetryPolicy::from_config(&config.retry),
            )),
            Err(LlmError::NotConfigured(hint)) => {
                tracing::debug!(%hint, "no model endpoint; model-bound commands will fail");
                Arc::new(Offline(hint))
            }
            Err(error) => return Err(error).context("failed to build model client"),
        };
        let intake = Arc::new(ModelIntake::new(generative.clone(), config.llm.max_tokens));

        let pipeline = Pipeline::new(Arc::new(store), blobs, generative, intake, config);
        Ok(Self {
            pipeline,
            caller: Caller::new(flags.tenant.as_str(), flags.actor.as_str()),
        })
    }
}

pub fn ensure_parent_dir(db_path: &str) -> anyhow::Result<()> {
    if db_path == ":memory:" {
        return Ok(());
    }
    if let Some(parent) = Path::new(db_path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    Ok(())
}

/// Stand-in model for an unconfigured endpoint.
struct Offline(String);

#[async_trait]
impl Generative for Offline {
    async fn complete(&self, _prompt: &str, _max_tokens: u32) -> Result<String, LlmError> {
        Err(LlmError::NotConfigured(self.0.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::ensure_parent_dir;

    #[test]
    fn creates_missing_database_directory() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join(".underwrite").join("underwrite.db");
        ensure_parent_dir(db.to_str().unwrap()).unwrap();
        assert!(dir.path().join(".underwrite").is_dir());
        assert!(!db.exists());
    }

    #[test]
    fn memory_database_needs_no_directory() {
        ensure_parent_dir(":memory:").unwrap();
    }
}
