pub mod config;
pub mod models;
pub mod pipeline;
pub mod store;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::config::Settings;
use crate::pipeline::model::{GeminiClient, ModelError};
use crate::pipeline::{StageExecutor, Workflows};
use crate::store::ProjectStateStore;

/// Install the global tracing subscriber. Later calls are no-ops.
pub fn init_tracing() {
    let result = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();
    if result.is_ok() {
        tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);
    }
}

/// Workflow catalogue backed by the Gemini client and a fresh project store.
pub fn build_workflows(settings: &Settings) -> Result<Workflows, ModelError> {
    let client = Arc::new(GeminiClient::new(settings)?);
    let exec = StageExecutor::new(client, settings);
    Ok(Workflows::new(exec, Arc::new(ProjectStateStore::new())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
    }

    #[test]
    fn workflows_need_an_api_key() {
        assert!(matches!(
            build_workflows(&Settings::default()),
            Err(ModelError::NotConfigured(_))
        ));
        let settings = Settings {
            api_key: Some("test-key".into()),
            ..Settings::default()
        };
        assert!(build_workflows(&settings).is_ok());
    }
}
