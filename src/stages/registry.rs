use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::content::ContentStage;
use super::discovery::DiscoveryStage;
use super::scanning::ScanningStage;
use super::vulnerability::VulnerabilityStage;
use super::web::WebStage;
use super::{Stage, StageContext};
use crate::config::RunConfig;
use crate::core::errors::HawkeyeError;
use crate::core::models::{StageName, StageResult};

/// Stage implementations keyed by name.
#[derive(Default)]
pub struct StageRegistry {
    stages: HashMap<StageName, Arc<dyn Stage>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds every stage the configuration allows. A stage that cannot be
    /// constructed is left out with a warning.
    pub fn from_config(config: Arc<RunConfig>) -> Self {
        let ctx = StageContext::new(config);
        let mut registry = Self::new();

        registry.register_built(StageName::Discovery, DiscoveryStage::new(ctx.clone()));
        registry.register_built(StageName::Scanning, ScanningStage::new(ctx.clone()));
        registry.register_built(StageName::Web, WebStage::new(ctx.clone()));
        registry.register_built(StageName::Content, ContentStage::new(ctx.clone()));
        registry.register_built(StageName::Vulnerability, VulnerabilityStage::new(ctx));

        tracing::debug!("Registered {} stages", registry.stages.len());
        registry
    }

    fn register_built<S: Stage + 'static>(&mut self, name: StageName, built: Result<S, HawkeyeError>) {
        match built {
            Ok(stage) => self.register(Arc::new(stage)),
            Err(e) => tracing::warn!("Stage {} unavailable: {}", name, e),
        }
    }

    pub fn register(&mut self, stage: Arc<dyn Stage>) {
        self.stages.insert(stage.name(), stage);
    }

    pub fn get(&self, name: StageName) -> Option<&Arc<dyn Stage>> {
        self.stages.get(&name)
    }

    pub fn contains(&self, name: StageName) -> bool {
        self.stages.contains_key(&name)
    }

    /// Registered stage names in pipeline order.
    pub fn available_stages(&self) -> Vec<StageName> {
        StageName::ALL.into_iter().filter(|s| self.contains(*s)).collect()
    }

    /// Runs one stage and always comes back with a result.
    ///
    /// An unregistered stage, an `Err` from the stage or a panic inside it
    /// is logged once and turned into a `failed` result.
    pub async fn execute(&self, name: StageName, work_dir: &Path) -> StageResult {
        let stage_dir = work_dir.join(name.dir_name());

        let Some(stage) = self.get(name).cloned() else {
            tracing::error!("Unknown stage: {}", name);
            return StageResult::failed(stage_dir, format!("unknown stage: {}", name));
        };

        tracing::debug!("Stage {} tools: {}", name, stage.tools().join(", "));
        let work_dir = work_dir.to_path_buf();
        let span = tracing::info_span!("stage", name = %name);
        let mut task = AbortOnDrop(tokio::spawn(
            async move { stage.execute(&work_dir).await }.instrument(span),
        ));

        match (&mut task.0).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::error!("Stage {} failed: {:#}", name, e);
                StageResult::failed(stage_dir, format!("{:#}", e))
            }
            Err(e) => {
                tracing::error!("Stage {} aborted: {}", name, e);
                StageResult::failed(stage_dir, e)
            }
        }
    }
}

/// Aborts the stage task when the caller stops waiting for it, so an
/// interrupted run drops the stage future and its child processes with it.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::ToolFilter;
    use crate::core::models::{StageStatus, Target};
    use anyhow::{Result, bail};
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct Scripted {
        name: StageName,
        outcome: fn() -> Result<StageStatus>,
    }

    #[async_trait]
    impl Stage for Scripted {
        fn name(&self) -> StageName {
            self.name
        }

        fn tools(&self) -> &'static [&'static str] {
            &[]
        }

        async fn execute(&self, work_dir: &Path) -> Result<StageResult> {
            let status = (self.outcome)()?;
            Ok(StageResult::new(status, work_dir.join(self.name.dir_name())))
        }
    }

    fn registry_with(name: StageName, outcome: fn() -> Result<StageStatus>) -> StageRegistry {
        let mut registry = StageRegistry::new();
        registry.register(Arc::new(Scripted { name, outcome }));
        registry
    }

    #[tokio::test]
    async fn test_execute_returns_stage_result() {
        let dir = TempDir::new().unwrap();
        let registry = registry_with(StageName::Web, || Ok(StageStatus::Partial));
        let result = registry.execute(StageName::Web, dir.path()).await;
        assert_eq!(result.status, StageStatus::Partial);
    }

    #[tokio::test]
    async fn test_error_becomes_failed_result() {
        let dir = TempDir::new().unwrap();
        let registry = registry_with(StageName::Web, || bail!("crawler exploded"));
        let result = registry.execute(StageName::Web, dir.path()).await;
        assert_eq!(result.status, StageStatus::Failed);
        assert_eq!(result.get("error"), Some(&serde_json::json!("crawler exploded")));
        assert_eq!(result.stage_dir, dir.path().join("03-web"));
    }

    #[tokio::test]
    async fn test_panic_becomes_failed_result() {
        let dir = TempDir::new().unwrap();
        let registry = registry_with(StageName::Content, || panic!("boom"));
        let result = registry.execute(StageName::Content, dir.path()).await;
        assert_eq!(result.status, StageStatus::Failed);
    }

    #[tokio::test]
    async fn test_unknown_stage_is_failed_not_fatal() {
        let dir = TempDir::new().unwrap();
        let registry = StageRegistry::new();
        let result = registry.execute(StageName::Discovery, dir.path()).await;
        assert_eq!(result.status, StageStatus::Failed);
    }

    #[test]
    fn test_from_config_omits_unavailable_stages() {
        let mut config = RunConfig::for_target(Target::Host("example.com".to_string()));
        config.tools = ToolFilter {
            skip: vec![],
            only: vec!["subfinder".to_string(), "nuclei".to_string()],
        };
        let registry = StageRegistry::from_config(Arc::new(config));
        assert_eq!(
            registry.available_stages(),
            vec![StageName::Discovery, StageName::Vulnerability]
        );
    }
}
