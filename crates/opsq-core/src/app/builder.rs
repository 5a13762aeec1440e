//! AppBuilder - Handler 登録と起動時検証
//!
//! - Builder パターン
//! - Fail-fast: `expect_job_types()` で期待集合を宣言し、`build()` で
//!   「期待集合 ⊆ 登録済み集合」をチェック

use std::sync::Arc;

use super::runtime::WorkerGroup;
use crate::config::OpsConfig;
use crate::ports::OpsStore;
use crate::typed::{Handler, JobPayload, RegistryError, TypedRegistry};

/// ```ignore
/// let app = AppBuilder::new()
///     .register::<Ingest, _>(IngestHandler)?
///     .expect_job_types(&["ingestion"])
///     .build()?;
/// let group = app.spawn(store, &config);
/// ```
#[derive(Default)]
pub struct AppBuilder {
    registry: TypedRegistry,
    expected: Option<Vec<String>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing job types: {0:?}; expected but no handler registered")]
    MissingJobTypes(Vec<String>),

    #[error("no handlers registered")]
    NoHandlers,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: JobPayload, H: Handler<T> + 'static>(
        mut self,
        handler: H,
    ) -> Result<Self, RegistryError> {
        self.registry.register::<T, H>(handler)?;
        Ok(self)
    }

    pub fn expect_job_types(mut self, job_types: &[&str]) -> Self {
        self.expected = Some(job_types.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn build(self) -> Result<App, BuildError> {
        if self.registry.is_empty() {
            return Err(BuildError::NoHandlers);
        }
        if let Some(expected) = &self.expected {
            let registered = self.registry.job_types();
            let missing: Vec<String> = expected
                .iter()
                .filter(|t| !registered.contains(t))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingJobTypes(missing));
            }
        }
        Ok(App {
            registry: Arc::new(self.registry),
        })
    }
}

/// 検証済みの Handler 集合
pub struct App {
    registry: Arc<TypedRegistry>,
}

impl App {
    pub fn registry(&self) -> &Arc<TypedRegistry> {
        &self.registry
    }

    pub fn job_types(&self) -> Vec<String> {
        self.registry.job_types()
    }

    /// ワーカー・ハートビート・リーパーを spawn する
    pub fn spawn(&self, store: Arc<dyn OpsStore>, config: &OpsConfig) -> WorkerGroup {
        WorkerGroup::spawn(store, Arc::clone(&self.registry), config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typed::{HandlerError, JobContext};
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    struct SkipTrace {
        subject: String,
    }

    impl JobPayload for SkipTrace {
        const TYPE: &'static str = "skip_trace";
    }

    struct SkipTraceHandler;

    #[async_trait]
    impl Handler<SkipTrace> for SkipTraceHandler {
        async fn handle(&self, _payload: SkipTrace, _ctx: &JobContext) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    #[test]
    fn build_succeeds_when_expected_types_are_registered() {
        let app = AppBuilder::new()
            .register::<SkipTrace, _>(SkipTraceHandler)
            .unwrap()
            .expect_job_types(&["skip_trace"])
            .build()
            .unwrap();
        assert_eq!(app.job_types(), vec!["skip_trace"]);
    }

    #[test]
    fn build_reports_missing_types() {
        let app = AppBuilder::new()
            .register::<SkipTrace, _>(SkipTraceHandler)
            .unwrap()
            .expect_job_types(&["skip_trace", "escalation"])
            .build();
        assert!(matches!(
            app,
            Err(BuildError::MissingJobTypes(missing)) if missing == vec!["escalation".to_string()]
        ));
    }

    #[test]
    fn build_without_handlers_fails() {
        assert!(matches!(AppBuilder::new().build(), Err(BuildError::NoHandlers)));
    }
}
