//! Persistence layer for pipeline run history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteExecutionStore;

use crate::core::{OverallStatus, PipelineReport, StageStatus};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Summary of a pipeline execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// Unique execution ID
    pub execution_id: Uuid,

    /// Pipeline name
    pub pipeline_name: String,

    /// Overall verdict
    pub status: OverallStatus,

    /// Whether the run was cancelled
    pub cancelled: bool,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,

    /// Stage counts
    pub passed: usize,
    pub failed: usize,
    pub soft_failed: usize,
    pub skipped: usize,
}

impl ExecutionSummary {
    /// Summarize a finished run
    pub fn from_report(report: &PipelineReport) -> Self {
        let result = &report.result;
        let soft_failed = result.soft_failures().len();

        Self {
            execution_id: report.execution_id,
            pipeline_name: report.pipeline_name.clone(),
            status: report.overall_status(),
            cancelled: report.cancelled,
            started_at: report.started_at,
            completed_at: report.completed_at,
            passed: result.count(StageStatus::Passed),
            failed: result.count(StageStatus::Failed) - soft_failed,
            soft_failed,
            skipped: result.count(StageStatus::Skipped),
        }
    }

    pub fn total_stages(&self) -> usize {
        self.passed + self.failed + self.soft_failed + self.skipped
    }

    pub fn duration(&self) -> std::time::Duration {
        self.completed_at
            .signed_duration_since(self.started_at)
            .to_std()
            .unwrap_or_default()
    }
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a pipeline execution
    async fn save_execution(&self, execution: &ExecutionSummary) -> Result<()>;

    /// Load an execution by ID
    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionSummary>>;

    /// List all executions for a pipeline, newest first
    async fn list_executions(&self, pipeline_name: &str) -> Result<Vec<ExecutionSummary>>;

    /// List all pipeline names
    async fn list_pipelines(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or `--no-history` runs)
#[derive(Default)]
pub struct InMemoryPersistence {
    executions: RwLock<HashMap<Uuid, ExecutionSummary>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_execution(&self, execution: &ExecutionSummary) -> Result<()> {
        self.executions
            .write()
            .await
            .insert(execution.execution_id, execution.clone());
        Ok(())
    }

    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionSummary>> {
        Ok(self.executions.read().await.get(&execution_id).cloned())
    }

    async fn list_executions(&self, pipeline_name: &str) -> Result<Vec<ExecutionSummary>> {
        let mut result: Vec<ExecutionSummary> = self
            .executions
            .read()
            .await
            .values()
            .filter(|e| e.pipeline_name == pipeline_name)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(result)
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .executions
            .read()
            .await
            .values()
            .map(|e| e.pipeline_name.clone())
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}
