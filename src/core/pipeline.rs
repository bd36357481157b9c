//! Pipeline domain model

use crate::core::{
    condition::{evaluate, Eligibility, TriggerContext},
    config::PipelineConfig,
    error::ParseError,
    stage::Stage,
};
use std::collections::BTreeMap;

const DEFAULT_PIPELINE_NAME: &str = "pipeline";

/// A loaded pipeline: stages in document order
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    /// Pipeline name
    pub name: String,

    /// Environment shared by all stages
    pub env: BTreeMap<String, String>,

    /// Stages, in document order
    pub stages: Vec<Stage>,
}

impl Pipeline {
    /// Create a pipeline from configuration
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ParseError> {
        let stages = config
            .steps
            .iter()
            .enumerate()
            .map(|(index, stage_config)| Stage::from_config(index, stage_config))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Pipeline {
            name: config
                .name
                .clone()
                .unwrap_or_else(|| DEFAULT_PIPELINE_NAME.to_string()),
            env: config.env_as_string_map()?,
            stages,
        })
    }

    /// Get a stage by position
    pub fn stage(&self, index: usize) -> Option<&Stage> {
        self.stages.get(index)
    }

    /// Get a stage by key
    pub fn stage_by_key(&self, key: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.key.as_deref() == Some(key))
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Eligibility of every stage, in document order
    pub fn plan(&self, context: &TriggerContext) -> Vec<(&Stage, Eligibility)> {
        self.stages
            .iter()
            .map(|stage| (stage, evaluate(stage, context)))
            .collect()
    }

    /// Stages that would run under the given context
    pub fn eligible_stages(&self, context: &TriggerContext) -> Vec<&Stage> {
        self.plan(context)
            .into_iter()
            .filter(|(_, eligibility)| eligibility.is_eligible())
            .map(|(stage, _)| stage)
            .collect()
    }

    /// Effective environment for a stage: pipeline env overlaid by stage env
    pub fn env_for_stage(&self, stage: &Stage) -> BTreeMap<String, String> {
        let mut env = self.env.clone();
        env.extend(stage.env.clone());
        env
    }
}
