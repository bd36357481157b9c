//! Trigger conditions and stage eligibility

use crate::core::stage::Stage;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Trigger facts for one pipeline run (condition name -> value)
///
/// Supplied by the invoking environment; the engine never computes them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerContext {
    facts: HashMap<String, bool>,
}

impl TriggerContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a fact
    pub fn set(&mut self, name: impl Into<String>, value: bool) {
        self.facts.insert(name.into(), value);
    }

    /// Builder-style [`TriggerContext::set`]
    pub fn with(mut self, name: impl Into<String>, value: bool) -> Self {
        self.set(name, value);
        self
    }

    /// Look up a fact; `None` when the environment never supplied it
    pub fn get(&self, name: &str) -> Option<bool> {
        self.facts.get(name).copied()
    }

    /// Copy every fact from `other`, overriding existing ones
    pub fn merge(&mut self, other: TriggerContext) {
        self.facts.extend(other.facts);
    }

    /// Number of facts
    pub fn len(&self) -> usize {
        self.facts.len()
    }

    /// Whether no facts were supplied
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Parse a YAML (or JSON) mapping of condition name to boolean
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::new());
        }
        let facts: HashMap<String, bool> =
            serde_yaml::from_str(yaml).context("Trigger context must map condition names to booleans")?;
        Ok(Self { facts })
    }

    /// Load a context file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read trigger context {}", path.display()))?;
        Self::from_yaml(&content)
    }
}

impl FromIterator<(String, bool)> for TriggerContext {
    fn from_iter<I: IntoIterator<Item = (String, bool)>>(iter: I) -> Self {
        Self {
            facts: iter.into_iter().collect(),
        }
    }
}

/// Detailed eligibility of a stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    Ineligible {
        /// Conditions the context does not know about
        missing: Vec<String>,
        /// Conditions the context sets to false
        unmet: Vec<String>,
    },
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }

    /// Human-readable reason for skipping, if ineligible
    pub fn skip_reason(&self) -> Option<String> {
        match self {
            Eligibility::Eligible => None,
            Eligibility::Ineligible { missing, unmet } => {
                let mut parts = Vec::new();
                if !unmet.is_empty() {
                    parts.push(format!("condition false: {}", unmet.join(", ")));
                }
                if !missing.is_empty() {
                    parts.push(format!("condition not set: {}", missing.join(", ")));
                }
                Some(parts.join("; "))
            }
        }
    }
}

/// Evaluate a stage's conditions against the context
///
/// Conditions are conjunctive. Names absent from the context count as false.
pub fn evaluate(stage: &Stage, context: &TriggerContext) -> Eligibility {
    let mut missing = Vec::new();
    let mut unmet = Vec::new();

    for condition in &stage.conditions {
        match context.get(condition) {
            Some(true) => {}
            Some(false) => unmet.push(condition.clone()),
            None => {
                debug!(
                    "Condition '{}' for stage {} not in trigger context, treating as false",
                    condition,
                    stage.display_name()
                );
                missing.push(condition.clone());
            }
        }
    }

    if missing.is_empty() && unmet.is_empty() {
        Eligibility::Eligible
    } else {
        Eligibility::Ineligible { missing, unmet }
    }
}

/// Whether a stage may run under the given context
pub fn is_eligible(stage: &Stage, context: &TriggerContext) -> bool {
    stage
        .conditions
        .iter()
        .all(|condition| context.get(condition).unwrap_or(false))
}
