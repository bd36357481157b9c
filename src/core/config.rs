//! Pipeline configuration from YAML

use crate::core::{error::ParseError, Pipeline};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Top-level pipeline configuration loaded from YAML
///
/// A document is either a bare list of stages or a mapping with a `steps` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Pipeline name
    #[serde(default)]
    pub name: Option<String>,

    /// Environment shared by every stage
    #[serde(default)]
    env: BTreeMap<String, Value>,

    /// Pipeline stages, in document order
    #[serde(default)]
    pub steps: Vec<StageConfig>,
}

/// Stage configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageConfig {
    /// Display name, may carry an icon tag such as `:python:`
    #[serde(default)]
    pub label: Option<String>,

    /// Optional unique identifier
    #[serde(default)]
    pub key: Option<String>,

    /// Named trigger conditions, all of which must hold
    #[serde(default)]
    pub conditions: Vec<String>,

    /// Shell commands, executed in order
    #[serde(default)]
    pub commands: Vec<String>,

    /// Single-command shorthand for `commands`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Whether a failure of this stage is advisory
    #[serde(default)]
    pub soft_fail: SoftFailConfig,

    /// Stage environment (overrides pipeline env)
    #[serde(default)]
    env: BTreeMap<String, Value>,

    /// Commands that always run once the stage concludes
    #[serde(default)]
    pub cleanup: Vec<String>,

    /// Timeout for the whole command sequence
    #[serde(default)]
    pub timeout_in_minutes: Option<u64>,
}

/// `soft_fail` as written in YAML: a flag or a list of exit status rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SoftFailConfig {
    Flag(bool),
    Rules(Vec<SoftFailRule>),
}

impl Default for SoftFailConfig {
    fn default() -> Self {
        SoftFailConfig::Flag(false)
    }
}

/// One `exit_status` entry of a `soft_fail` list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SoftFailRule {
    pub exit_status: ExitStatusMatch,
}

/// Exit status matcher: a code or `"*"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExitStatusMatch {
    Code(i32),
    Pattern(String),
}

impl StageConfig {
    /// Environment of this stage as plain strings
    pub fn env_as_string_map(&self) -> Result<BTreeMap<String, String>, ParseError> {
        scalar_map(&self.env)
    }
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ParseError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml(&content)?;

        // Name bare stage lists after the file
        if config.name.is_none() {
            config.name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned());
        }
        Ok(config)
    }

    /// Parse pipeline configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ParseError> {
        let document: Value = serde_yaml::from_str(yaml)?;
        let config = match document {
            Value::Sequence(_) => PipelineConfig {
                name: None,
                env: BTreeMap::new(),
                steps: serde_yaml::from_value(document)?,
            },
            Value::Mapping(_) => serde_yaml::from_value(document)?,
            _ => return Err(ParseError::UnsupportedShape),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate document-level constraints
    ///
    /// Per-stage field checks happen when the stage is built.
    pub fn validate(&self) -> Result<(), ParseError> {
        let mut seen_keys = HashSet::new();
        for (index, stage) in self.steps.iter().enumerate() {
            if let Some(key) = &stage.key {
                if !seen_keys.insert(key) {
                    return Err(ParseError::DuplicateKey {
                        position: index + 1,
                        label: stage.label.clone().unwrap_or_default(),
                        key: key.clone(),
                    });
                }
            }
        }

        self.env_as_string_map()?;
        Ok(())
    }

    /// Pipeline environment as plain strings
    pub fn env_as_string_map(&self) -> Result<BTreeMap<String, String>, ParseError> {
        scalar_map(&self.env)
    }

    /// Convert config to a Pipeline domain model
    pub fn to_pipeline(&self) -> Result<Pipeline, ParseError> {
        Pipeline::from_config(self)
    }
}

/// Load a pipeline from a YAML document
pub fn load(document: &str) -> Result<Pipeline, ParseError> {
    PipelineConfig::from_yaml(document)?.to_pipeline()
}

/// Load a pipeline from a YAML file
pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Pipeline, ParseError> {
    PipelineConfig::from_file(path)?.to_pipeline()
}

fn scalar_map(values: &BTreeMap<String, Value>) -> Result<BTreeMap<String, String>, ParseError> {
    values
        .iter()
        .map(|(name, value)| {
            let rendered = match value {
                Value::String(s) => s.clone(),
                Value::Bool(b) => b.to_string(),
                Value::Number(n) => n.to_string(),
                Value::Null => String::new(),
                _ => return Err(ParseError::InvalidEnvValue { name: name.clone() }),
            };
            Ok((name.clone(), rendered))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_stage_list() {
        let yaml = r#"
- label: ":python: Lint"
  commands:
    - ./ci/lint.sh
- label: ":book: Link check"
  conditions: ["docs_changed"]
  commands:
    - make linkcheck
  soft_fail: true
"#;

        let config = PipelineConfig::from_yaml(yaml).unwrap();
        assert!(config.name.is_none());
        assert_eq!(config.steps.len(), 2);
        assert_eq!(config.steps[1].conditions, vec!["docs_changed".to_string()]);
        assert_eq!(config.steps[1].soft_fail, SoftFailConfig::Flag(true));
        assert_eq!(config.steps[0].soft_fail, SoftFailConfig::Flag(false));
    }

    #[test]
    fn test_parse_steps_mapping() {
        let yaml = r#"
name: "Docs"
env:
  CI: true
  RETRIES: 3
steps:
  - label: "Build"
    command: make html
"#;

        let config = PipelineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.name.as_deref(), Some("Docs"));
        assert_eq!(config.steps[0].command.as_deref(), Some("make html"));

        let env = config.env_as_string_map().unwrap();
        assert_eq!(env.get("CI"), Some(&"true".to_string()));
        assert_eq!(env.get("RETRIES"), Some(&"3".to_string()));
    }

    #[test]
    fn test_parse_soft_fail_rules() {
        let yaml = r#"
- label: "Flaky"
  commands: ["./flaky.sh"]
  soft_fail:
    - exit_status: 1
    - exit_status: "*"
"#;

        let config = PipelineConfig::from_yaml(yaml).unwrap();
        assert_eq!(
            config.steps[0].soft_fail,
            SoftFailConfig::Rules(vec![
                SoftFailRule { exit_status: ExitStatusMatch::Code(1) },
                SoftFailRule { exit_status: ExitStatusMatch::Pattern("*".to_string()) },
            ])
        );
    }

    #[test]
    fn test_unknown_stage_key_fails() {
        let yaml = r#"
- label: "Build"
  commands: ["make"]
  retry: 3
"#;

        assert!(matches!(
            PipelineConfig::from_yaml(yaml),
            Err(ParseError::Yaml(_))
        ));
    }

    #[test]
    fn test_scalar_document_fails() {
        assert!(matches!(
            PipelineConfig::from_yaml("just a string"),
            Err(ParseError::UnsupportedShape)
        ));
    }

    #[test]
    fn test_duplicate_key_fails() {
        let yaml = r#"
- label: "One"
  key: "tests"
  commands: ["true"]
- label: "Two"
  key: "tests"
  commands: ["true"]
"#;

        match PipelineConfig::from_yaml(yaml) {
            Err(ParseError::DuplicateKey { position, key, .. }) => {
                assert_eq!(position, 2);
                assert_eq!(key, "tests");
            }
            other => panic!("Expected DuplicateKey, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_env_value_fails() {
        let yaml = r#"
env:
  NESTED:
    a: b
steps: []
"#;

        assert!(matches!(
            PipelineConfig::from_yaml(yaml),
            Err(ParseError::InvalidEnvValue { .. })
        ));
    }

    #[test]
    fn test_from_file_names_pipeline_after_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs-ci.yml");
        std::fs::write(&path, "- label: Build\n  commands: [make]\n").unwrap();

        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.name.as_deref(), Some("docs-ci"));
    }

    #[test]
    fn test_from_missing_file_fails() {
        let result = PipelineConfig::from_file("/tmp/nonexistent_pipeline_12345.yml");
        match result {
            Err(ParseError::Io { path, .. }) => {
                assert!(path.ends_with("nonexistent_pipeline_12345.yml"));
            }
            other => panic!("Expected Io error, got {:?}", other),
        }
    }
}
