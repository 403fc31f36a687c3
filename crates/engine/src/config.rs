//! Pipeline configuration.
//!
//! The hosting platform used to hand the pipeline its project, region, and
//! execution identifier through process-wide environment lookups. Here they
//! are collected once into an explicit [`PipelineConfig`] that is passed into
//! every run.
//!
//! Sources, lowest to highest precedence:
//! 1. built-in defaults
//! 2. a YAML or JSON file (`--config`, `SALESFLOW_CONFIG_PATH`, or
//!    `<config_dir>/salesflow/pipeline.yaml` when it exists)
//! 3. environment variables
//! 4. explicit [`ConfigOverrides`] (CLI flags)

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use dirs_next::config_dir;
use salesflow_api::validate_base_url;
use salesflow_types::Stage;
use salesflow_util::expand_tilde;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const CONFIG_PATH_ENV: &str = "SALESFLOW_CONFIG_PATH";
pub const PROJECT_ID_ENV: &str = "GOOGLE_CLOUD_PROJECT_ID";
pub const EXECUTION_ID_ENV: &str = "GOOGLE_CLOUD_WORKFLOW_EXECUTION_ID";
pub const REGION_ENV: &str = "SALESFLOW_REGION";
pub const BASE_URL_ENV: &str = "SALESFLOW_BASE_URL";
pub const ID_TOKEN_ENV: &str = "SALESFLOW_ID_TOKEN";

pub const DEFAULT_REGION: &str = "us-central1";
pub const DEFAULT_NOTIFICATION_FUNCTION: &str = "send-notification";

/// Error surfaced while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("project_id is required unless base_url is set (hint: set GOOGLE_CLOUD_PROJECT_ID or pass --project-id)")]
    MissingProjectId,

    #[error("region must not be empty")]
    EmptyRegion,

    #[error("function name for '{0}' must not be empty")]
    EmptyFunctionName(&'static str),

    #[error(transparent)]
    InvalidBaseUrl(#[from] salesflow_api::ClientError),
}

/// Deployed function names, one per stage plus the notifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FunctionNames {
    pub extract: String,
    pub transform: String,
    pub generate_reports: String,
    pub validate_data_quality: String,
    pub notification: String,
}

impl Default for FunctionNames {
    fn default() -> Self {
        Self {
            extract: Stage::Extract.default_function_name().to_string(),
            transform: Stage::Transform.default_function_name().to_string(),
            generate_reports: Stage::GenerateReports.default_function_name().to_string(),
            validate_data_quality: Stage::ValidateDataQuality.default_function_name().to_string(),
            notification: DEFAULT_NOTIFICATION_FUNCTION.to_string(),
        }
    }
}

impl FunctionNames {
    pub fn for_stage(&self, stage: Stage) -> &str {
        match stage {
            Stage::Extract => &self.extract,
            Stage::Transform => &self.transform,
            Stage::GenerateReports => &self.generate_reports,
            Stage::ValidateDataQuality => &self.validate_data_quality,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let entries = [
            ("extract", &self.extract),
            ("transform", &self.transform),
            ("generate_reports", &self.generate_reports),
            ("validate_data_quality", &self.validate_data_quality),
            ("notification", &self.notification),
        ];
        for (label, name) in entries {
            if name.trim().is_empty() {
                return Err(ConfigError::EmptyFunctionName(label));
            }
        }
        Ok(())
    }
}

/// Explicit run configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub project_id: Option<String>,
    pub region: String,
    /// Identifier of the hosting execution, echoed into failure notifications.
    pub execution_id: Option<String>,
    /// Overrides the derived `https://{region}-{project_id}.cloudfunctions.net` base.
    pub base_url: Option<String>,
    pub functions: FunctionNames,
    /// Bearer token for the functions. Only read from the environment, never serialized.
    #[serde(skip)]
    pub auth_token: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            region: DEFAULT_REGION.to_string(),
            execution_id: None,
            base_url: None,
            functions: FunctionNames::default(),
            auth_token: None,
        }
    }
}

/// Values supplied directly by the caller, typically CLI flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub project_id: Option<String>,
    pub region: Option<String>,
    pub execution_id: Option<String>,
    pub base_url: Option<String>,
}

impl PipelineConfig {
    /// Load configuration from file, environment, and overrides, then validate it.
    pub fn load(explicit_path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        let mut config = match resolve_config_path(explicit_path) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env();
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML (or JSON) configuration file without applying other sources.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded pipeline config file");
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay values present in the process environment.
    pub fn apply_env(&mut self) {
        if let Some(value) = non_empty_env(PROJECT_ID_ENV) {
            self.project_id = Some(value);
        }
        if let Some(value) = non_empty_env(REGION_ENV) {
            self.region = value;
        }
        if let Some(value) = non_empty_env(EXECUTION_ID_ENV) {
            self.execution_id = Some(value);
        }
        if let Some(value) = non_empty_env(BASE_URL_ENV) {
            self.base_url = Some(value);
        }
        if let Some(value) = non_empty_env(ID_TOKEN_ENV) {
            self.auth_token = Some(value);
        }
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(value) = &overrides.project_id {
            self.project_id = Some(value.clone());
        }
        if let Some(value) = &overrides.region {
            self.region = value.clone();
        }
        if let Some(value) = &overrides.execution_id {
            self.execution_id = Some(value.clone());
        }
        if let Some(value) = &overrides.base_url {
            self.base_url = Some(value.clone());
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.region.trim().is_empty() {
            return Err(ConfigError::EmptyRegion);
        }
        self.functions.validate()?;
        match &self.base_url {
            Some(base_url) => {
                validate_base_url(base_url)?;
            }
            None => {
                if self.project_id.as_deref().is_none_or(|id| id.trim().is_empty()) {
                    return Err(ConfigError::MissingProjectId);
                }
            }
        }
        Ok(())
    }

    /// Base URL the function names are appended to, without a trailing slash.
    pub fn functions_base_url(&self) -> Result<String, ConfigError> {
        if let Some(base_url) = &self.base_url {
            return Ok(base_url.trim_end_matches('/').to_string());
        }
        let project_id = self
            .project_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(ConfigError::MissingProjectId)?;
        Ok(format!("https://{}-{}.cloudfunctions.net", self.region.trim(), project_id))
    }

    pub fn stage_url(&self, stage: Stage) -> Result<String, ConfigError> {
        Ok(format!("{}/{}", self.functions_base_url()?, self.functions.for_stage(stage)))
    }

    pub fn notification_url(&self) -> Result<String, ConfigError> {
        Ok(format!("{}/{}", self.functions_base_url()?, self.functions.notification))
    }
}

/// Returns the default path for the pipeline configuration file.
pub fn default_config_path() -> PathBuf {
    if let Some(path) = non_empty_env(CONFIG_PATH_ENV) {
        return expand_tilde(&path);
    }
    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("salesflow")
        .join("pipeline.yaml")
}

/// An explicit path must exist; the default path is only used when present.
fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(expand_tilde(&path.to_string_lossy()));
    }
    let path = default_config_path();
    path.exists().then_some(path)
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CLEAN_ENV: [(&str, Option<&str>); 6] = [
        (CONFIG_PATH_ENV, None),
        (PROJECT_ID_ENV, None),
        (EXECUTION_ID_ENV, None),
        (REGION_ENV, None),
        (BASE_URL_ENV, None),
        (ID_TOKEN_ENV, None),
    ];

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn derives_cloud_functions_urls() {
        let config = PipelineConfig {
            project_id: Some("acme-sales".into()),
            ..PipelineConfig::default()
        };
        assert_eq!(
            config.stage_url(Stage::Extract).unwrap(),
            "https://us-central1-acme-sales.cloudfunctions.net/extract-sales-data"
        );
        assert_eq!(
            config.notification_url().unwrap(),
            "https://us-central1-acme-sales.cloudfunctions.net/send-notification"
        );
    }

    #[test]
    fn base_url_wins_over_project() {
        let config = PipelineConfig {
            project_id: Some("acme-sales".into()),
            base_url: Some("http://localhost:8080/".into()),
            ..PipelineConfig::default()
        };
        assert_eq!(
            config.stage_url(Stage::ValidateDataQuality).unwrap(),
            "http://localhost:8080/validate-data-quality"
        );
    }

    #[test]
    fn file_values_are_overlaid_by_env_and_overrides() {
        let file = write_config(
            r#"
project_id: from-file
region: europe-west1
functions:
  notification: notify-team
"#,
        );

        temp_env::with_vars(
            [
                (CONFIG_PATH_ENV, None),
                (PROJECT_ID_ENV, Some("from-env")),
                (EXECUTION_ID_ENV, Some("exec-123")),
                (REGION_ENV, None),
                (BASE_URL_ENV, None),
                (ID_TOKEN_ENV, Some("token-abc")),
            ],
            || {
                let overrides = ConfigOverrides {
                    region: Some("asia-east1".into()),
                    ..ConfigOverrides::default()
                };
                let config = PipelineConfig::load(Some(file.path()), &overrides).unwrap();
                assert_eq!(config.project_id.as_deref(), Some("from-env"));
                assert_eq!(config.region, "asia-east1");
                assert_eq!(config.execution_id.as_deref(), Some("exec-123"));
                assert_eq!(config.auth_token.as_deref(), Some("token-abc"));
                assert_eq!(config.functions.notification, "notify-team");
                assert_eq!(config.functions.extract, "extract-sales-data");
            },
        );
    }

    #[test]
    fn missing_project_is_rejected() {
        temp_env::with_vars(CLEAN_ENV, || {
            let temp_dir = tempfile::tempdir().unwrap();
            let absent = temp_dir.path().join("pipeline.yaml");
            temp_env::with_var(CONFIG_PATH_ENV, Some(absent.as_os_str()), || {
                let error = PipelineConfig::load(None, &ConfigOverrides::default()).unwrap_err();
                assert!(matches!(error, ConfigError::MissingProjectId));
            });
        });
    }

    #[test]
    fn unknown_keys_fail_to_parse() {
        let file = write_config("project_id: demo\nretries: 3\n");
        let error = PipelineConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(error, ConfigError::Parse { .. }));
    }

    #[test]
    fn plain_http_remote_base_url_is_rejected() {
        let config = PipelineConfig {
            base_url: Some("http://functions.example.com".into()),
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidBaseUrl(_))));
    }

    #[test]
    fn default_path_honors_environment_override() {
        temp_env::with_var(CONFIG_PATH_ENV, Some("~/custom/salesflow.yaml"), || {
            assert_eq!(default_config_path(), expand_tilde("~/custom/salesflow.yaml"));
        });
    }

    #[test]
    fn auth_token_is_never_serialized() {
        let config = PipelineConfig {
            project_id: Some("demo".into()),
            auth_token: Some("secret".into()),
            ..PipelineConfig::default()
        };
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(!yaml.contains("secret"));
    }
}
