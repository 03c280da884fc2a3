use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::analyzer::DEFAULT_MAX_DEPTH;
use crate::backends::DEFAULT_TIMEOUT_MINUTES;
use crate::executor::DEFAULT_MAX_CONCURRENCY;
use crate::tracker::JiraAuth;

/// Configuration file structure for CITriage.
///
/// Allows users to save connection and analysis settings and reuse them
/// across runs. Configuration files are loaded from the current directory or
/// a specified path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Jenkins connection settings
    #[serde(default)]
    pub jenkins: JenkinsConfig,

    /// AI analysis backend settings
    #[serde(default)]
    pub backend: BackendConfig,

    /// Issue tracker cross-reference settings
    #[serde(default)]
    pub tracker: TrackerConfig,

    /// Analysis parameters
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Output format preferences
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JenkinsConfig {
    /// Jenkins base URL
    pub url: Option<String>,

    /// Jenkins username
    pub user: Option<String>,

    /// Jenkins API token or password
    pub token: Option<String>,

    /// Verify TLS certificates (disable for self-signed Jenkins instances)
    #[serde(default = "default_true")]
    pub ssl_verify: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BackendConfig {
    /// AI provider name: claude, gemini, or cursor
    pub provider: Option<String>,

    /// Model identifier passed to the provider CLI
    pub model: Option<String>,

    /// Per-call timeout in minutes
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: u64,

    /// Existing checkout the backend may explore for code context
    pub workdir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TrackerConfig {
    /// Enable issue tracker cross-referencing
    #[serde(default)]
    pub enabled: bool,

    /// Jira base URL
    pub url: Option<String>,

    /// Limit searches to this project key
    pub project_key: Option<String>,

    /// Jira Cloud email (paired with api-token)
    pub email: Option<String>,

    /// Jira Cloud API token
    pub api_token: Option<String>,

    /// Jira Server/DC personal access token
    pub pat: Option<String>,

    /// Maximum issues fetched per search
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Verify TLS certificates
    #[serde(default = "default_true")]
    pub ssl_verify: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AnalysisConfig {
    /// Maximum recursion depth into failed child builds
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Maximum concurrently in-flight external calls
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Default output format
    #[serde(default)]
    pub format: OutputFormat,

    /// Pretty-print JSON output
    #[serde(default)]
    pub pretty: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Summary,
    Json,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            jenkins: JenkinsConfig::default(),
            backend: BackendConfig::default(),
            tracker: TrackerConfig::default(),
            analysis: AnalysisConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for JenkinsConfig {
    fn default() -> Self {
        Self {
            url: None,
            user: None,
            token: None,
            ssl_verify: true,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider: None,
            model: None,
            timeout_minutes: default_timeout_minutes(),
            workdir: None,
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            project_key: None,
            email: None,
            api_token: None,
            pat: None,
            max_results: default_max_results(),
            ssl_verify: true,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Summary,
            pretty: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_timeout_minutes() -> u64 {
    DEFAULT_TIMEOUT_MINUTES
}

fn default_max_results() -> usize {
    20
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

impl TrackerConfig {
    /// Credentials in order of preference: Cloud (email + API token), then
    /// Server/DC (PAT). `None` when neither pair is usable.
    pub fn auth(&self) -> Option<JiraAuth> {
        match (&self.email, &self.api_token, &self.pat) {
            (Some(email), Some(api_token), _) => Some(JiraAuth::Cloud {
                email: email.clone(),
                api_token: api_token.clone(),
            }),
            (_, _, Some(pat)) => Some(JiraAuth::Server { pat: pat.clone() }),
            _ => None,
        }
    }
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./citriage.toml
    /// 3. ./citriage.json
    /// 4. ./citriage.yaml
    /// 5. ./citriage.yml
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let candidates = [
            "citriage.toml",
            "citriage.json",
            "citriage.yaml",
            "citriage.yml",
        ];

        for candidate in &candidates {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load_from_path(path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => {
                // Try TOML first, then JSON, then YAML
                toml::from_str(&contents)
                    .or_else(|_| serde_json::from_str(&contents))
                    .or_else(|_| serde_yaml::from_str(&contents))
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))
            }
        }
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("yaml") | Some("yml") => serde_yaml::to_string(self)?,
            _ => toml::to_string_pretty(self)?,
        };

        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }
}
