use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = ".sonar-gate.toml";
pub const SONAR_PROPERTIES_FILE: &str = "sonar-project.properties";
const DEFAULT_RETRY_DELAY_SECS: u64 = 10;
const DEFAULT_GITHUB_API: &str = "https://api.github.com";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration loaded from .sonar-gate.toml.
///
/// All fields are optional in the file. Tokens fall back to environment
/// variables and the SonarQube host/project fall back to
/// sonar-project.properties.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sonar: SonarConfig,

    #[serde(default)]
    pub github: GitHubConfig,

    /// Monitoring endpoint. Forwarding is disabled unless `host` is set.
    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub gate: GateConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SonarConfig {
    /// Server base URL, e.g. https://sonar.example.com
    pub host: Option<String>,
    /// User token. If None, falls back to SONAR_TOKEN env var.
    pub token: Option<String>,
    pub project_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubConfig {
    /// GitHub API token. If None, falls back to GITHUB_TOKEN env var.
    pub token: Option<String>,
    /// REST API root; set for GitHub Enterprise.
    pub api_url: Option<String>,
    #[serde(default)]
    pub report_policy: ReportPolicy,
}

/// How the quality report comment is published.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportPolicy {
    /// Always create a new comment.
    #[default]
    Append,
    /// Edit the existing report comment when one is found.
    Update,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MonitorConfig {
    pub host: Option<String>,
    /// If None, falls back to MONITOR_TOKEN env var.
    pub token: Option<String>,
    pub project_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GateConfig {
    /// Wait before re-fetching a quality status that is not ready yet.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
        }
    }
}

fn default_retry_delay_secs() -> u64 {
    DEFAULT_RETRY_DELAY_SECS
}

impl Config {
    /// Load configuration from `path` (or .sonar-gate.toml in the current
    /// directory). Only a missing default file yields the default config;
    /// an explicit path must exist. SonarQube host and project key still
    /// missing afterwards are taken from SONAR_HOST_URL and then
    /// sonar-project.properties.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let mut config = Self::load_file(path, Path::new(DEFAULT_CONFIG_FILE))?;

        if config.sonar.host.is_none() {
            config.sonar.host = std::env::var("SONAR_HOST_URL").ok();
        }

        let properties = Path::new(SONAR_PROPERTIES_FILE);
        if properties.exists() {
            let contents = fs::read_to_string(properties)?;
            config.fill_from_properties(&parse_properties(&contents));
        }

        Ok(config)
    }

    fn load_file(path: Option<&Path>, default_path: &Path) -> Result<Config, ConfigError> {
        match path {
            Some(path) => Self::load_from(path),
            None if default_path.exists() => Self::load_from(default_path),
            None => Ok(Config::default()),
        }
    }

    /// Load from a specific path (useful for testing).
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Fill unset SonarQube settings from sonar-project.properties entries.
    pub fn fill_from_properties(&mut self, properties: &HashMap<String, String>) {
        if self.sonar.host.is_none() {
            self.sonar.host = properties.get("sonar.host.url").cloned();
        }
        if self.sonar.project_key.is_none() {
            self.sonar.project_key = properties.get("sonar.projectKey").cloned();
        }
    }

    pub fn sonar_token(&self) -> Option<String> {
        self.sonar
            .token
            .clone()
            .or_else(|| std::env::var("SONAR_TOKEN").ok())
    }

    /// Resolve the GitHub token: config file value takes precedence,
    /// falls back to GITHUB_TOKEN env var.
    pub fn github_token(&self) -> Option<String> {
        self.github
            .token
            .clone()
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
    }

    pub fn github_api_url(&self) -> String {
        self.github
            .api_url
            .as_deref()
            .unwrap_or(DEFAULT_GITHUB_API)
            .trim_end_matches('/')
            .to_string()
    }

    pub fn monitor_token(&self) -> Option<String> {
        self.monitor
            .token
            .clone()
            .or_else(|| std::env::var("MONITOR_TOKEN").ok())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.gate.retry_delay_secs)
    }
}

/// Parse Java-style `key=value` properties. Blank lines and `#`/`!`
/// comments are skipped; `:` is accepted as separator too.
pub fn parse_properties(contents: &str) -> HashMap<String, String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| {
            let split = line.find(['=', ':'])?;
            let key = line[..split].trim();
            let value = line[split + 1..].trim();
            (!key.is_empty()).then(|| (key.to_string(), value.to_string()))
        })
        .collect()
}
