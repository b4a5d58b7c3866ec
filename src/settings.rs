use crate::bootstrap::BootstrapPolicy;
use crate::cli::Cli;
use crate::output::OutputFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// System environment variable provider for production use
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Settings validation error: {0}")]
    Validation(String),

    #[error("Environment variable error: {0}")]
    Environment(String),

    #[error("Unsupported settings file format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, SettingsError>;

/// Tool settings, independent of the phpunit.xml being inspected
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Settings {
    pub bootstrap: BootstrapSettings,
    pub discovery: DiscoverySettings,
    pub resolution: ResolutionSettings,
    pub output: OutputSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct BootstrapSettings {
    /// What to do with the bootstrap file
    pub policy: BootstrapPolicy,
}

/// Directory walking and test-case classification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiscoverySettings {
    /// Follow symbolic links while enumerating suite directories
    pub follow_symlinks: bool,
    /// Fully-qualified names of the classes every test case descends from
    pub base_classes: Vec<String>,
    /// Treat an unknown parent class named `*TestCase` as a test base
    pub infer_external_bases: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ResolutionSettings {
    pub on_unresolved: UnresolvedPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct OutputSettings {
    pub format: OutputFormat,
    /// Verbosity level (0 = warnings, 1 = info, 2 = debug, 3+ = trace)
    pub verbose: u8,
    /// Errors only
    pub quiet: bool,
}

/// Behaviour when a test case's defining file cannot be resolved
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnresolvedPolicy {
    /// Log a warning and leave the test case out
    #[default]
    Skip,
    /// Abort the whole run
    Fail,
}

pub const DEFAULT_BASE_CLASSES: [&str; 2] = ["PHPUnit\\Framework\\TestCase", "PHPUnit_Framework_TestCase"];

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            follow_symlinks: true,
            base_classes: DEFAULT_BASE_CLASSES.iter().map(|s| s.to_string()).collect(),
            infer_external_bases: true,
        }
    }
}

const SETTINGS_FILE_NAMES: [&str; 4] = [
    "phpunit-finder.toml",
    "phpunit-finder.json",
    ".phpunit-finder.toml",
    ".phpunit-finder.json",
];

/// Settings manager for loading and layering settings
pub struct SettingsManager;

impl SettingsManager {
    /// Load settings with precedence: defaults -> file -> environment -> CLI
    pub async fn load(cli: &Cli, working_dir: &Path) -> Result<Settings> {
        Self::load_with(cli, working_dir, &SystemEnvProvider).await
    }

    /// Same as [`SettingsManager::load`] with a custom environment provider
    pub async fn load_with(cli: &Cli, working_dir: &Path, env: &impl EnvProvider) -> Result<Settings> {
        let mut settings = Settings::default();

        if let Some(settings_path) = &cli.settings {
            settings = Self::load_from_file(&working_dir.join(settings_path)).await?;
        } else if let Some(found) = Self::find_settings_file(working_dir).await? {
            settings = found;
        }

        settings = Self::apply_environment_overrides_with(env, settings)?;
        settings = Self::merge_with_cli(settings, cli);

        Self::validate(&settings)?;

        Ok(settings)
    }

    /// Load settings from a file (TOML or JSON)
    pub async fn load_from_file(path: &Path) -> Result<Settings> {
        let content = tokio::fs::read_to_string(path).await?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some(ext) => Err(SettingsError::UnsupportedFormat(ext.to_string())),
            None => {
                // Try to parse as TOML first, then JSON
                if let Ok(settings) = toml::from_str::<Settings>(&content) {
                    Ok(settings)
                } else {
                    Ok(serde_json::from_str(&content)?)
                }
            }
        }
    }

    /// Find a settings file in the working directory, then the user config directory
    pub async fn find_settings_file(working_dir: &Path) -> Result<Option<Settings>> {
        let mut candidates: Vec<PathBuf> = SETTINGS_FILE_NAMES
            .iter()
            .map(|name| working_dir.join(name))
            .collect();

        if let Some(config_dir) = dirs::config_dir() {
            let app_dir = config_dir.join("phpunit-finder");
            candidates.extend(SETTINGS_FILE_NAMES.iter().map(|name| app_dir.join(name)));
        }

        for path in candidates {
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                tracing::debug!(path = %path.display(), "loading settings file");
                return Ok(Some(Self::load_from_file(&path).await?));
            }
        }

        Ok(None)
    }

    /// Apply environment variable overrides using the system environment
    pub fn apply_environment_overrides(settings: Settings) -> Result<Settings> {
        Self::apply_environment_overrides_with(&SystemEnvProvider, settings)
    }

    /// Apply environment variable overrides with a custom environment provider
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut settings: Settings,
    ) -> Result<Settings> {
        if let Some(policy) = env.get("PHPUNIT_FINDER_BOOTSTRAP_POLICY") {
            settings.bootstrap.policy = match policy.to_lowercase().as_str() {
                "require" => BootstrapPolicy::Require,
                "optional" => BootstrapPolicy::Optional,
                "skip" => BootstrapPolicy::Skip,
                _ => {
                    return Err(SettingsError::Environment(format!(
                        "Invalid PHPUNIT_FINDER_BOOTSTRAP_POLICY value: {}",
                        policy
                    )));
                }
            };
        }

        if let Some(strict) = env.get("PHPUNIT_FINDER_STRICT") {
            let strict: bool = strict.parse().map_err(|_| {
                SettingsError::Environment(format!("Invalid PHPUNIT_FINDER_STRICT value: {}", strict))
            })?;
            settings.resolution.on_unresolved = if strict {
                UnresolvedPolicy::Fail
            } else {
                UnresolvedPolicy::Skip
            };
        }

        if let Some(format) = env.get("PHPUNIT_FINDER_FORMAT") {
            settings.output.format = match format.to_lowercase().as_str() {
                "plain" => OutputFormat::Plain,
                "json" => OutputFormat::Json,
                _ => {
                    return Err(SettingsError::Environment(format!(
                        "Invalid PHPUNIT_FINDER_FORMAT value: {}",
                        format
                    )));
                }
            };
        }

        if let Some(follow) = env.get("PHPUNIT_FINDER_FOLLOW_SYMLINKS") {
            settings.discovery.follow_symlinks = follow.parse().map_err(|_| {
                SettingsError::Environment(format!(
                    "Invalid PHPUNIT_FINDER_FOLLOW_SYMLINKS value: {}",
                    follow
                ))
            })?;
        }

        if let Some(bases) = env.get("PHPUNIT_FINDER_BASE_CLASSES") {
            settings.discovery.base_classes = bases
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Some(infer) = env.get("PHPUNIT_FINDER_INFER_EXTERNAL_BASES") {
            settings.discovery.infer_external_bases = infer.parse().map_err(|_| {
                SettingsError::Environment(format!(
                    "Invalid PHPUNIT_FINDER_INFER_EXTERNAL_BASES value: {}",
                    infer
                ))
            })?;
        }

        Ok(settings)
    }

    /// Merge CLI arguments into settings (CLI takes precedence)
    pub fn merge_with_cli(mut settings: Settings, cli: &Cli) -> Settings {
        if let Some(policy) = cli.bootstrap_policy {
            settings.bootstrap.policy = policy;
        }
        if cli.strict {
            settings.resolution.on_unresolved = UnresolvedPolicy::Fail;
        }
        if let Some(format) = cli.format {
            settings.output.format = format;
        }
        if cli.verbose > 0 {
            settings.output.verbose = cli.verbose;
        }
        if cli.quiet {
            settings.output.quiet = true;
        }

        settings
    }

    /// Validate settings values
    pub fn validate(settings: &Settings) -> Result<()> {
        if settings.discovery.base_classes.is_empty() {
            return Err(SettingsError::Validation(
                "At least one test base class must be specified".to_string(),
            ));
        }

        for base in &settings.discovery.base_classes {
            if base.trim_start_matches('\\').is_empty() || base.contains('/') {
                return Err(SettingsError::Validation(format!(
                    "Invalid base class name: {}",
                    base
                )));
            }
        }

        if settings.output.verbose > 0 && settings.output.quiet {
            return Err(SettingsError::Validation(
                "Cannot enable both verbose and quiet modes".to_string(),
            ));
        }

        Ok(())
    }
}
