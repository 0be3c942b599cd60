//! Workspace configuration.
//!
//! A single typed value persisted as TOML at `<base>/config.toml`, with a
//! marker file `<base>/devsolo.toml` declaring the workspace initialized.
//! Saves are atomic (temp sibling + rename) and serialized across processes
//! via an exclusive lock on a sibling `.lock` file. The value is immutable
//! process-wide after load; reloads happen only through [`Config::reload`].

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Deserializer, Serialize};

use crate::utils;

/// Default workspace directory, relative to the repository root.
pub const DEFAULT_BASE_DIR: &str = ".devsolo";

/// Environment variable overriding the workspace directory.
pub const BASE_PATH_ENV: &str = "DEVSOLO_BASE_PATH";

/// Configuration format version.
pub const CONFIG_VERSION: &str = "1.0";

/// Where the workspace lives.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    schemars::JsonSchema,
    clap::ValueEnum,
    strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConfigScope {
    /// `<repo>/.devsolo`, checked into nothing, per working copy.
    #[default]
    Project,
    /// `~/.devsolo`, shared across repositories.
    User,
}

/// Log verbosity. `None` disables logging entirely.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    schemars::JsonSchema,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    None,
}

impl LogLevel {
    /// The `env_logger` filter string for this level.
    pub fn filter(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::None => "off",
        }
    }
}

/// Hosted platform settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GitPlatformConfig {
    /// Platform kind; only `github` is currently spoken.
    pub platform_type: String,
    /// Auth token. Environment variables take over when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for GitPlatformConfig {
    fn default() -> Self {
        Self {
            platform_type: "github".to_string(),
            token: None,
        }
    }
}

/// User preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Preferences {
    pub log_level: LogLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    pub color_output: bool,
    /// Gap between CI poll iterations, seconds.
    pub ci_poll_interval_secs: u64,
    /// Total CI polling budget, seconds.
    pub ci_timeout_secs: u64,
    /// Audit file rotation threshold, bytes.
    pub audit_max_file_bytes: u64,
    /// Rotated audit files retained per day.
    pub audit_max_rotations: usize,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            log_file: None,
            color_output: true,
            ci_poll_interval_secs: 15,
            ci_timeout_secs: 20 * 60,
            audit_max_file_bytes: crate::audit::DEFAULT_MAX_FILE_BYTES,
            audit_max_rotations: crate::audit::DEFAULT_MAX_ROTATIONS,
        }
    }
}

/// Installable components. The server itself is non-disable-able.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Components {
    /// Mandatory-on: deserializing `false` is corrected back to `true`.
    #[serde(deserialize_with = "deserialize_mandatory_on")]
    pub mcp_server: bool,
    pub hooks: bool,
    pub status_line: bool,
    pub templates: bool,
}

impl Default for Components {
    fn default() -> Self {
        Self {
            mcp_server: true,
            hooks: true,
            status_line: false,
            templates: true,
        }
    }
}

fn deserialize_mandatory_on<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let requested = bool::deserialize(deserializer)?;
    if !requested {
        log::warn!("components.mcp-server cannot be disabled; forcing on");
    }
    Ok(true)
}

/// The workspace configuration value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct DevsoloConfig {
    pub initialized: bool,
    pub scope: ConfigScope,
    pub version: String,
    pub git_platform: GitPlatformConfig,
    pub preferences: Preferences,
    pub components: Components,
}

impl DevsoloConfig {
    /// The default value an `init` writes.
    pub fn initialized_default(scope: ConfigScope) -> Self {
        Self {
            initialized: true,
            scope,
            version: CONFIG_VERSION.to_string(),
            ..Self::default()
        }
    }
}

/// Initialization marker persisted at `<base>/devsolo.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Marker {
    pub version: String,
    pub created_at: DateTime<Utc>,
}

/// Resolve the workspace base directory.
///
/// `DEVSOLO_BASE_PATH` wins (tilde-expanded; relative paths resolve against
/// the repository root). Otherwise project scope uses `<repo>/.devsolo` and
/// user scope `~/.devsolo`.
pub fn resolve_base_path(repo_root: &Path, scope: ConfigScope) -> PathBuf {
    if let Ok(raw) = std::env::var(BASE_PATH_ENV)
        && !raw.is_empty()
    {
        let expanded = shellexpand::tilde(&raw).into_owned();
        let path = PathBuf::from(expanded);
        return if path.is_absolute() {
            path
        } else {
            repo_root.join(path)
        };
    }
    match scope {
        ConfigScope::Project => repo_root.join(DEFAULT_BASE_DIR),
        ConfigScope::User => dirs::home_dir()
            .unwrap_or_else(|| repo_root.to_path_buf())
            .join(DEFAULT_BASE_DIR),
    }
}

pub fn config_path(base: &Path) -> PathBuf {
    base.join("config.toml")
}

pub fn marker_path(base: &Path) -> PathBuf {
    base.join("devsolo.toml")
}

/// Load the stored configuration, or the default when none exists.
///
/// A corrupt file is an error: silently replacing a user's configuration
/// would lose their settings.
pub fn load(base: &Path) -> anyhow::Result<DevsoloConfig> {
    let path = config_path(base);
    match std::fs::read_to_string(&path) {
        Ok(content) => {
            let config = toml::from_str(&content)
                .map_err(|e| anyhow::anyhow!("invalid config at {}: {e}", path.display()))?;
            Ok(config)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(DevsoloConfig::default()),
        Err(e) => Err(anyhow::anyhow!("failed to read {}: {e}", path.display())),
    }
}

/// Atomically persist the configuration.
pub fn save(base: &Path, config: &DevsoloConfig) -> anyhow::Result<()> {
    std::fs::create_dir_all(base)?;
    let path = config_path(base);
    let _lock = acquire_file_lock(&path)?;

    let serialized = toml::to_string_pretty(config)?;
    let mut tmp = tempfile::Builder::new().prefix(".config-").tempfile_in(base)?;
    std::io::Write::write_all(&mut tmp, serialized.as_bytes())?;
    tmp.persist(&path)?;
    Ok(())
}

/// Write the initialization marker.
pub fn write_marker(base: &Path) -> anyhow::Result<Marker> {
    std::fs::create_dir_all(base)?;
    let marker = Marker {
        version: CONFIG_VERSION.to_string(),
        created_at: utils::now(),
    };
    let serialized = toml::to_string_pretty(&marker)?;
    let mut tmp = tempfile::Builder::new().prefix(".marker-").tempfile_in(base)?;
    std::io::Write::write_all(&mut tmp, serialized.as_bytes())?;
    tmp.persist(marker_path(base))?;
    Ok(marker)
}

/// Whether the workspace is initialized: marker present and config agrees.
pub fn is_initialized(base: &Path) -> bool {
    marker_path(base).exists()
        && load(base).map(|c| c.initialized).unwrap_or(false)
}

/// Exclusive cross-process lock on a sibling `.lock` file, released when
/// the returned handle drops.
fn acquire_file_lock(path: &Path) -> anyhow::Result<std::fs::File> {
    let lock_path = path.with_extension("toml.lock");
    let file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)?;
    file.lock_exclusive()?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = DevsoloConfig::default();
        assert!(!config.initialized);
        assert_eq!(config.scope, ConfigScope::Project);
        assert!(config.components.mcp_server);
        assert_eq!(config.preferences.ci_poll_interval_secs, 15);
        assert_eq!(config.preferences.ci_timeout_secs, 1200);
    }

    #[test]
    fn test_serialization_round_trip() {
        let mut config = DevsoloConfig::initialized_default(ConfigScope::Project);
        config.git_platform.token = Some("tok".into());
        config.preferences.log_level = LogLevel::Debug;

        let toml_text = toml::to_string_pretty(&config).unwrap();
        assert!(toml_text.contains("git-platform"));
        assert!(toml_text.contains("platform-type"));
        assert!(toml_text.contains("ci-poll-interval-secs"));

        let back: DevsoloConfig = toml::from_str(&toml_text).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_mcp_server_mandatory_on() {
        let toml_text = r#"
            [components]
            mcp-server = false
            hooks = false
        "#;
        let config: DevsoloConfig = toml::from_str(toml_text).unwrap();
        assert!(config.components.mcp_server, "mcp-server must be forced on");
        assert!(!config.components.hooks);
    }

    #[test]
    fn test_load_missing_returns_default() {
        let dir = TempDir::new().unwrap();
        let config = load(dir.path()).unwrap();
        assert_eq!(config, DevsoloConfig::default());
        assert!(!is_initialized(dir.path()));
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let config = DevsoloConfig::initialized_default(ConfigScope::User);
        save(dir.path(), &config).unwrap();
        assert_eq!(load(dir.path()).unwrap(), config);
    }

    #[test]
    fn test_corrupt_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(config_path(dir.path()), "{{nonsense").unwrap();
        assert!(load(dir.path()).is_err());
    }

    #[test]
    fn test_marker_and_initialized() {
        let dir = TempDir::new().unwrap();
        save(dir.path(), &DevsoloConfig::initialized_default(ConfigScope::Project)).unwrap();
        assert!(!is_initialized(dir.path()), "marker missing");

        let marker = write_marker(dir.path()).unwrap();
        assert_eq!(marker.version, CONFIG_VERSION);
        assert!(is_initialized(dir.path()));
    }

    #[test]
    fn test_resolve_base_path_project_scope() {
        let repo = Path::new("/tmp/repo");
        // The env override is exercised in integration tests; here the
        // default layout is enough.
        if std::env::var(BASE_PATH_ENV).is_err() {
            assert_eq!(
                resolve_base_path(repo, ConfigScope::Project),
                PathBuf::from("/tmp/repo/.devsolo")
            );
        }
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("NONE".parse::<LogLevel>().unwrap(), LogLevel::None);
        assert_eq!(LogLevel::None.filter(), "off");
    }
}
