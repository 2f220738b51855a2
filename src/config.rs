//! Configuration for a codetrace workspace.
//!
//! Settings are loaded in layers, each overriding the last:
//! - Built-in defaults
//! - `<project_root>/.codetrace/settings.toml`
//! - Environment variables prefixed `CODETRACE_`, with `__` separating
//!   nested keys (e.g. `CODETRACE_LOGGING__LEVEL=debug`)

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_DIR_NAME: &str = ".codetrace";
pub const CONFIG_FILE_NAME: &str = "settings.toml";
pub const INDEX_FILE_NAME: &str = "index.sqlite3";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Absolute path to the project root this session indexes. Populated at
    /// load time from the directory the config file was found in; not
    /// normally present in the TOML file itself.
    #[serde(default)]
    pub project_root: PathBuf,

    #[serde(default)]
    pub indexing: IndexingConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub ownership: OwnershipConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexingConfig {
    /// Extensions treated as TypeScript-family source, including the dot.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Additional gitignore-style patterns layered on top of `.gitignore`.
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,

    /// Number of rayon worker threads used for parallel parsing during a
    /// full reindex. 0 lets rayon choose automatically (one per core).
    #[serde(default)]
    pub parallel_threads: usize,

    /// Parsed-file LRU capacity held by the file processor.
    #[serde(default = "default_parse_cache_capacity")]
    pub parse_cache_capacity: usize,

    /// Whether a `Session::open` should start a filesystem watcher.
    #[serde(default = "default_true")]
    pub watch_mode: bool,

    /// Debounce window for coalescing watcher events, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

/// Parameters of the owner/reader leader-election protocol.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OwnershipConfig {
    /// How long an owner's heartbeat may go stale before a reader may
    /// claim ownership.
    #[serde(default = "default_staleness_threshold_ms")]
    pub staleness_threshold_ms: i64,

    /// How often a reader re-attempts `OwnershipArbiter::try_acquire`.
    #[serde(default = "default_healthcheck_interval_ms")]
    pub healthcheck_interval_ms: u64,

    /// Consecutive failed acquire attempts before a reader gives up and
    /// closes its session.
    #[serde(default = "default_max_healthcheck_retries")]
    pub max_healthcheck_retries: u32,

    /// How often the owner refreshes its heartbeat timestamp.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
}

fn default_staleness_threshold_ms() -> i64 {
    90_000
}

fn default_healthcheck_interval_ms() -> u64 {
    60_000
}

fn default_max_healthcheck_retries() -> u32 {
    10
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

impl Default for OwnershipConfig {
    fn default() -> Self {
        Self {
            staleness_threshold_ms: default_staleness_threshold_ms(),
            healthcheck_interval_ms: default_healthcheck_interval_ms(),
            max_healthcheck_retries: default_max_healthcheck_retries(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_false")]
    pub json: bool,
}

fn default_version() -> u32 {
    1
}

fn default_extensions() -> Vec<String> {
    vec![".ts".into(), ".tsx".into(), ".mts".into(), ".cts".into()]
}

fn default_ignore_patterns() -> Vec<String> {
    vec![
        "node_modules/**".into(),
        "dist/**".into(),
        "build/**".into(),
        "*.d.ts".into(),
    ]
}

fn default_parse_cache_capacity() -> usize {
    500
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_log_level() -> String {
    "info".into()
}

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            project_root: PathBuf::new(),
            indexing: IndexingConfig::default(),
            logging: LoggingConfig::default(),
            ownership: OwnershipConfig::default(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            ignore_patterns: default_ignore_patterns(),
            parallel_threads: 0,
            parse_cache_capacity: default_parse_cache_capacity(),
            watch_mode: true,
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Settings {
    /// Load settings for `project_root`, layering any `.codetrace/settings.toml`
    /// found there over the defaults, then environment variables over that.
    pub fn load(project_root: impl AsRef<Path>) -> Result<Self, figment::Error> {
        let project_root = project_root.as_ref();
        let config_path = Self::config_path(project_root);

        let mut settings: Settings = Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(&config_path))
            .merge(
                Env::prefixed("CODETRACE_").map(|key| key.as_str().to_lowercase().replace("__", ".").into()),
            )
            .extract()?;

        settings.project_root = project_root.to_path_buf();
        Ok(settings)
    }

    pub fn config_dir(project_root: impl AsRef<Path>) -> PathBuf {
        project_root.as_ref().join(CONFIG_DIR_NAME)
    }

    pub fn config_path(project_root: impl AsRef<Path>) -> PathBuf {
        Self::config_dir(project_root).join(CONFIG_FILE_NAME)
    }

    pub fn index_path(&self) -> PathBuf {
        Self::config_dir(&self.project_root).join(INDEX_FILE_NAME)
    }

    /// Whether `.codetrace/settings.toml` exists and parses for `project_root`.
    pub fn check_init(project_root: impl AsRef<Path>) -> Result<(), String> {
        let config_path = Self::config_path(project_root.as_ref());
        if !config_path.exists() {
            return Err(format!(
                "No {CONFIG_FILE_NAME} found under {}.\nRun `codetrace init` first.",
                Self::config_dir(project_root.as_ref()).display()
            ));
        }
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| format!("cannot read {}: {e}", config_path.display()))?;
        toml::from_str::<Settings>(&content)
            .map_err(|e| format!("configuration file is corrupted: {e}\nRun `codetrace init --force` to regenerate."))?;
        Ok(())
    }

    pub fn save(&self, project_root: impl AsRef<Path>) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = Self::config_path(project_root.as_ref());
        let parent = config_path.parent().ok_or("invalid config path")?;
        std::fs::create_dir_all(parent)?;
        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, toml_string)?;
        Ok(config_path)
    }

    /// Write a default settings file for `project_root`, refusing to
    /// overwrite an existing one unless `force` is set.
    pub fn init_config_file(
        project_root: impl AsRef<Path>,
        force: bool,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let project_root = project_root.as_ref();
        let config_path = Self::config_path(project_root);

        if !force && config_path.exists() {
            return Err("configuration file already exists; use --force to overwrite".into());
        }

        let mut settings = Settings::default();
        settings.project_root = project_root.to_path_buf();
        settings.save(project_root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_settings_have_typescript_extensions() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert!(settings.indexing.extensions.contains(&".ts".to_string()));
        assert!(settings.indexing.watch_mode);
        assert_eq!(settings.indexing.parse_cache_capacity, 500);
    }

    #[test]
    fn load_falls_back_to_defaults_with_no_config_file() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load(dir.path()).unwrap();
        assert_eq!(settings.project_root, dir.path());
        assert_eq!(settings.indexing.debounce_ms, 100);
    }

    #[test]
    fn init_then_load_round_trips_overrides() {
        let dir = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.indexing.parse_cache_capacity = 42;
        settings.logging.level = "debug".into();
        settings.save(dir.path()).unwrap();

        let loaded = Settings::load(dir.path()).unwrap();
        assert_eq!(loaded.indexing.parse_cache_capacity, 42);
        assert_eq!(loaded.logging.level, "debug");
    }

    #[test]
    fn init_config_file_refuses_overwrite_without_force() {
        let dir = TempDir::new().unwrap();
        Settings::init_config_file(dir.path(), false).unwrap();
        assert!(Settings::init_config_file(dir.path(), false).is_err());
        assert!(Settings::init_config_file(dir.path(), true).is_ok());
    }

    #[test]
    fn check_init_reports_missing_config() {
        let dir = TempDir::new().unwrap();
        assert!(Settings::check_init(dir.path()).is_err());
        Settings::init_config_file(dir.path(), false).unwrap();
        assert!(Settings::check_init(dir.path()).is_ok());
    }
}
