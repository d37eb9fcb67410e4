//! Configuration management for bidharvest using the prefer crate.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::browser::{BrowserEngineConfig, PortalProfile};
use crate::extract::ColumnResolver;
use crate::harvest::default_workers;
use crate::models::RecordKeyScope;
use crate::repository::AsyncSqlitePool;

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "bidharvest.db";

/// Default session logs subdirectory name.
const LOGS_SUBDIR: &str = "logs";

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename.
    pub database_filename: String,
    /// Database URL (overrides data_dir/database_filename if set).
    pub database_url: Option<String>,
    /// Directory for session logs and summaries.
    pub logs_dir: PathBuf,
    /// Concurrent workers per session.
    pub workers: usize,
    /// How record ids are scoped.
    pub key_scope: RecordKeyScope,
    pub browser: BrowserEngineConfig,
    pub portal: PortalProfile,
}

impl Default for Settings {
    fn default() -> Self {
        // Default to ~/Documents/bidharvest/ for user data
        // Falls back gracefully: Documents dir -> Home dir -> Current dir
        let data_dir = dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bidharvest");

        Self {
            logs_dir: data_dir.join(LOGS_SUBDIR),
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            database_url: None,
            workers: default_workers(),
            key_scope: RecordKeyScope::default(),
            browser: BrowserEngineConfig::default(),
            portal: PortalProfile::default(),
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            logs_dir: data_dir.join(LOGS_SUBDIR),
            data_dir,
            ..Default::default()
        }
    }

    /// Get the database URL, constructing from path if not explicitly set.
    pub fn database_url(&self) -> String {
        if let Some(ref url) = self.database_url {
            url.clone()
        } else {
            format!("sqlite:{}", self.database_path().display())
        }
    }

    /// Get the full path to the database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    /// Check if the database appears to be initialized.
    pub fn database_exists(&self) -> bool {
        self.database_url.is_some() || self.database_path().exists()
    }

    /// Ensure all directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.logs_dir)?;
        Ok(())
    }

    pub fn pool(&self) -> AsyncSqlitePool {
        AsyncSqlitePool::new(&self.database_url())
    }

    /// Column resolver for the configured portal family.
    pub fn column_resolver(&self) -> ColumnResolver {
        ColumnResolver::new(self.portal.columns.clone())
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Database filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Session logs directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_scope: Option<RecordKeyScope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<BrowserEngineConfig>,
    /// Portal family profile (navigation, selectors, column strategy).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portal: Option<PortalProfile>,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Automatically discovers bidharvest config files in standard locations.
    pub async fn load() -> Self {
        // Use prefer for file discovery, then parse with serde
        match prefer::load("bidharvest").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => Self::load_from_path(path).await.unwrap_or_else(|e| {
                    tracing::warn!("{}", e);
                    Self::default()
                }),
                None => Self::default(),
            },
            // No config file found
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let mut config = Self::parse(&contents, path)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, String> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        match ext {
            "toml" => toml::from_str(contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e)),
            "yaml" | "yml" => serde_yaml::from_str(contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e)),
            _ => serde_json::from_str(contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e)),
        }
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved relative to `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
            settings.logs_dir = settings.data_dir.join(LOGS_SUBDIR);
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if let Some(ref logs_dir) = self.logs_dir {
            settings.logs_dir = self.resolve_path(logs_dir, base_dir);
        }
        if let Some(workers) = self.workers {
            settings.workers = workers.max(1);
        }
        if let Some(scope) = self.key_scope {
            settings.key_scope = scope;
        }
        if let Some(ref browser) = self.browser {
            settings.browser = browser.clone();
        }
        if let Some(ref portal) = self.portal {
            settings.portal = portal.clone();
        }
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Use CWD for relative paths instead of config file directory.
    pub use_cwd: bool,
    /// Data directory or database file (--data flag).
    pub data: Option<PathBuf>,
}

/// Look for a config file next to the database.
fn find_config_next_to_db(data_dir: &Path) -> Option<PathBuf> {
    let extensions = ["toml", "yaml", "yml", "json"];
    let basenames = ["bidharvest", "config"];

    for basename in basenames {
        for ext in extensions {
            let path = data_dir.join(format!("{}.{}", basename, ext));
            if path.exists() {
                return Some(path);
            }
        }
    }
    None
}

fn is_db_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == "db" || ext == "sqlite" || ext == "sqlite3")
        || path.is_file()
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    }
}

/// Apply environment overrides. `lookup` returns a variable's value.
fn apply_env_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    let var = |name: &str| lookup(name).filter(|s| !s.is_empty());

    // DATABASE_URL environment variable takes highest precedence
    if let Some(database_url) = var("DATABASE_URL") {
        tracing::debug!("Using DATABASE_URL from environment: {}", database_url);
        settings.database_url = Some(database_url);
    }
    if let Some(headless) = var("HEADLESS") {
        settings.browser.headless =
            !matches!(headless.to_lowercase().as_str(), "0" | "false" | "no" | "off");
    }
    if let Some(workers) = var("WORKERS") {
        match workers.parse::<usize>() {
            Ok(n) if n > 0 => settings.workers = n,
            _ => tracing::warn!("Ignoring invalid WORKERS value: {}", workers),
        }
    }
    if let Some(logs_dir) = var("BIDHARVEST_LOGS_DIR") {
        settings.logs_dir = PathBuf::from(shellexpand::tilde(&logs_dir).as_ref());
    }
}

/// Load config from file sources.
async fn load_file_config(options: &LoadOptions, data_dir_override: Option<&PathBuf>) -> Config {
    // Priority 1: Explicit --config flag
    if let Some(ref config_path) = options.config_path {
        return Config::load_from_path(config_path)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("{}", e);
                Config::default()
            });
    }

    // Priority 2: Config next to data dir
    if let Some(data_dir) = data_dir_override {
        if let Some(config_path) = find_config_next_to_db(data_dir) {
            tracing::debug!("Found config next to data dir: {}", config_path.display());
            return Config::load_from_path(&config_path)
                .await
                .unwrap_or_else(|_| Config::default());
        }
    }

    // Priority 3: Auto-discover via prefer
    Config::load().await
}

/// Load settings with explicit options.
/// Returns (Settings, Config) tuple.
pub async fn load_settings_with_options(options: LoadOptions) -> (Settings, Config) {
    let data = options.data.as_deref().map(absolute);
    let data_dir_override = data.as_ref().map(|path| {
        if is_db_file(path) {
            path.parent().unwrap_or(Path::new(".")).to_path_buf()
        } else {
            path.clone()
        }
    });

    let config = load_file_config(&options, data_dir_override.as_ref()).await;
    let mut settings = Settings::default();

    // Determine base directory for resolving relative paths
    let base_dir = if options.use_cwd {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    } else {
        config
            .base_dir()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    };

    config.apply_to_settings(&mut settings, &base_dir);

    // --data override takes precedence for data_dir and logs_dir
    if let (Some(path), Some(data_dir)) = (data, data_dir_override) {
        if is_db_file(&path) {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                settings.database_filename = name.to_string();
            }
        }
        settings.logs_dir = data_dir.join(LOGS_SUBDIR);
        settings.data_dir = data_dir;
    }

    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());

    (settings, config)
}
