//! # PMOVideo Configuration Module
//!
//! This module provides configuration management for PMOVideo, including:
//! - Loading configuration from YAML files
//! - Merging with embedded default configuration
//! - Environment variable overrides
//! - Type-safe getters and setters for configuration values
//! - Thread-safe singleton access pattern
//!
//! ## Usage
//!
//! ```no_run
//! use pmoconfig::get_config;
//!
//! // Get the global configuration
//! let config = get_config();
//!
//! // Access configuration values
//! let port = config.get_http_port();
//! let data_dir = config.get_data_dir()?;
//! let directories = config.get_video_directories();
//!
//! // Update configuration values
//! config.set_http_port(9000)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{anyhow, Result};
use dirs::home_dir;
use lazy_static::lazy_static;
use serde_yaml::{Mapping, Number, Value};
use std::{
    env, fs,
    path::Path,
    sync::{Arc, Mutex},
};
use tracing::info;

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("pmovideo.yaml");

lazy_static! {
    static ref CONFIG: Arc<Config> =
        Arc::new(Config::load_config("").expect("Failed to load PMOVideo configuration"));
}

const ENV_CONFIG_DIR: &str = "PMOVIDEO_CONFIG";
const ENV_PREFIX: &str = "PMOVIDEO_CONFIG__";

// Default values for configuration
const DEFAULT_HTTP_PORT: u16 = 8080;
const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";
const DEFAULT_LOG_ENABLE_CONSOLE: bool = true;
const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_VIDEO_DIR: &str = "videos";
const DEFAULT_VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "ogg", "ogv", "mov", "mkv", "m4v"];
const DEFAULT_MAX_CATALOG_ITEMS: usize = 10_000;
const DEFAULT_CATALOG_PAGE_SIZE: usize = 50;
const DEFAULT_CONSISTENCY: &str = "last_writer_wins";
const DEFAULT_SIGNAL_WINDOW_SECS: u64 = 10;
const DEFAULT_STATE_POLL_MS: u64 = 3000;
const DEFAULT_SIGNAL_POLL_MS: u64 = 400;
const DEFAULT_MAX_FAILURES: usize = 5;
const DEFAULT_COOLDOWN_SECS: u64 = 30;
const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;

/// Macro to generate getter/setter for usize values with default
macro_rules! impl_usize_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<usize> {
            match self.get_value($path) {
                Ok(Value::Number(n)) if n.is_u64() => Ok(n.as_u64().unwrap_or_default() as usize),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, size: usize) -> Result<()> {
            let n = Number::from(size);
            self.set_value($path, Value::Number(n))
        }
    };
}

/// Macro to generate getter/setter for u64 values with default
macro_rules! impl_u64_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<u64> {
            match self.get_value($path) {
                Ok(Value::Number(n)) if n.is_u64() => Ok(n.as_u64().unwrap_or($default)),
                Ok(Value::String(s)) => Ok(s.trim().parse::<u64>().unwrap_or($default)),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, value: u64) -> Result<()> {
            self.set_value($path, Value::Number(Number::from(value)))
        }
    };
}

/// Macro to generate getter/setter for bool values with default
macro_rules! impl_bool_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<bool> {
            match self.get_value($path) {
                Ok(Value::Bool(b)) => Ok(b),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, value: bool) -> Result<()> {
            self.set_value($path, Value::Bool(value))
        }
    };
}

/// Configuration manager for PMOVideo
///
/// This structure manages the application configuration, including:
/// - Loading configuration from YAML files
/// - Merging with default configuration
/// - Handling environment variable overrides
/// - Providing typed getters/setters for configuration values
///
/// # Examples
///
/// ```no_run
/// use pmoconfig::get_config;
///
/// let config = get_config();
/// let port = config.get_http_port();
/// println!("HTTP port: {}", port);
/// ```
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: String,
    data: Mutex<Value>,
}

// Implémentation manuelle de Clone
impl Clone for Config {
    fn clone(&self) -> Self {
        let data = self.lock_data().clone();
        Self {
            config_dir: self.config_dir.clone(),
            path: self.path.clone(),
            data: Mutex::new(data),
        }
    }
}

impl Config {
    fn lock_data(&self) -> std::sync::MutexGuard<'_, Value> {
        // Un panic pendant une écriture ne rend pas l'arbre YAML invalide
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Finds a config directory by trying different locations in order
    fn find_config_dir(directory: &str) -> String {
        // 1. Try provided directory
        if !directory.is_empty() {
            return directory.to_string();
        }

        // 2. Try environment variable
        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var=ENV_CONFIG_DIR, path=%env_path, "Trying to load config from env");
            return env_path;
        }

        // 3. Try current directory
        if Path::new(".pmovideo").exists() {
            return ".pmovideo".to_string();
        }

        // 4. Try home directory
        if let Some(home) = home_dir() {
            let home_config = home.join(".pmovideo");
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }

        // Default fallback
        ".pmovideo".to_string()
    }

    /// Validates and prepares a config directory
    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(anyhow!(
                "Config path {} is not a directory",
                path.display()
            ));
        }

        // Test write permission
        let test_file = path.join(".write_test");
        fs::write(&test_file, b"test")?;
        fs::remove_file(&test_file)?;

        fs::read_dir(path)?;

        Ok(())
    }

    /// Determines and validates the configuration directory
    ///
    /// The directory is searched in the following order:
    /// 1. The provided `directory` parameter if not empty
    /// 2. The `PMOVIDEO_CONFIG` environment variable
    /// 3. `.pmovideo` in the current directory
    /// 4. `.pmovideo` in the user's home directory
    ///
    /// The directory is created if it doesn't exist, and validated for read/write permissions.
    pub fn config_dir(directory: &str) -> Result<String> {
        let dir_path = Self::find_config_dir(directory);
        Self::validate_config_dir(Path::new(&dir_path))?;
        Ok(dir_path)
    }

    /// Loads the configuration from the specified directory
    ///
    /// This method:
    /// 1. Determines the configuration directory
    /// 2. Loads the default embedded configuration
    /// 3. Merges it with the external config.yaml file if present
    /// 4. Applies environment variable overrides
    /// 5. Saves the merged configuration
    ///
    /// # Arguments
    ///
    /// * `directory` - The directory containing the config.yaml file, or empty to use defaults
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::config_dir(directory)?;
        info!(config_dir=%config_dir, "Using config directory");

        let config_file_path = Path::new(&config_dir).join("config.yaml");
        let path = config_file_path.to_string_lossy().to_string();

        let mut default_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        let yaml_data = if let Ok(data) = fs::read(&path) {
            info!(config_file=%path, "Loaded config file");
            data
        } else {
            info!(config_file=%path, "Config file not found, using default embedded config");
            DEFAULT_CONFIG.as_bytes().to_vec()
        };

        // Un fichier vide se désérialise en Null : on garde alors les défauts
        let external_value: Value = serde_yaml::from_slice(&yaml_data)?;
        merge_yaml(&mut default_value, &external_value);
        let mut config_value = Self::lower_keys_value(default_value);

        Self::apply_env_overrides(&mut config_value);

        let config = Config {
            config_dir,
            path,
            data: Mutex::new(config_value),
        };

        config.save()?;
        Ok(config)
    }

    /// Directory holding `config.yaml`
    pub fn directory(&self) -> &str {
        &self.config_dir
    }

    /// Saves the current configuration to the config.yaml file
    pub fn save(&self) -> Result<()> {
        let data = self.lock_data();
        let yaml = serde_yaml::to_string(&*data)?;
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    /// Sets a configuration value at the specified path and saves it
    ///
    /// # Arguments
    ///
    /// * `path` - Array of keys representing the path (e.g., `&["host", "http_port"]`)
    /// * `value` - The YAML value to set
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        let mut data = self.lock_data();
        Self::set_value_internal(&mut data, path, value)?;
        drop(data);
        self.save()?;
        Ok(())
    }

    fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
        if path.is_empty() {
            *data = value;
            return Ok(());
        }
        if let Value::Mapping(map) = data {
            let key = path[0].to_lowercase();
            let key_value = Value::String(key);
            if path.len() == 1 {
                map.insert(key_value, value);
            } else {
                let entry = map
                    .entry(key_value)
                    .or_insert(Value::Mapping(Mapping::new()));
                Self::set_value_internal(entry, &path[1..], value)?;
            }
            Ok(())
        } else {
            Err(anyhow!("Current node is not a map"))
        }
    }

    /// Gets a configuration value at the specified path
    ///
    /// Returns an error if the path doesn't exist.
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.lock_data();
        Self::get_value_internal(&data, path)
    }

    fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
        let mut current = data;
        for (i, key) in path.iter().enumerate() {
            if let Value::Mapping(map) = current {
                let key = key.to_lowercase();

                if let Some(next) = map.get(&Value::String(key)) {
                    current = next;
                } else {
                    return Err(anyhow!("Path {} does not exist", path[..=i].join(".")));
                }
            } else {
                return Err(anyhow!("Path {} is not a Config", path[..i].join(".")));
            }
        }
        Ok(current.clone())
    }

    fn apply_env_overrides(config: &mut Value) {
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                let key_path = stripped.split("__").collect::<Vec<_>>();
                let yaml_value = Self::convert_env_value(&value);
                if let Err(err) = Self::set_value_internal(config, &key_path, yaml_value) {
                    tracing::warn!(env_var=%key, "Ignoring config override: {}", err);
                }
            }
        }
    }

    fn convert_env_value(value: &str) -> Value {
        if let Ok(parsed) = serde_yaml::from_str::<Value>(value) {
            return parsed;
        }
        Value::String(value.to_string())
    }

    fn lower_keys_value(value: Value) -> Value {
        match value {
            Value::Mapping(map) => {
                let mut new_map = Mapping::new();
                for (k, v) in map {
                    if let Value::String(s) = k {
                        new_map.insert(Value::String(s.to_lowercase()), Self::lower_keys_value(v));
                    } else {
                        new_map.insert(k, Self::lower_keys_value(v));
                    }
                }
                Value::Mapping(new_map)
            }
            Value::Sequence(seq) => {
                Value::Sequence(seq.into_iter().map(Self::lower_keys_value).collect())
            }
            _ => value,
        }
    }

    /// Résout un chemin relatif par rapport au répertoire de configuration
    pub fn resolve_path(&self, dir_path: &str) -> String {
        let path = Path::new(dir_path);
        if path.is_absolute() {
            path.to_string_lossy().to_string()
        } else {
            Path::new(&self.config_dir)
                .join(path)
                .to_string_lossy()
                .to_string()
        }
    }

    /// Résout un chemin relatif ou absolu et crée le répertoire si nécessaire
    fn resolve_and_create_dir(&self, dir_path: &str) -> Result<String> {
        let absolute_path = self.resolve_path(dir_path);

        if !Path::new(&absolute_path).exists() {
            fs::create_dir_all(&absolute_path)?;
            info!(directory=%absolute_path, "Created managed directory");
        }

        Ok(absolute_path)
    }

    /// Récupère un répertoire géré par la configuration
    ///
    /// Le répertoire peut être absolu ou relatif au répertoire de
    /// configuration. Il sera créé s'il n'existe pas.
    ///
    /// # Exemple
    ///
    /// ```no_run
    /// use pmoconfig::get_config;
    ///
    /// let config = get_config();
    /// let data_dir = config.get_managed_dir(&["host", "data", "directory"], "data")?;
    /// println!("Data directory: {}", data_dir);
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn get_managed_dir(&self, path: &[&str], default: &str) -> Result<String> {
        let dir_path = match self.get_value(path) {
            Ok(Value::String(s)) if !s.trim().is_empty() => s,
            _ => {
                self.set_managed_dir(path, default.to_string())?;
                default.to_string()
            }
        };
        self.resolve_and_create_dir(&dir_path)
    }

    /// Définit un répertoire géré par la configuration
    pub fn set_managed_dir(&self, path: &[&str], directory: String) -> Result<()> {
        self.set_value(path, Value::String(directory))
    }

    /// Gets the HTTP port from configuration
    ///
    /// Returns the configured HTTP port, or the default port (8080) if not configured or invalid.
    pub fn get_http_port(&self) -> u16 {
        match self.get_value(&["host", "http_port"]) {
            Ok(Value::Number(n)) if n.is_u64() => match u16::try_from(n.as_u64().unwrap_or(0)) {
                Ok(port) if port > 0 => port,
                _ => {
                    tracing::warn!(
                        "HTTP port {} out of range, using default {}",
                        n,
                        DEFAULT_HTTP_PORT
                    );
                    DEFAULT_HTTP_PORT
                }
            },
            Ok(Value::String(s)) => match s.parse::<u16>() {
                Ok(port) => port,
                Err(_) => {
                    tracing::warn!(
                        "Invalid HTTP port '{}', using default {}",
                        s,
                        DEFAULT_HTTP_PORT
                    );
                    DEFAULT_HTTP_PORT
                }
            },
            Ok(_) => {
                tracing::warn!(
                    "HTTP port not a number or string, using default {}",
                    DEFAULT_HTTP_PORT
                );
                DEFAULT_HTTP_PORT
            }
            Err(err) => {
                tracing::warn!(
                    "Failed to get HTTP port: {}, using default {}",
                    err,
                    DEFAULT_HTTP_PORT
                );
                DEFAULT_HTTP_PORT
            }
        }
    }

    /// Sets the HTTP port in configuration
    pub fn set_http_port(&self, port: u16) -> Result<()> {
        let n = Number::from(port);
        self.set_value(&["host", "http_port"], Value::Number(n))
    }

    /// Répertoire de données (état des profils, cache du catalogue)
    pub fn get_data_dir(&self) -> Result<String> {
        self.get_managed_dir(&["host", "data", "directory"], DEFAULT_DATA_DIR)
    }

    /// Gets the configured video directories, in index order
    ///
    /// Relative entries are resolved against the configuration directory.
    /// Non-string entries are skipped.
    pub fn get_video_directories(&self) -> Vec<String> {
        match self.get_value(&["videos", "directories"]) {
            Ok(Value::Sequence(seq)) => seq
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) if !s.trim().is_empty() => Some(self.resolve_path(s.trim())),
                    _ => None,
                })
                .collect(),
            Ok(Value::String(s)) if !s.trim().is_empty() => vec![self.resolve_path(s.trim())],
            _ => Vec::new(),
        }
    }

    /// Replaces the configured video directories
    pub fn set_video_directories(&self, directories: Vec<String>) -> Result<()> {
        let seq = directories.into_iter().map(Value::String).collect();
        self.set_value(&["videos", "directories"], Value::Sequence(seq))
    }

    /// Fallback directory used when none of the configured directories resolve
    pub fn get_default_video_directory(&self) -> String {
        match self.get_value(&["videos", "default_directory"]) {
            Ok(Value::String(s)) if !s.trim().is_empty() => self.resolve_path(s.trim()),
            _ => self.resolve_path(DEFAULT_VIDEO_DIR),
        }
    }

    /// Allowed video file extensions, lower-cased and without the leading dot
    pub fn get_video_extensions(&self) -> Vec<String> {
        let configured: Vec<String> = match self.get_value(&["videos", "extensions"]) {
            Ok(Value::Sequence(seq)) => seq
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().trim_start_matches('.').to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            _ => Vec::new(),
        };

        if configured.is_empty() {
            DEFAULT_VIDEO_EXTENSIONS.iter().map(|s| s.to_string()).collect()
        } else {
            configured
        }
    }

    impl_usize_config!(
        get_max_catalog_items,
        set_max_catalog_items,
        &["videos", "max_items"],
        DEFAULT_MAX_CATALOG_ITEMS
    );

    impl_usize_config!(
        get_catalog_page_size,
        set_catalog_page_size,
        &["catalog", "page_size"],
        DEFAULT_CATALOG_PAGE_SIZE
    );

    impl_usize_config!(
        get_sync_max_failures,
        set_sync_max_failures,
        &["sync", "max_failures"],
        DEFAULT_MAX_FAILURES
    );

    impl_u64_config!(
        get_signal_window_secs,
        set_signal_window_secs,
        &["sync", "signal_window_secs"],
        DEFAULT_SIGNAL_WINDOW_SECS
    );

    impl_u64_config!(
        get_state_poll_ms,
        set_state_poll_ms,
        &["sync", "state_poll_ms"],
        DEFAULT_STATE_POLL_MS
    );

    impl_u64_config!(
        get_signal_poll_ms,
        set_signal_poll_ms,
        &["sync", "signal_poll_ms"],
        DEFAULT_SIGNAL_POLL_MS
    );

    impl_u64_config!(
        get_sync_cooldown_secs,
        set_sync_cooldown_secs,
        &["sync", "cooldown_secs"],
        DEFAULT_COOLDOWN_SECS
    );

    impl_u64_config!(
        get_sync_backoff_max_ms,
        set_sync_backoff_max_ms,
        &["sync", "backoff_max_ms"],
        DEFAULT_BACKOFF_MAX_MS
    );

    /// Mode de cohérence du stockage des profils (`last_writer_wins` ou `compare_and_swap`)
    pub fn get_sync_consistency(&self) -> String {
        match self.get_value(&["sync", "consistency"]) {
            Ok(Value::String(s)) if !s.trim().is_empty() => s.trim().to_lowercase(),
            _ => DEFAULT_CONSISTENCY.to_string(),
        }
    }

    /// Définit le mode de cohérence du stockage des profils
    pub fn set_sync_consistency(&self, mode: String) -> Result<()> {
        self.set_value(&["sync", "consistency"], Value::String(mode))
    }

    impl_bool_config!(
        get_log_enable_console,
        set_log_enable_console,
        &["host", "logger", "enable_console"],
        DEFAULT_LOG_ENABLE_CONSOLE
    );

    /// Récupère le niveau de log minimum depuis la configuration
    pub fn get_log_min_level(&self) -> Result<String> {
        match self.get_value(&["host", "logger", "min_level"]) {
            Ok(Value::String(s)) => Ok(s),
            _ => Ok(DEFAULT_LOG_MIN_LEVEL.to_string()),
        }
    }

    /// Définit le niveau de log minimum dans la configuration
    pub fn set_log_min_level(&self, level: String) -> Result<()> {
        self.set_value(&["host", "logger", "min_level"], Value::String(level))
    }
}

/// Returns the global configuration instance
///
/// This function provides access to the singleton configuration instance,
/// which is lazily loaded on first access.
///
/// # Examples
///
/// ```no_run
/// use pmoconfig::get_config;
///
/// let config = get_config();
/// let port = config.get_http_port();
/// ```
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
}

/// Merges external YAML configuration into default configuration
///
/// - For mappings (objects), it merges keys from external into default
/// - For scalars and sequences, external values replace default values
/// - A null external document leaves the defaults untouched
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (_, Value::Null) => {}
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(), // pour les scalaires ou séquences, on remplace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_in(dir: &tempfile::TempDir) -> Config {
        Config::load_config(dir.path().to_str().unwrap()).unwrap()
    }

    #[test]
    fn test_merge_yaml_replaces_scalars_and_keeps_defaults() {
        let mut default: Value =
            serde_yaml::from_str("host:\n  http_port: 8080\n  name: a\nlist: [1, 2]").unwrap();
        let external: Value = serde_yaml::from_str("host:\n  http_port: 9000\nlist: [3]").unwrap();

        merge_yaml(&mut default, &external);

        assert_eq!(
            Config::get_value_internal(&default, &["host", "http_port"]).unwrap(),
            Value::Number(Number::from(9000))
        );
        assert_eq!(
            Config::get_value_internal(&default, &["host", "name"]).unwrap(),
            Value::String("a".into())
        );
        assert_eq!(
            Config::get_value_internal(&default, &["list"]).unwrap(),
            serde_yaml::from_str::<Value>("[3]").unwrap()
        );
    }

    #[test]
    fn test_defaults_from_embedded_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_in(&dir);

        assert_eq!(config.get_http_port(), DEFAULT_HTTP_PORT);
        assert!(config.get_video_directories().is_empty());
        assert_eq!(config.get_max_catalog_items().unwrap(), 10_000);
        assert_eq!(config.get_sync_consistency(), "last_writer_wins");
        assert_eq!(config.get_signal_window_secs().unwrap(), 10);
        assert!(config.get_video_extensions().contains(&"mp4".to_string()));
        assert!(dir.path().join("config.yaml").exists());
    }

    #[test]
    fn test_user_file_is_merged_and_relative_dirs_resolved() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("config.yaml"),
            "videos:\n  directories: [movies, /srv/clips]\n  extensions: ['.MP4']\n",
        )
        .unwrap();

        let config = load_in(&dir);
        let dirs = config.get_video_directories();

        assert_eq!(dirs.len(), 2);
        assert_eq!(
            dirs[0],
            dir.path().join("movies").to_string_lossy().to_string()
        );
        assert_eq!(dirs[1], "/srv/clips");
        assert_eq!(config.get_video_extensions(), vec!["mp4".to_string()]);
        // les clés par défaut non surchargées sont conservées
        assert_eq!(config.get_catalog_page_size().unwrap(), 50);
    }

    #[test]
    fn test_setters_persist_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_in(&dir);

        config.set_http_port(9100).unwrap();
        config
            .set_video_directories(vec!["/a".into(), "/b".into()])
            .unwrap();

        let reloaded = load_in(&dir);
        assert_eq!(reloaded.get_http_port(), 9100);
        assert_eq!(reloaded.get_video_directories(), vec!["/a", "/b"]);
    }

    #[test]
    fn test_managed_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_in(&dir);

        let data_dir = config.get_data_dir().unwrap();
        assert!(Path::new(&data_dir).is_dir());
        assert!(data_dir.starts_with(dir.path().to_str().unwrap()));
    }
}
