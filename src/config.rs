use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub storage: StorageConfig,
  #[serde(default)]
  pub notes: NotesConfig,
  #[serde(default)]
  pub offline: OfflineConfig,
  #[serde(default)]
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
  /// Database file (defaults to $XDG_DATA_HOME/jotter/jotter.db)
  pub path: Option<PathBuf>,
}

/// What to do when the persisted note slot cannot be parsed.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CorruptPolicy {
  /// Refuse to start and leave the stored value untouched
  #[default]
  Fail,
  /// Back up the raw value next to the slot and start empty
  Reset,
}

/// How a failed persistence write is reported.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Durability {
  /// Log the failure and keep going
  #[default]
  BestEffort,
  /// Return the failure to the caller
  Strict,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotesConfig {
  /// Key of the persistent slot holding the serialized notes
  #[serde(default = "default_slot_key")]
  pub slot_key: String,
  #[serde(default)]
  pub durability: Durability,
  #[serde(default)]
  pub on_corrupt: CorruptPolicy,
}

impl Default for NotesConfig {
  fn default() -> Self {
    Self {
      slot_key: default_slot_key(),
      durability: Durability::default(),
      on_corrupt: CorruptPolicy::default(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OfflineConfig {
  /// Bucket name prefix; the version is appended as `-v<version>`
  #[serde(default = "default_cache_name")]
  pub cache_name: String,
  #[serde(default = "default_cache_version")]
  pub version: String,
  /// Base URL the controller is scoped to; manifest entries resolve against it
  #[serde(default = "default_scope")]
  pub scope: String,
  /// Static assets added to the bucket at install time
  #[serde(default = "default_manifest")]
  pub manifest: Vec<String>,
  /// Document served to navigation requests when the network is down
  #[serde(default = "default_fallback_document")]
  pub fallback_document: String,
  /// HTTP request timeout in seconds
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for OfflineConfig {
  fn default() -> Self {
    Self {
      cache_name: default_cache_name(),
      version: default_cache_version(),
      scope: default_scope(),
      manifest: default_manifest(),
      fallback_document: default_fallback_document(),
      timeout_secs: default_timeout_secs(),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
  /// Also write logs to a daily rolling file
  #[serde(default)]
  pub file: bool,
  /// Log directory (defaults to $XDG_DATA_HOME/jotter/logs)
  pub dir: Option<PathBuf>,
}

fn default_slot_key() -> String {
  "notes".to_string()
}

fn default_cache_name() -> String {
  "notes-app".to_string()
}

fn default_cache_version() -> String {
  "1".to_string()
}

fn default_scope() -> String {
  "http://localhost:8080/notes/".to_string()
}

fn default_manifest() -> Vec<String> {
  [
    "/",
    "/index.html",
    "/styles.css",
    "/app.js",
    "/manifest.json",
    "./icons/icon1.png",
    "./icons/icon2.png",
  ]
  .into_iter()
  .map(String::from)
  .collect()
}

fn default_fallback_document() -> String {
  "/".to_string()
}

fn default_timeout_secs() -> u64 {
  30
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./jotter.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/jotter/config.yaml
  ///
  /// Falls back to built-in defaults when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("jotter.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("jotter").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
    // An empty file means "all defaults"
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents)
  }

  /// Directory holding the database and logs.
  pub fn data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("jotter"))
  }

  /// Resolved database path.
  pub fn database_path(&self) -> Result<PathBuf> {
    match &self.storage.path {
      Some(p) => Ok(p.clone()),
      None => Ok(Self::data_dir()?.join("jotter.db")),
    }
  }

  /// Resolved log directory.
  pub fn log_dir(&self) -> Result<PathBuf> {
    match &self.logging.dir {
      Some(p) => Ok(p.clone()),
      None => Ok(Self::data_dir()?.join("logs")),
    }
  }
}
