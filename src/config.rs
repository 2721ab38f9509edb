//! Configuration for discovery and connection sessions.
//!
//! Every field has a default, so an empty file (or no file at all) yields
//! the stock polling, reporting and capture behaviour.

use std::{
   env, fs,
   path::{Path, PathBuf},
   time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
   connection::classify::DataMode,
   error::{LinkError, Result},
};

/// Main configuration structure.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Config {
   /// Packet-mode readiness poll slice.
   #[serde(default = "default_poll_interval_ms")]
   pub poll_interval_ms: u64,

   /// Minimum spacing between throughput reports.
   #[serde(default = "default_stats_interval_sec")]
   pub stats_interval_sec: u64,

   /// Character-mode buffer is flushed once its length exceeds this.
   #[serde(default = "default_text_flush_len")]
   pub text_flush_len: usize,

   #[serde(default)]
   pub data_mode: DataMode,

   #[serde(default)]
   pub capture_dir: Option<PathBuf>,

   #[serde(default = "default_max_service_searches")]
   pub max_service_searches: usize,

   #[serde(default = "default_max_connected_devices")]
   pub max_connected_devices: u32,
}

const fn default_poll_interval_ms() -> u64 {
   100
}

const fn default_stats_interval_sec() -> u64 {
   5
}

const fn default_text_flush_len() -> usize {
   32
}

const fn default_max_service_searches() -> usize {
   1
}

const fn default_max_connected_devices() -> u32 {
   7
}

impl Default for Config {
   fn default() -> Self {
      Self {
         poll_interval_ms: default_poll_interval_ms(),
         stats_interval_sec: default_stats_interval_sec(),
         text_flush_len: default_text_flush_len(),
         data_mode: DataMode::default(),
         capture_dir: None,
         max_service_searches: default_max_service_searches(),
         max_connected_devices: default_max_connected_devices(),
      }
   }
}

impl Config {
   /// Loads configuration from the default location, creating it if missing.
   pub fn load() -> Result<Self> {
      Self::load_from(&Self::config_path()?)
   }

   /// Loads configuration from `path`, writing the defaults there if the
   /// file does not exist yet.
   pub fn load_from(path: &Path) -> Result<Self> {
      if path.exists() {
         let contents = fs::read_to_string(path)?;
         Self::from_toml(&contents)
      } else {
         let config = Self::default();
         config.save_to(path)?;
         Ok(config)
      }
   }

   pub fn from_toml(contents: &str) -> Result<Self> {
      Ok(toml::from_str(contents)?)
   }

   /// Saves the configuration to `path`.
   pub fn save_to(&self, path: &Path) -> Result<()> {
      if let Some(parent) = path.parent() {
         fs::create_dir_all(parent)?;
      }

      let contents = toml::to_string_pretty(self)?;
      fs::write(path, contents)?;

      Ok(())
   }

   fn config_path() -> Result<PathBuf> {
      if let Ok(btlink_home) = env::var("BTLINK_HOME") {
         return Ok(PathBuf::from(btlink_home).join("config.toml"));
      }

      let config_dir = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
         PathBuf::from(config_home)
      } else if let Ok(home) = env::var("HOME") {
         PathBuf::from(home).join(".config")
      } else {
         return Err(LinkError::ConfigDirNotFound);
      };

      Ok(config_dir.join("btlink").join("config.toml"))
   }

   pub const fn poll_interval(&self) -> Duration {
      Duration::from_millis(self.poll_interval_ms)
   }

   pub const fn stats_interval(&self) -> Duration {
      Duration::from_secs(self.stats_interval_sec)
   }

   /// Directory new capture files are created in.
   pub fn capture_dir(&self) -> PathBuf {
      if let Some(dir) = &self.capture_dir {
         return dir.clone();
      }
      dirs::data_local_dir()
         .map(|dir| dir.join("btlink").join("captures"))
         .unwrap_or_else(|| PathBuf::from("."))
   }
}
