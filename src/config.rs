//! Configuration management for the form-factor service.
//!
//! The configuration file is optional; when it does not exist every field
//! takes its default value.

use std::{env, fs, path::PathBuf, time::Duration};

use serde::Deserialize;

use crate::error::{FormFactorError, Result};

/// Main configuration structure for the service.
#[derive(Deserialize, Clone, Debug)]
pub struct Config {
   /// Adapters (by name, e.g. `hci1`) that are never probed.
   #[serde(default)]
   pub ignored_adapters: Vec<String>,

   #[serde(default = "default_adapter_check_interval")]
   pub adapter_check_interval: u64,

   /// Upper bound on the wait for the HAL reply. Unset means wait forever.
   #[serde(default)]
   pub reply_timeout_sec: Option<u64>,
}

const fn default_adapter_check_interval() -> u64 {
   10
}

impl Default for Config {
   fn default() -> Self {
      Self {
         ignored_adapters: vec![],
         adapter_check_interval: default_adapter_check_interval(),
         reply_timeout_sec: None,
      }
   }
}

impl Config {
   /// Loads configuration from disk, falling back to defaults if absent.
   pub fn load() -> Result<Self> {
      let config_path = Self::config_path()?;

      if config_path.exists() {
         let contents = fs::read_to_string(&config_path)?;
         Ok(toml::from_str(&contents)?)
      } else {
         Ok(Self::default())
      }
   }

   fn config_path() -> Result<PathBuf> {
      let config_dir = if let Ok(home) = env::var("BTFORMFACTOR_HOME") {
         PathBuf::from(home)
      } else if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
         PathBuf::from(config_home)
      } else if let Some(dir) = dirs::config_dir() {
         dir
      } else {
         return Err(FormFactorError::ConfigDirNotFound);
      };

      Ok(config_dir.join("btformfactord").join("config.toml"))
   }

   pub fn is_ignored(&self, adapter: &str) -> bool {
      self.ignored_adapters.iter().any(|name| name == adapter)
   }

   pub fn adapter_check_interval(&self) -> Duration {
      Duration::from_secs(self.adapter_check_interval.max(1))
   }

   pub fn reply_timeout(&self) -> Option<Duration> {
      self.reply_timeout_sec.map(Duration::from_secs)
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   use tempfile::TempDir;

   #[test]
   fn test_empty_config_uses_defaults() {
      let config: Config = toml::from_str("").unwrap();
      assert!(config.ignored_adapters.is_empty());
      assert_eq!(config.adapter_check_interval(), Duration::from_secs(10));
      assert_eq!(config.reply_timeout(), None);
   }

   #[test]
   fn test_parse_full_config() {
      let config: Config = toml::from_str(
         r#"
         ignored_adapters = ["hci1"]
         adapter_check_interval = 3
         reply_timeout_sec = 25
         "#,
      )
      .unwrap();
      assert!(config.is_ignored("hci1"));
      assert!(!config.is_ignored("hci0"));
      assert_eq!(config.adapter_check_interval(), Duration::from_secs(3));
      assert_eq!(config.reply_timeout(), Some(Duration::from_secs(25)));
   }

   #[test]
   fn test_zero_interval_is_clamped() {
      let config: Config = toml::from_str("adapter_check_interval = 0").unwrap();
      assert_eq!(config.adapter_check_interval(), Duration::from_secs(1));
   }

   #[test]
   fn test_load_from_home_override() -> Result<()> {
      let temp_dir = TempDir::new().unwrap();
      unsafe {
         env::set_var("BTFORMFACTOR_HOME", temp_dir.path());
      }

      // No file yet: defaults, and nothing gets written.
      let config = Config::load()?;
      assert!(config.ignored_adapters.is_empty());
      assert!(!temp_dir.path().join("btformfactord").exists());

      let dir = temp_dir.path().join("btformfactord");
      fs::create_dir_all(&dir)?;
      fs::write(dir.join("config.toml"), "ignored_adapters = [\"hci2\"]\n")?;
      let config = Config::load()?;
      assert!(config.is_ignored("hci2"));

      fs::write(dir.join("config.toml"), "adapter_check_interval = \"soon\"\n")?;
      assert!(matches!(Config::load(), Err(FormFactorError::TomlParse(_))));
      Ok(())
   }
}
