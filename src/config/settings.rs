use crate::error::{LedgerError, Result};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

pub static GLOBAL_CONFIG: Lazy<Config> = Lazy::new(Config::new);

static DEFAULT_DATA_DIR: &str = "data";

pub const DATA_DIR_KEY: &str = "LEDGER_DATA_DIR";

/// Process-wide settings, seeded from the environment and adjustable at runtime.
pub struct Config {
    inner: RwLock<HashMap<String, String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Config {
        let mut map = HashMap::new();
        let data_dir = env::var(DATA_DIR_KEY).unwrap_or_else(|_| String::from(DEFAULT_DATA_DIR));
        map.insert(String::from(DATA_DIR_KEY), data_dir);

        Config {
            inner: RwLock::new(map),
        }
    }

    /// Directory of the sled database. Relative paths resolve against the working
    /// directory.
    pub fn get_data_dir(&self) -> Result<PathBuf> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let dir = inner
            .get(DATA_DIR_KEY)
            .filter(|dir| !dir.trim().is_empty())
            .ok_or_else(|| LedgerError::Config(format!("{DATA_DIR_KEY} is not set")))?;

        let path = PathBuf::from(dir);
        if path.is_absolute() {
            return Ok(path);
        }
        Ok(env::current_dir()?.join(path))
    }

    pub fn set_data_dir(&self, dir: String) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.insert(String::from(DATA_DIR_KEY), dir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_dir_resolves_against_cwd() {
        let config = Config::new();
        config.set_data_dir("ledger-data".to_string());
        let dir = config.get_data_dir().unwrap();
        assert!(dir.is_absolute());
        assert!(dir.ends_with("ledger-data"));
    }

    #[test]
    fn test_absolute_dir_is_kept() {
        let config = Config::new();
        let tmp = std::env::temp_dir().join("ledger");
        config.set_data_dir(tmp.to_string_lossy().to_string());
        assert_eq!(config.get_data_dir().unwrap(), tmp);
    }

    #[test]
    fn test_blank_dir_is_config_error() {
        let config = Config::new();
        config.set_data_dir("  ".to_string());
        assert!(matches!(
            config.get_data_dir(),
            Err(LedgerError::Config(_))
        ));
    }
}
