use crate::auth::Credentials;
use crate::types::{Site, SiteParseError};

use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = ".moneywellspentrc";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    InvalidSite(#[from] SiteParseError),
    #[error("Start year ({start}) cannot be after the current year ({current})")]
    StartYearInFuture { start: i32, current: i32 },
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
    #[error("Failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse configuration file {path}: {source}")]
    Yaml {
        path: PathBuf,
        source: serde_yml::Error,
    },
}

/// Fully resolved settings for one run.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    pub site: Site,
    pub login: String,
    pub password: String,
    pub start_year: i32,
}

impl Config {
    pub fn credentials(&self) -> Credentials<'_> {
        Credentials {
            email: &self.login,
            password: &self.password,
        }
    }

    pub fn validate(&self, current_year: i32) -> Result<(), ConfigError> {
        if self.start_year > current_year {
            return Err(ConfigError::StartYearInFuture {
                start: self.start_year,
                current: current_year,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("site", &self.site)
            .field("login", &self.login)
            .field("password", &"********")
            .field("start_year", &self.start_year)
            .finish()
    }
}

/// Settings that may still have gaps, as collected from flags, the config
/// file or prompts. Keys written as Ruby symbols (`:site:`) are accepted.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct PartialConfig {
    #[serde(default, alias = ":site")]
    pub site: Option<String>,
    #[serde(default, alias = ":login")]
    pub login: Option<String>,
    #[serde(default, alias = ":password")]
    pub password: Option<String>,
    #[serde(default, alias = ":year")]
    pub year: Option<i32>,
}

impl PartialConfig {
    /// Fills every unset field from `fallback`.
    pub fn or(self, fallback: PartialConfig) -> PartialConfig {
        PartialConfig {
            site: self.site.or(fallback.site),
            login: self.login.or(fallback.login),
            password: self.password.or(fallback.password),
            year: self.year.or(fallback.year),
        }
    }

    pub fn resolve(self) -> Result<Config, ConfigError> {
        let site = self
            .site
            .ok_or(ConfigError::Missing("site"))?
            .parse::<Site>()?;
        Ok(Config {
            site,
            login: self.login.ok_or(ConfigError::Missing("login"))?,
            password: self.password.ok_or(ConfigError::Missing("password"))?,
            start_year: self.year.ok_or(ConfigError::Missing("year"))?,
        })
    }
}

/// The YAML config file; only its `default` profile is used.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default, alias = ":default")]
    pub default: PartialConfig,
}

impl FileConfig {
    pub fn from_yaml(yaml: &str, path: &Path) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yml::from_str(yaml).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads `path`, returning `None` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            log::info!("No configuration file {} found.", path.display());
            return Ok(None);
        }

        log::debug!("Loading configuration file {}", path.display());
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&yaml, path).map(Some)
    }
}

/// `~/.moneywellspentrc`, if a home directory is known.
pub fn default_config_path() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(|home| PathBuf::from(home).join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path() -> PathBuf {
        PathBuf::from("/tmp/.moneywellspentrc")
    }

    #[test]
    fn test_parse_plain_keys() {
        let yaml = r#"
default:
  site: amazon.de
  login: me@example.com
  year: 2010
"#;
        let file = FileConfig::from_yaml(yaml, &path()).unwrap();
        assert_eq!(file.default.site.as_deref(), Some("amazon.de"));
        assert_eq!(file.default.login.as_deref(), Some("me@example.com"));
        assert_eq!(file.default.password, None);
        assert_eq!(file.default.year, Some(2010));
    }

    #[test]
    fn test_parse_symbol_keys() {
        let yaml = r#"
default:
  :site: uk
  :password: hunter2
"#;
        let file = FileConfig::from_yaml(yaml, &path()).unwrap();
        assert_eq!(file.default.site.as_deref(), Some("uk"));
        assert_eq!(file.default.password.as_deref(), Some("hunter2"));
    }

    #[test]
    fn test_empty_and_malformed_files() {
        let empty = FileConfig::from_yaml("  \n", &path()).unwrap();
        assert_eq!(empty.default, PartialConfig::default());

        let err = FileConfig::from_yaml("default: [unclosed", &path()).unwrap_err();
        assert!(matches!(err, ConfigError::Yaml { .. }));
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        let loaded = FileConfig::load(Path::new("/nonexistent/.moneywellspentrc")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_flags_take_precedence_over_file() {
        let flags = PartialConfig {
            site: Some("com".to_string()),
            year: Some(2015),
            ..Default::default()
        };
        let file = PartialConfig {
            site: Some("de".to_string()),
            login: Some("me@example.com".to_string()),
            password: Some("secret".to_string()),
            year: Some(2009),
        };

        let config = flags.or(file).resolve().unwrap();
        assert_eq!(config.site, Site::Com);
        assert_eq!(config.login, "me@example.com");
        assert_eq!(config.start_year, 2015);
    }

    #[test]
    fn test_resolve_reports_missing_and_invalid() {
        let missing = PartialConfig {
            site: Some("de".to_string()),
            ..Default::default()
        };
        assert!(matches!(missing.resolve(), Err(ConfigError::Missing("login"))));

        let invalid = PartialConfig {
            site: Some("amazon.it".to_string()),
            login: Some("a".to_string()),
            password: Some("b".to_string()),
            year: Some(2020),
        };
        assert!(matches!(invalid.resolve(), Err(ConfigError::InvalidSite(_))));
    }

    #[test]
    fn test_validate_start_year() {
        let config = Config {
            site: Site::Fr,
            login: "a".to_string(),
            password: "b".to_string(),
            start_year: 2030,
        };
        assert!(config.validate(2030).is_ok());
        assert!(matches!(
            config.validate(2026),
            Err(ConfigError::StartYearInFuture {
                start: 2030,
                current: 2026
            })
        ));
    }

    #[test]
    fn test_debug_hides_password() {
        let config = Config {
            site: Site::De,
            login: "me@example.com".to_string(),
            password: "hunter2".to_string(),
            start_year: 2012,
        };
        let debug = format!("{config:?}");
        assert!(debug.contains("me@example.com"));
        assert!(!debug.contains("hunter2"));
    }
}
