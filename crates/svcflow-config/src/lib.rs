//! svcflow configuration
//!
//! The configuration file is YAML, searched in this order:
//! 1. `SVCFLOW_CONFIG_PATH` (direct path)
//! 2. current directory: `svcflow.local.yaml`, `svcflow.yaml`
//! 3. `<config_dir>/svcflow/svcflow.yaml` (global)
//!
//! Without any file the defaults apply. `SVCFLOW_LOG` overrides `log.filter`.

pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "SVCFLOW_CONFIG_PATH";
pub const LOG_ENV: &str = "SVCFLOW_LOG";

const CANDIDATES: [&str; 2] = ["svcflow.local.yaml", "svcflow.yaml"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub deployer: DeployerConfig,
    pub store: StoreConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployerConfig {
    /// Deployer used when a registration does not name one
    pub kind_default: String,
    pub terraform_binary: String,
    pub tofu_binary: String,
    /// Parent directory of the per-order workspaces of the local executor
    pub workspace_root: PathBuf,
    /// Maximum wait for a deployer callback
    pub callback_timeout_secs: u64,
    /// Use a terraform-boot / tofu-maker service instead of local binaries
    pub remote: Option<RemoteDeployerConfig>,
}

impl Default for DeployerConfig {
    fn default() -> Self {
        Self {
            kind_default: "terraform".to_string(),
            terraform_binary: "terraform".to_string(),
            tofu_binary: "tofu".to_string(),
            workspace_root: std::env::temp_dir().join("svcflow").join("workspaces"),
            callback_timeout_secs: 3600,
            remote: None,
        }
    }
}

impl DeployerConfig {
    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDeployerConfig {
    pub base_url: String,
    /// Address the deployer posts job results to
    pub callback_base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl RemoteDeployerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from(".svcflow"));
        Self {
            path: base.join("svcflow").join("lifecycle.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive
    pub filter: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Discover, load and validate the configuration
    pub fn load() -> Result<Self> {
        let mut config = match find_config_file()? {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(filter) = std::env::var(LOG_ENV) {
            if !filter.trim().is_empty() {
                self.log.filter = filter;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.deployer.callback_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "deployer.callback_timeout_secs".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if let Some(remote) = &self.deployer.remote {
            for (key, value) in [
                ("deployer.remote.base_url", &remote.base_url),
                ("deployer.remote.callback_base_url", &remote.callback_base_url),
            ] {
                if !value.starts_with("http://") && !value.starts_with("https://") {
                    return Err(ConfigError::InvalidValue {
                        key: key.to_string(),
                        message: format!("not an http(s) URL: {value:?}"),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Global svcflow configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("svcflow"))
}

/// Locate the configuration file, if any
pub fn find_config_file() -> Result<Option<PathBuf>> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(Some(path));
        }
    }

    let current_dir = std::env::current_dir()?;
    for filename in CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(Some(path));
        }
    }

    if let Ok(config_dir) = get_config_dir() {
        let global_config = config_dir.join("svcflow.yaml");
        if global_config.exists() {
            return Ok(Some(global_config));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    #[serial]
    fn test_local_file_takes_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        fs::write(temp_dir.path().join("svcflow.yaml"), "log:\n  filter: warn\n").unwrap();
        fs::write(temp_dir.path().join("svcflow.local.yaml"), "log:\n  filter: debug\n").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let found = temp_env::with_var_unset(CONFIG_PATH_ENV, find_config_file).unwrap();
        std::env::set_current_dir(original_dir).unwrap();

        assert!(found.unwrap().ends_with("svcflow.local.yaml"));
    }

    #[test]
    #[serial]
    fn test_env_path_wins() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.yaml");
        fs::write(&config_path, "deployer:\n  callback_timeout_secs: 120\n").unwrap();

        let config = temp_env::with_vars(
            [
                (CONFIG_PATH_ENV, Some(config_path.to_str().unwrap())),
                (LOG_ENV, None),
            ],
            Config::load,
        )
        .unwrap();

        assert_eq!(config.deployer.callback_timeout(), Duration::from_secs(120));
        assert_eq!(config.deployer.terraform_binary, "terraform");
        assert_eq!(config.log.filter, "info");
    }

    #[test]
    #[serial]
    fn test_log_env_overrides_filter() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("svcflow.yaml");
        fs::write(&config_path, "log:\n  filter: warn\n  json: true\n").unwrap();

        let config = temp_env::with_vars(
            [
                (CONFIG_PATH_ENV, Some(config_path.to_str().unwrap())),
                (LOG_ENV, Some("svcflow_lifecycle=debug")),
            ],
            Config::load,
        )
        .unwrap();

        assert_eq!(config.log.filter, "svcflow_lifecycle=debug");
        assert!(config.log.json);
    }

    #[test]
    fn test_remote_section() {
        let config: Config = serde_yaml::from_str(
            r#"
deployer:
  kind_default: opentofu
  remote:
    base_url: http://tofu-maker:9092
    callback_base_url: http://svcflowd:8080/webhook/deploy
store:
  path: /var/lib/svcflow/lifecycle.json
"#,
        )
        .unwrap();

        let remote = config.deployer.remote.as_ref().unwrap();
        assert_eq!(remote.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.deployer.kind_default, "opentofu");
        assert_eq!(
            config.store.path,
            PathBuf::from("/var/lib/svcflow/lifecycle.json")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::default();
        config.deployer.callback_timeout_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));

        let mut config = Config::default();
        config.deployer.remote = Some(RemoteDeployerConfig {
            base_url: "tofu-maker:9092".to_string(),
            callback_base_url: "http://svcflowd/webhook".to_string(),
            request_timeout_secs: 30,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_file_names_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("svcflow.yaml");
        fs::write(&path, "deployer: [not, a, map]").unwrap();

        match Config::load_from(&path) {
            Err(ConfigError::Parse { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
