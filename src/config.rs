use crate::error::{ConfigError, HarnessError};
use crate::wire::WireFormat;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub identity: IdentityConfig,
    pub compute: ComputeConfig,
    pub volume: VolumeConfig,
    pub network: NetworkConfig,
    /// Wire format used by every client ("json" or "xml")
    pub interface: WireFormat,
    /// Provision a fresh tenant/user per fixture instead of the shared one
    pub allow_tenant_isolation: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub auth_url: String,
    pub username: String,
    pub password: String,
    pub tenant_name: String,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub admin_tenant_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeConfig {
    pub base_url: String,
    pub available: bool,
    pub image_ref: String,
    /// Second image for filter scenarios; falls back to image_ref when unset
    pub image_ref_alt: Option<String>,
    pub flavor_ref: String,
    pub flavor_ref_alt: Option<String>,
    pub build_interval_secs: u64,
    pub build_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeConfig {
    pub base_url: String,
    pub available: bool,
    pub build_interval_secs: u64,
    pub build_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub base_url: String,
    pub available: bool,
    pub build_interval_secs: u64,
    pub build_timeout_secs: u64,
}

impl ComputeConfig {
    pub fn build_interval(&self) -> Duration {
        Duration::from_secs(self.build_interval_secs)
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }
}

impl VolumeConfig {
    pub fn build_interval(&self) -> Duration {
        Duration::from_secs(self.build_interval_secs)
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }
}

impl NetworkConfig {
    pub fn build_interval(&self) -> Duration {
        Duration::from_secs(self.build_interval_secs)
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            identity: IdentityConfig {
                auth_url: "http://127.0.0.1:5000/v2.0".to_string(),
                username: "demo".to_string(),
                password: "secretadmin".to_string(),
                tenant_name: "demo".to_string(),
                admin_username: None,
                admin_password: None,
                admin_tenant_name: None,
            },
            compute: ComputeConfig {
                base_url: "http://127.0.0.1:8774/v2".to_string(),
                available: true,
                image_ref: "cirros-0.3.1-x86_64".to_string(),
                image_ref_alt: None,
                flavor_ref: "m1.tiny".to_string(),
                flavor_ref_alt: None,
                build_interval_secs: 3,
                build_timeout_secs: 300,
            },
            volume: VolumeConfig {
                base_url: "http://127.0.0.1:8776/v1".to_string(),
                available: true,
                build_interval_secs: 3,
                build_timeout_secs: 300,
            },
            network: NetworkConfig {
                base_url: "http://127.0.0.1:9696".to_string(),
                available: true,
                build_interval_secs: 1,
                build_timeout_secs: 60,
            },
            interface: WireFormat::Json,
            allow_tenant_isolation: false,
        }
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p.to_path_buf()
        } else {
            // Try .stackprobe.toml in current dir, then ~/.config/stackprobe/config.toml
            let local = PathBuf::from(".stackprobe.toml");
            if local.exists() {
                local
            } else {
                dirs::config_dir()
                    .map(|d| d.join("stackprobe").join("config.toml"))
                    .unwrap_or_else(|| PathBuf::from(".stackprobe.toml"))
            }
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config: {}", config_path.display()))?;
            let config: Config = toml::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))
                .with_context(|| {
                    format!(
                        "Failed to parse config: {}\n  Tip: run 'stackprobe init' to create a fresh config file",
                        config_path.display()
                    )
                })?;
            config.validate()?;
            Ok(config)
        } else {
            // Use defaults but warn if user explicitly provided a path
            if path.is_some() {
                eprintln!("WARNING: Config file not found: {}", config_path.display());
                eprintln!("   Using default configuration. Run 'stackprobe init' to create one.");
            }
            Ok(Config::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Field-level checks that toml's type system cannot express.
    pub fn validate(&self) -> std::result::Result<(), HarnessError> {
        if self.identity.auth_url.is_empty() {
            return Err(ConfigError::MissingField("identity.auth_url".to_string()).into());
        }
        for (field, secs) in [
            ("compute.build_timeout_secs", self.compute.build_timeout_secs),
            ("volume.build_timeout_secs", self.volume.build_timeout_secs),
            ("network.build_timeout_secs", self.network.build_timeout_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: "timeout must be non-zero".to_string(),
                }
                .into());
            }
        }
        if self.allow_tenant_isolation
            && (self.identity.admin_username.is_none() || self.identity.admin_password.is_none())
        {
            return Err(ConfigError::MissingField(
                "identity.admin_username/admin_password (required for tenant isolation)"
                    .to_string(),
            )
            .into());
        }
        Ok(())
    }
}

pub fn init_config(output: &Path) -> Result<()> {
    let config = Config::default();
    config.save(output)?;
    println!("Created config file: {}", output.display());
    Ok(())
}
