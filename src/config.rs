use serde::Deserialize;
use std::{fs, net::IpAddr, path::PathBuf};
use thiserror::Error;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub enrollment: EnrollmentConfig,
    #[serde(default)]
    pub moderation: ModerationConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    pub organization_name: String,
    /// The authenticated identity permitted to manage every institution.
    pub super_admin_uid: String,
    /// Used when a viewer does not tell us their UTC offset.
    #[serde(default)]
    pub default_utc_offset_minutes: i32,
    pub tls: Option<TlsConfig>,
}

// Per configuration, we should bind to 127.0.0.1 by default.
fn default_bind_address() -> IpAddr {
    IpAddr::from([127, 0, 0, 1])
}

fn default_port() -> u16 {
    8080
}

#[derive(Clone, Debug, Deserialize)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

#[derive(Clone, Debug, Deserialize)]
pub struct StorageConfig {
    pub database_path: String,
}

/// What to do when a confirmed device is already assigned to a student
/// within the same institution.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateDevicePolicy {
    /// The previous student record for the device is removed.
    #[default]
    Replace,
    /// Confirmation fails, leaving the pending enrollment untouched.
    Reject,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EnrollmentConfig {
    #[serde(default)]
    pub duplicate_device_policy: DuplicateDevicePolicy,
    #[serde(default = "default_qr_size")]
    pub qr_size: u32,
}

fn default_qr_size() -> u32 {
    256
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        EnrollmentConfig {
            duplicate_device_policy: DuplicateDevicePolicy::default(),
            qr_size: default_qr_size(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ModerationConfig {
    #[serde(default)]
    pub blocked_terms: Vec<String>,
    #[serde(default = "default_max_length")]
    pub max_length: usize,
}

fn default_max_length() -> usize {
    500
}

impl Default for ModerationConfig {
    fn default() -> Self {
        ModerationConfig {
            blocked_terms: vec![],
            max_length: default_max_length(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration at {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("unable to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Used to access options within configuration.
impl Config {
    /// Loads the configuration from the specified path.
    /// Prefer using the config within the shared application state after startup.
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }
}
