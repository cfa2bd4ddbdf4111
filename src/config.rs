//! Bouncer configuration
//!
//! Read from a YAML file. Every key is optional; an empty file yields the
//! pf engine with both families enabled and the stock table names:
//!
//! ```yaml
//! mode: pf            # pf | iptables | nftables
//! disable_ipv6: false
//! log_mode: stdout    # stdout | file
//! log_dir: /var/log/
//! log_level: info
//! pf:
//!   pfctl_path: /sbin/pfctl
//!   device: /dev/pf
//!   ipv4_table: crowdsec-blacklists
//!   ipv6_table: crowdsec6-blacklists
//! ```

use crate::core::backend::Engine;
use crate::core::error::{Error, Result};
use crate::core::family::TableLayout;
use crate::core::{ipset, pf};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where log lines go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogMode {
    #[default]
    Stdout,
    /// `fw-bouncer.log` inside `log_dir`
    File,
}

/// Complete bouncer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BouncerConfig {
    #[serde(default)]
    pub mode: Engine,
    /// Skip the IPv6 table entirely; IPv6 decisions are dropped
    #[serde(default)]
    pub disable_ipv6: bool,
    #[serde(default)]
    pub log_mode: LogMode,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub pf: PfConfig,
    #[serde(default)]
    pub ipset: IpsetConfig,
    #[serde(default)]
    pub nftables: NftablesConfig,
}

impl Default for BouncerConfig {
    fn default() -> Self {
        Self {
            mode: Engine::default(),
            disable_ipv6: false,
            log_mode: LogMode::default(),
            log_dir: default_log_dir(),
            log_level: default_log_level(),
            pf: PfConfig::default(),
            ipset: IpsetConfig::default(),
            nftables: NftablesConfig::default(),
        }
    }
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/")
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PfConfig {
    pub pfctl_path: PathBuf,
    pub device: PathBuf,
    pub ipv4_table: String,
    pub ipv6_table: String,
}

impl Default for PfConfig {
    fn default() -> Self {
        Self {
            pfctl_path: PathBuf::from(pf::DEFAULT_PFCTL),
            device: PathBuf::from(pf::DEFAULT_DEVICE),
            ipv4_table: pf::DEFAULT_IPV4_TABLE.to_string(),
            ipv6_table: pf::DEFAULT_IPV6_TABLE.to_string(),
        }
    }
}

impl PfConfig {
    pub fn layout(&self) -> TableLayout {
        TableLayout {
            tool: self.pfctl_path.clone(),
            device: Some(self.device.clone()),
            ipv4_table: self.ipv4_table.clone(),
            ipv6_table: self.ipv6_table.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpsetConfig {
    pub ipset_path: PathBuf,
    pub ipv4_set: String,
    pub ipv6_set: String,
}

impl Default for IpsetConfig {
    fn default() -> Self {
        Self {
            ipset_path: PathBuf::from(ipset::DEFAULT_IPSET),
            ipv4_set: ipset::DEFAULT_IPV4_SET.to_string(),
            ipv6_set: ipset::DEFAULT_IPV6_SET.to_string(),
        }
    }
}

impl IpsetConfig {
    pub fn layout(&self) -> TableLayout {
        TableLayout {
            tool: self.ipset_path.clone(),
            device: None,
            ipv4_table: self.ipv4_set.clone(),
            ipv6_table: self.ipv6_set.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NftablesConfig {
    pub nft_path: PathBuf,
    pub ipv4: NftSetConfig,
    pub ipv6: NftSetConfig,
}

impl Default for NftablesConfig {
    fn default() -> Self {
        Self {
            nft_path: PathBuf::from("nft"),
            ipv4: NftSetConfig {
                family: "ip".to_string(),
                table: "crowdsec".to_string(),
                set: "crowdsec-blacklists".to_string(),
            },
            ipv6: NftSetConfig {
                family: "ip6".to_string(),
                table: "crowdsec6".to_string(),
                set: "crowdsec6-blacklists".to_string(),
            },
        }
    }
}

/// Location of one nftables set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftSetConfig {
    pub family: String,
    pub table: String,
    pub set: String,
}

impl BouncerConfig {
    /// Parses and validates a YAML document.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the YAML is malformed or a value fails validation.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty document deserializes as unit, not as an empty mapping
        let config: BouncerConfig = if yaml.trim().is_empty() {
            BouncerConfig::default()
        } else {
            serde_yaml::from_str(yaml)?
        };

        config.validate()?;
        Ok(config)
    }

    /// Maximum log level
    ///
    /// # Errors
    ///
    /// Returns `Err` if `log_level` is not a tracing level name.
    pub fn level(&self) -> Result<tracing::Level> {
        self.log_level
            .parse()
            .map_err(|_| invalid("log_level", format!("unknown level '{}'", self.log_level)))
    }

    /// Checks the settings of the selected engine.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` naming the offending key.
    pub fn validate(&self) -> Result<()> {
        self.level()?;

        let (section, v4, v6) = match self.mode {
            Engine::Pf => ("pf", self.pf.ipv4_table.clone(), self.pf.ipv6_table.clone()),
            Engine::Iptables => (
                "ipset",
                self.ipset.ipv4_set.clone(),
                self.ipset.ipv6_set.clone(),
            ),
            Engine::Nftables => {
                for (key, set) in [("ipv4", &self.nftables.ipv4), ("ipv6", &self.nftables.ipv6)] {
                    if set.family.is_empty() || set.table.is_empty() || set.set.is_empty() {
                        return Err(invalid(
                            &format!("nftables.{key}"),
                            "family, table and set must be set".to_string(),
                        ));
                    }
                }
                (
                    "nftables",
                    format!("{} {} {}", self.nftables.ipv4.family, self.nftables.ipv4.table, self.nftables.ipv4.set),
                    format!("{} {} {}", self.nftables.ipv6.family, self.nftables.ipv6.table, self.nftables.ipv6.set),
                )
            }
        };

        if v4.trim().is_empty() {
            return Err(invalid(section, "IPv4 table name is empty".to_string()));
        }
        if !self.disable_ipv6 {
            if v6.trim().is_empty() {
                return Err(invalid(section, "IPv6 table name is empty".to_string()));
            }
            if v4 == v6 {
                return Err(invalid(
                    section,
                    format!("IPv4 and IPv6 share the table '{v4}'"),
                ));
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, message: String) -> Error {
    Error::InvalidConfig {
        field: field.to_string(),
        message,
    }
}

/// Loads and validates the configuration file at `path`.
///
/// # Async
/// Uses `tokio::fs` so it can run inside the bouncer's runtime.
///
/// # Errors
///
/// Returns `Err` if the file cannot be read, parsed or validated.
pub async fn load_config(path: &Path) -> Result<BouncerConfig> {
    debug!("loading configuration from {}", path.display());
    let yaml = tokio::fs::read_to_string(path).await?;
    BouncerConfig::from_yaml(&yaml)
}
