//! Configuration types for utility VM instances.

use crate::error::{Result, VmError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Guest operating system running inside a utility VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingSystem {
    /// Windows guest, the only kind able to mount VSMB shares
    #[default]
    Windows,
    /// Linux guest
    Linux,
}

impl OperatingSystem {
    /// Whether this guest can mount VSMB shares.
    pub fn supports_vsmb(&self) -> bool {
        matches!(self, Self::Windows)
    }
}

impl fmt::Display for OperatingSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatingSystem::Windows => write!(f, "windows"),
            OperatingSystem::Linux => write!(f, "linux"),
        }
    }
}

impl FromStr for OperatingSystem {
    type Err = VmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "windows" => Ok(Self::Windows),
            "linux" => Ok(Self::Linux),
            other => Err(VmError::Config(format!(
                "unknown guest operating system: {other}"
            ))),
        }
    }
}

/// Configuration for a utility VM handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UtilityVmConfig {
    /// Identifier used in logs and error context
    pub id: String,
    /// Guest operating system
    pub operating_system: OperatingSystem,
    /// Whether the VM's devices are backed by physical memory (disables direct map)
    pub devices_physically_backed: bool,
    /// Path to the hypervisor management API socket
    pub management_socket: PathBuf,
}

impl Default for UtilityVmConfig {
    fn default() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            operating_system: OperatingSystem::Windows,
            devices_physically_backed: false,
            management_socket: PathBuf::from("/tmp/hostshare/management.sock"),
        }
    }
}

impl UtilityVmConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `HOSTSHARE_VM_ID` | random UUID |
    /// | `HOSTSHARE_GUEST_OS` | `windows` |
    /// | `HOSTSHARE_PHYSICALLY_BACKED` | `false` |
    /// | `HOSTSHARE_MGMT_SOCKET` | `/tmp/hostshare/management.sock` |
    ///
    /// # Errors
    /// Returns an error if `HOSTSHARE_GUEST_OS` names an unknown system.
    pub fn from_env() -> Result<Self> {
        let default = Self::default();

        let operating_system = match std::env::var("HOSTSHARE_GUEST_OS") {
            Ok(v) => v.parse()?,
            Err(_) => default.operating_system,
        };

        Ok(Self {
            id: std::env::var("HOSTSHARE_VM_ID").unwrap_or(default.id),
            operating_system,
            devices_physically_backed: std::env::var("HOSTSHARE_PHYSICALLY_BACKED")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(default.devices_physically_backed),
            management_socket: std::env::var("HOSTSHARE_MGMT_SOCKET")
                .map(PathBuf::from)
                .unwrap_or(default.management_socket),
        })
    }

    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(VmError::Config("id must not be empty".into()));
        }
        if self.management_socket.as_os_str().is_empty() {
            return Err(VmError::Config("management_socket is required".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = UtilityVmConfig::default();
        assert_eq!(config.operating_system, OperatingSystem::Windows);
        assert!(!config.devices_physically_backed);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_id() {
        let config = UtilityVmConfig {
            id: "  ".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_missing_socket() {
        let config = UtilityVmConfig {
            management_socket: PathBuf::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_operating_system_parse() {
        assert_eq!(
            "Windows".parse::<OperatingSystem>().unwrap(),
            OperatingSystem::Windows
        );
        assert_eq!(
            "linux".parse::<OperatingSystem>().unwrap(),
            OperatingSystem::Linux
        );
        assert!("plan9".parse::<OperatingSystem>().is_err());
    }

    #[test]
    fn test_only_windows_supports_vsmb() {
        assert!(OperatingSystem::Windows.supports_vsmb());
        assert!(!OperatingSystem::Linux.supports_vsmb());
    }
}
