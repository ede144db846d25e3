//! Builder pattern for ergonomic UtilityVm configuration.

use crate::channel::ManagementChannel;
use crate::config::{OperatingSystem, UtilityVmConfig};
use crate::error::Result;
use crate::socket::HttpManagementChannel;
use crate::UtilityVm;
use std::path::PathBuf;
use std::sync::Arc;

/// Fluent builder for UtilityVm handles.
///
/// # Example
///
/// ```no_run
/// use hostshare_vm::{OperatingSystem, UtilityVmBuilder};
///
/// # fn example() -> hostshare_vm::Result<()> {
/// let vm = UtilityVmBuilder::new()
///     .id("uvm-1")
///     .operating_system(OperatingSystem::Windows)
///     .management_socket("/run/hostshare/uvm-1.sock")
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct UtilityVmBuilder {
    config: UtilityVmConfig,
    channel: Option<Arc<dyn ManagementChannel>>,
}

impl UtilityVmBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    pub fn from_config(config: UtilityVmConfig) -> Self {
        Self {
            config,
            channel: None,
        }
    }

    /// Set the VM identifier.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.config.id = id.into();
        self
    }

    /// Set the guest operating system.
    pub fn operating_system(mut self, os: OperatingSystem) -> Self {
        self.config.operating_system = os;
        self
    }

    /// Mark the VM's devices as physically backed.
    pub fn devices_physically_backed(mut self, backed: bool) -> Self {
        self.config.devices_physically_backed = backed;
        self
    }

    /// Set the management API socket used by the default channel.
    pub fn management_socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.management_socket = path.into();
        self
    }

    /// Use a specific management channel instead of the socket.
    pub fn channel(mut self, channel: Arc<dyn ManagementChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Build and return the configuration without creating a handle.
    pub fn build_config(self) -> UtilityVmConfig {
        self.config
    }

    /// Build the UtilityVm handle.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> Result<UtilityVm> {
        let channel = match self.channel {
            Some(channel) => channel,
            None => Arc::new(HttpManagementChannel::new(
                self.config.management_socket.clone(),
            )),
        };
        UtilityVm::new(self.config, channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::RecordingChannel;

    #[test]
    fn test_builder_config() {
        let config = UtilityVmBuilder::new()
            .id("uvm-7")
            .operating_system(OperatingSystem::Linux)
            .devices_physically_backed(true)
            .management_socket("/tmp/uvm-7.sock")
            .build_config();

        assert_eq!(config.id, "uvm-7");
        assert_eq!(config.operating_system, OperatingSystem::Linux);
        assert!(config.devices_physically_backed);
        assert_eq!(config.management_socket, PathBuf::from("/tmp/uvm-7.sock"));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let result = UtilityVmBuilder::new()
            .id("")
            .channel(Arc::new(RecordingChannel::new()))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_build_with_channel() {
        let vm = UtilityVmBuilder::new()
            .id("uvm-8")
            .devices_physically_backed(true)
            .channel(Arc::new(RecordingChannel::new()))
            .build()
            .unwrap();
        assert_eq!(vm.id(), "uvm-8");
        assert!(vm.default_vsmb_options(false).no_directmap);
    }
}
