//! # hostshare-vm
//!
//! Utility VM handle for the hostshare container shim.
//! Maps host directories and files into a running VM as de-duplicated,
//! ref-counted VSMB shares.
//!
//! ## Quick Start
//!
//! ```no_run
//! use hostshare_vm::UtilityVmBuilder;
//!
//! # async fn example() -> hostshare_vm::Result<()> {
//! let vm = UtilityVmBuilder::new()
//!     .id("uvm-1")
//!     .management_socket("/run/hostshare/uvm-1.sock")
//!     .build()?;
//!
//! // Share a directory read-only; a second add only bumps the ref count
//! let options = vm.default_vsmb_options(true);
//! let share = vm.add_vsmb("/var/lib/layers/base", options).await?;
//! let guest_path = vm.get_vsmb_guest_path("/var/lib/layers/base", true).await?;
//! assert_eq!(guest_path, share.guest_path());
//!
//! // Drop the reference; the share is torn down with the last one
//! vm.remove_vsmb("/var/lib/layers/base", true).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Share de-duplication**: one share per host directory and access mode
//! - **Single-file mapping**: files are exposed through an allow-list on their directory
//! - **Save/restore**: byte encoding of a share's persistent fields
//! - **Templating**: clone shares into a VM provisioning document
//! - **Pluggable transport**: any [`ManagementChannel`], HTTP over a Unix socket by default

mod builder;
mod channel;
mod clone;
mod codec;
mod config;
mod error;
mod options;
mod registry;
mod share;
mod socket;
mod vm;

pub use builder::UtilityVmBuilder;
pub use channel::{
    ManagementChannel, ModifyRequest, RecordingChannel, RequestType, VirtualSmbShare,
    VSMB_SHARE_RESOURCE_PATH,
};
pub use clone::{Cloneable, Devices, ProvisioningDocument, VirtualMachineDocument, VirtualSmb};
pub use config::{OperatingSystem, UtilityVmConfig};
pub use error::{ChannelError, Result, VmError};
pub use options::VirtualSmbShareOptions;
pub use registry::{clean_path, ShareKey};
pub use share::{VsmbShare, VSMB_SHARE_PREFIX};
pub use socket::HttpManagementChannel;
pub use vm::UtilityVm;
