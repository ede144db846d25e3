//! Error types for hostshare-vm.

use crate::config::OperatingSystem;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for hostshare-vm operations.
pub type Result<T> = std::result::Result<T, VmError>;

/// Errors that can occur during utility VM and share operations.
#[derive(Debug, Error)]
pub enum VmError {
    /// The guest operating system cannot host VSMB shares
    #[error("VSMB shares are not supported on {0} guests")]
    Unsupported(OperatingSystem),

    /// Host path does not exist, or no host path was supplied
    #[error("host path not found: {0}")]
    NotFound(String),

    /// Probing the host path failed for a reason other than absence
    #[error("failed to probe host path {}: {source}", .path.display())]
    Probe {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No live share matches the requested host path and access mode
    #[error("{} is not present as a VSMB share in {vm_id}", .host_path.display())]
    NotAttached { host_path: PathBuf, vm_id: String },

    /// A share with the same key is already registered
    #[error("{} is already present as a VSMB share in {vm_id}", .host_path.display())]
    AlreadyAttached { host_path: PathBuf, vm_id: String },

    /// A share name was already used on the target VM
    #[error("share name {name} is already in use in {vm_id}")]
    NameInUse { name: String, vm_id: String },

    /// The management channel rejected or failed a modification
    #[error("VSMB request for {} on {vm_id} failed: {source}", .host_path.display())]
    HypervisorRequestFailed {
        host_path: PathBuf,
        vm_id: String,
        #[source]
        source: ChannelError,
    },

    /// A share field could not be encoded
    #[error("failed to encode VSMB share field `{field}`: {reason}")]
    Serialization { field: &'static str, reason: String },

    /// A share field could not be decoded
    #[error("failed to decode VSMB share field `{field}`: {reason}")]
    Deserialization { field: &'static str, reason: String },

    /// The VM owning a share no longer exists
    #[error("utility VM owning share {0} is no longer available")]
    VmUnavailable(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors returned by a [`ManagementChannel`](crate::ManagementChannel).
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Could not reach the management endpoint
    #[error("transport error: {0}")]
    Transport(String),

    /// Could not build or serialize the request
    #[error("request encoding error: {0}")]
    Encode(String),

    /// The hypervisor answered with a failure status
    #[error("request rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}
