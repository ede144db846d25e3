//! Error types for hostshare-core.

use thiserror::Error;

/// Result type alias for hostshare-core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur while setting up or tearing down container resources.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Error from hostshare-vm
    #[error("VM error: {0}")]
    Vm(#[from] hostshare_vm::VmError),

    /// The network namespace service failed
    #[error("namespace service error: {0}")]
    Namespace(String),
}
