//! # hostshare-core
//!
//! Container-side orchestration on top of hostshare utility VMs.
//!
//! Tracks what each container has acquired (VSMB share references, network
//! endpoints) and releases it again when the container goes away.
//!
//! ## Quick Start
//!
//! ```ignore
//! use hostshare_core::{mount_host_path, create_network_namespace, Resources};
//!
//! # async fn example(
//! #     vm: hostshare_vm::UtilityVm,
//! #     namespaces: &dyn hostshare_core::NamespaceService,
//! # ) -> hostshare_core::Result<()> {
//! let mut resources = Resources::new("container-1");
//!
//! create_network_namespace(namespaces, &mut resources, &["endpoint-1".into()]).await?;
//! let guest_path = mount_host_path(&vm, &mut resources, "/var/lib/layers/base", true).await?;
//! println!("layer visible in guest at {guest_path}");
//!
//! // Container exited
//! resources.release_all(namespaces).await?;
//! # Ok(())
//! # }
//! ```

mod activity;
mod error;
mod mount;
mod network;
mod resources;

pub use activity::run_activity;
pub use error::{CoreError, Result};
pub use mount::mount_host_path;
pub use network::{
    create_network_namespace, namespace_endpoints, Endpoint, NamespaceService, NetworkEndpoints,
};
pub use resources::{Resource, Resources};
