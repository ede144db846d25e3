//! Per-container tracking of acquired VM and host resources.

use crate::error::{CoreError, Result};
use crate::network::{NamespaceService, NetworkEndpoints};
use hostshare_vm::VsmbShare;

/// A resource held on behalf of a container.
#[derive(Debug, Clone)]
pub enum Resource {
    /// A reference to a VSMB share on the container's utility VM
    VsmbShare(VsmbShare),
    /// Endpoints attached to the container's network namespace
    NetworkEndpoints(NetworkEndpoints),
}

impl Resource {
    async fn release(&self, namespaces: &dyn NamespaceService) -> Result<()> {
        match self {
            Resource::VsmbShare(share) => share.release().await.map_err(CoreError::from),
            Resource::NetworkEndpoints(endpoints) => endpoints.release(namespaces).await,
        }
    }
}

/// Resources acquired for one container, released in reverse order.
#[derive(Debug, Default)]
pub struct Resources {
    container_id: String,
    net_ns: Option<String>,
    created_net_ns: bool,
    resources: Vec<Resource>,
}

impl Resources {
    pub fn new(container_id: impl Into<String>) -> Self {
        Self {
            container_id: container_id.into(),
            ..Default::default()
        }
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// Network namespace the container runs in.
    pub fn net_ns(&self) -> Option<&str> {
        self.net_ns.as_deref()
    }

    pub fn set_net_ns(&mut self, net_ns: impl Into<String>) {
        self.net_ns = Some(net_ns.into());
    }

    /// Whether the namespace was created for this container and must be
    /// removed with it.
    pub fn created_net_ns(&self) -> bool {
        self.created_net_ns
    }

    pub fn set_created_net_ns(&mut self, created: bool) {
        self.created_net_ns = created;
    }

    /// Record a newly acquired resource.
    pub fn add(&mut self, resource: Resource) {
        self.resources.push(resource);
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// Release every resource, newest first, then remove the network
    /// namespace if this container created it.
    ///
    /// Failures do not stop the teardown. Resources that failed to release
    /// stay recorded so a later call can retry them.
    ///
    /// # Errors
    /// Returns the first failure encountered.
    pub async fn release_all(&mut self, namespaces: &dyn NamespaceService) -> Result<()> {
        tracing::debug!(
            container_id = %self.container_id,
            count = self.resources.len(),
            "Releasing container resources"
        );

        let mut first_error = None;
        let mut failed = Vec::new();

        while let Some(resource) = self.resources.pop() {
            if let Err(e) = resource.release(namespaces).await {
                tracing::warn!(
                    container_id = %self.container_id,
                    error = %e,
                    "Failed to release container resource"
                );
                first_error.get_or_insert(e);
                failed.push(resource);
            }
        }
        failed.reverse();
        self.resources = failed;

        if self.created_net_ns && self.resources.is_empty() {
            if let Some(net_ns) = self.net_ns.clone() {
                match namespaces.remove_namespace(&net_ns).await {
                    Ok(()) => {
                        tracing::info!(
                            container_id = %self.container_id,
                            netns = %net_ns,
                            "Removed network namespace"
                        );
                        self.net_ns = None;
                        self.created_net_ns = false;
                    }
                    Err(e) => {
                        first_error.get_or_insert(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
