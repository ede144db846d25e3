//! Network namespace setup for containers, over an external namespace service.

use crate::activity::run_activity;
use crate::error::Result;
use crate::resources::{Resource, Resources};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Description of a host network endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: String,
    pub name: String,
    pub ip_address: Option<String>,
    pub mac_address: Option<String>,
    /// Namespace the endpoint is attached to, if any
    pub namespace: Option<String>,
}

/// Host service owning network namespaces and endpoints.
#[async_trait]
pub trait NamespaceService: Send + Sync {
    /// Create an empty namespace and return its id.
    async fn create_namespace(&self) -> Result<String>;

    async fn remove_namespace(&self, namespace: &str) -> Result<()>;

    async fn add_namespace_endpoint(&self, namespace: &str, endpoint_id: &str) -> Result<()>;

    async fn remove_namespace_endpoint(&self, namespace: &str, endpoint_id: &str) -> Result<()>;

    /// Ids of all endpoints attached to `namespace`.
    async fn namespace_endpoint_ids(&self, namespace: &str) -> Result<Vec<String>>;

    async fn endpoint_by_id(&self, endpoint_id: &str) -> Result<Endpoint>;
}

/// Endpoints a container attached to a namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkEndpoints {
    pub namespace: String,
    pub endpoint_ids: Vec<String>,
}

impl NetworkEndpoints {
    /// Detach every endpoint from the namespace.
    ///
    /// # Errors
    /// Stops at the first endpoint the service fails to detach.
    pub async fn release(&self, service: &dyn NamespaceService) -> Result<()> {
        for endpoint_id in &self.endpoint_ids {
            service
                .remove_namespace_endpoint(&self.namespace, endpoint_id)
                .await?;
            tracing::debug!(
                netns = %self.namespace,
                endpoint_id = %endpoint_id,
                "removed network endpoint from namespace"
            );
        }
        Ok(())
    }
}

/// Create a network namespace for the container tracked by `resources` and
/// attach `endpoint_ids` to it.
///
/// The namespace and every endpoint attached before a failure are recorded on
/// `resources`, so releasing them cleans up a partial setup.
pub async fn create_network_namespace(
    service: &dyn NamespaceService,
    resources: &mut Resources,
    endpoint_ids: &[String],
) -> Result<()> {
    let container_id = resources.container_id().to_string();
    run_activity("CreateNetworkNamespace", &container_id, async {
        let netns = service.create_namespace().await?;
        tracing::info!(
            netns = %netns,
            container_id = %container_id,
            "created network namespace for container"
        );
        resources.set_net_ns(netns.clone());
        resources.set_created_net_ns(true);

        let mut attached = Vec::with_capacity(endpoint_ids.len());
        let mut outcome: Result<()> = Ok(());
        for endpoint_id in endpoint_ids {
            if let Err(e) = service.add_namespace_endpoint(&netns, endpoint_id).await {
                outcome = Err(e);
                break;
            }
            tracing::info!(
                netns = %netns,
                endpoint_id = %endpoint_id,
                "added network endpoint to namespace"
            );
            attached.push(endpoint_id.clone());
        }

        resources.add(Resource::NetworkEndpoints(NetworkEndpoints {
            namespace: netns,
            endpoint_ids: attached,
        }));
        outcome
    })
    .await
}

/// Full descriptions of every endpoint in `netns`.
pub async fn namespace_endpoints(service: &dyn NamespaceService, netns: &str) -> Result<Vec<Endpoint>> {
    tracing::debug!(netns_id = %netns, "listing namespace endpoints");
    let ids = service.namespace_endpoint_ids(netns).await?;
    let mut endpoints = Vec::with_capacity(ids.len());
    for id in ids {
        endpoints.push(service.endpoint_by_id(&id).await?);
    }
    Ok(endpoints)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::CoreError;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// In-memory namespace service. Endpoints whose id starts with `bad` fail
    /// to attach.
    #[derive(Default)]
    pub(crate) struct FakeNamespaces {
        pub(crate) namespaces: Mutex<HashMap<String, Vec<String>>>,
        next: Mutex<u32>,
    }

    #[async_trait]
    impl NamespaceService for FakeNamespaces {
        async fn create_namespace(&self) -> Result<String> {
            let mut next = self.next.lock().await;
            *next += 1;
            let id = format!("ns-{next}");
            self.namespaces.lock().await.insert(id.clone(), Vec::new());
            Ok(id)
        }

        async fn remove_namespace(&self, namespace: &str) -> Result<()> {
            self.namespaces
                .lock()
                .await
                .remove(namespace)
                .map(|_| ())
                .ok_or_else(|| CoreError::Namespace(format!("no namespace {namespace}")))
        }

        async fn add_namespace_endpoint(&self, namespace: &str, endpoint_id: &str) -> Result<()> {
            if endpoint_id.starts_with("bad") {
                return Err(CoreError::Namespace(format!("cannot attach {endpoint_id}")));
            }
            let mut namespaces = self.namespaces.lock().await;
            let endpoints = namespaces
                .get_mut(namespace)
                .ok_or_else(|| CoreError::Namespace(format!("no namespace {namespace}")))?;
            endpoints.push(endpoint_id.to_string());
            Ok(())
        }

        async fn remove_namespace_endpoint(&self, namespace: &str, endpoint_id: &str) -> Result<()> {
            let mut namespaces = self.namespaces.lock().await;
            let endpoints = namespaces
                .get_mut(namespace)
                .ok_or_else(|| CoreError::Namespace(format!("no namespace {namespace}")))?;
            endpoints.retain(|id| id != endpoint_id);
            Ok(())
        }

        async fn namespace_endpoint_ids(&self, namespace: &str) -> Result<Vec<String>> {
            self.namespaces
                .lock()
                .await
                .get(namespace)
                .cloned()
                .ok_or_else(|| CoreError::Namespace(format!("no namespace {namespace}")))
        }

        async fn endpoint_by_id(&self, endpoint_id: &str) -> Result<Endpoint> {
            Ok(Endpoint {
                id: endpoint_id.to_string(),
                name: format!("{endpoint_id}-nic"),
                ..Default::default()
            })
        }
    }

    #[tokio::test]
    async fn test_create_network_namespace() {
        let service = FakeNamespaces::default();
        let mut resources = Resources::new("c1");
        let ids = vec!["ep-1".to_string(), "ep-2".to_string()];

        create_network_namespace(&service, &mut resources, &ids)
            .await
            .unwrap();

        assert_eq!(resources.net_ns(), Some("ns-1"));
        assert!(resources.created_net_ns());
        match resources.resources() {
            [Resource::NetworkEndpoints(endpoints)] => {
                assert_eq!(endpoints.namespace, "ns-1");
                assert_eq!(endpoints.endpoint_ids, ids);
            }
            other => panic!("unexpected resources: {other:?}"),
        }

        let listed = namespace_endpoints(&service, "ns-1").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[1].name, "ep-2-nic");
    }

    #[tokio::test]
    async fn test_partial_attach_is_recorded() {
        let service = FakeNamespaces::default();
        let mut resources = Resources::new("c2");
        let ids = vec!["ep-1".to_string(), "bad-2".to_string(), "ep-3".to_string()];

        let err = create_network_namespace(&service, &mut resources, &ids)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Namespace(_)));

        match resources.resources() {
            [Resource::NetworkEndpoints(endpoints)] => {
                assert_eq!(endpoints.endpoint_ids, vec!["ep-1".to_string()]);
            }
            other => panic!("unexpected resources: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_release_endpoints() {
        let service = FakeNamespaces::default();
        let netns = service.create_namespace().await.unwrap();
        service.add_namespace_endpoint(&netns, "ep-1").await.unwrap();

        let endpoints = NetworkEndpoints {
            namespace: netns.clone(),
            endpoint_ids: vec!["ep-1".into()],
        };
        endpoints.release(&service).await.unwrap();
        assert!(service.namespace_endpoint_ids(&netns).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_namespace_endpoints_unknown_namespace() {
        let service = FakeNamespaces::default();
        assert!(namespace_endpoints(&service, "missing").await.is_err());
    }
}
