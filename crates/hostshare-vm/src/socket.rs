//! Management channel speaking JSON over the hypervisor's API socket.

use crate::channel::{ManagementChannel, ModifyRequest};
use crate::error::ChannelError;
use async_trait::async_trait;
use hyper::{Body, Client, Method, Request};
use hyperlocal::{UnixClientExt, Uri};
use std::path::{Path, PathBuf};

/// Endpoint on the management socket accepting modification requests.
const MODIFY_ENDPOINT: &str = "/modify";

/// Sends modification requests as `PUT /modify` over a Unix socket.
#[derive(Debug, Clone)]
pub struct HttpManagementChannel {
    socket_path: PathBuf,
}

impl HttpManagementChannel {
    /// Create a channel for the given management API socket.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    /// Path to the management API socket.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

#[async_trait]
impl ManagementChannel for HttpManagementChannel {
    async fn modify(&self, request: &ModifyRequest) -> Result<(), ChannelError> {
        let start = std::time::Instant::now();
        tracing::debug!(
            request_type = ?request.request_type,
            share = %request.settings.name,
            socket = %self.socket_path.display(),
            "Sending modify request"
        );

        let body = serde_json::to_string(request)
            .map_err(|e| ChannelError::Encode(format!("failed to serialize modify request: {e}")))?;
        tracing::trace!(body = %body, "modify request body");

        let uri: hyper::Uri = Uri::new(&self.socket_path, MODIFY_ENDPOINT).into();

        let http_request = Request::builder()
            .method(Method::PUT)
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body))
            .map_err(|e| ChannelError::Encode(format!("failed to build modify request: {e}")))?;

        let client = Client::unix();
        let response = client.request(http_request).await.map_err(|e| {
            tracing::error!(error = %e, "modify request failed");
            ChannelError::Transport(format!("modify request failed: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body_bytes = hyper::body::to_bytes(response.into_body())
                .await
                .unwrap_or_default();
            let body_str = String::from_utf8_lossy(&body_bytes).into_owned();
            tracing::error!(status = %status, body = %body_str, "modify request rejected");
            return Err(ChannelError::Rejected {
                status: status.as_u16(),
                body: body_str,
            });
        }

        tracing::debug!(
            share = %request.settings.name,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "modify request accepted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_path() {
        let channel = HttpManagementChannel::new("/tmp/vm-1/management.sock");
        assert_eq!(
            channel.socket_path(),
            Path::new("/tmp/vm-1/management.sock")
        );
    }

    #[tokio::test]
    async fn test_missing_socket_is_transport_error() {
        let dir = tempfile::tempdir().unwrap();
        let channel = HttpManagementChannel::new(dir.path().join("absent.sock"));
        let err = channel
            .modify(&ModifyRequest::remove("s1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Transport(_)));
    }
}
