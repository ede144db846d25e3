//! Hypervisor management channel used to modify shares on a running VM.

use crate::error::ChannelError;
use crate::options::VirtualSmbShareOptions;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Resource path addressing the VSMB share collection of a VM.
pub const VSMB_SHARE_RESOURCE_PATH: &str = "VirtualMachine/Devices/VirtualSmb/Shares";

/// Kind of modification requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    Add,
    Update,
    Remove,
}

/// Share definition as sent to the hypervisor and stored in provisioning
/// documents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VirtualSmbShare {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<VirtualSmbShareOptions>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_files: Vec<PathBuf>,
}

/// A modification request for the hypervisor management API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModifyRequest {
    pub request_type: RequestType,
    pub resource_path: String,
    pub settings: VirtualSmbShare,
}

impl ModifyRequest {
    /// Request to create or update a share.
    pub fn share(
        request_type: RequestType,
        name: &str,
        path: PathBuf,
        options: VirtualSmbShareOptions,
        allowed_files: Vec<PathBuf>,
    ) -> Self {
        Self {
            request_type,
            resource_path: VSMB_SHARE_RESOURCE_PATH.to_string(),
            settings: VirtualSmbShare {
                name: name.to_string(),
                path: Some(path),
                options: Some(options),
                allowed_files,
            },
        }
    }

    /// Request to tear down a share. Only the name is sent.
    pub fn remove(name: &str) -> Self {
        Self {
            request_type: RequestType::Remove,
            resource_path: VSMB_SHARE_RESOURCE_PATH.to_string(),
            settings: VirtualSmbShare {
                name: name.to_string(),
                ..Default::default()
            },
        }
    }
}

/// Request/response channel to the hypervisor managing a VM.
#[async_trait]
pub trait ManagementChannel: Send + Sync {
    /// Apply a modification to the running VM.
    async fn modify(&self, request: &ModifyRequest) -> Result<(), ChannelError>;
}

/// Channel that keeps every request in memory instead of sending it.
///
/// Can be switched into a failing mode, in which requests are still recorded
/// but answered with [`ChannelError::Rejected`].
#[derive(Debug, Default)]
pub struct RecordingChannel {
    requests: Mutex<Vec<ModifyRequest>>,
    fail: AtomicBool,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent requests fail (or succeed again).
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// All requests received so far, oldest first.
    pub fn requests(&self) -> Vec<ModifyRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait]
impl ManagementChannel for RecordingChannel {
    async fn modify(&self, request: &ModifyRequest) -> Result<(), ChannelError> {
        match self.requests.lock() {
            Ok(mut r) => r.push(request.clone()),
            Err(poisoned) => poisoned.into_inner().push(request.clone()),
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(ChannelError::Rejected {
                status: 500,
                body: "injected failure".into(),
            });
        }
        Ok(())
    }
}
