//! Cloning shares into a VM that is being provisioned from a template.

use crate::channel::VirtualSmbShare;
use crate::error::Result;
use crate::registry::{Granularity, ShareKey};
use crate::share::VsmbShare;
use crate::vm::UtilityVm;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;

/// Configuration document of a VM that has not been started yet.
///
/// Only the parts needed to carry VSMB shares are modelled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProvisioningDocument {
    pub virtual_machine: VirtualMachineDocument,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VirtualMachineDocument {
    pub devices: Devices,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Devices {
    pub virtual_smb: VirtualSmb,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VirtualSmb {
    pub shares: Vec<VirtualSmbShare>,
}

impl ProvisioningDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shares the VM will be started with.
    pub fn vsmb_shares(&self) -> &[VirtualSmbShare] {
        &self.virtual_machine.devices.virtual_smb.shares
    }
}

/// A VM resource that can be duplicated into a template-provisioned VM.
#[async_trait]
pub trait Cloneable {
    type Output;

    /// Add this resource to `doc` and register its counterpart on `target`.
    async fn clone_to(
        &self,
        target: &UtilityVm,
        doc: &mut ProvisioningDocument,
    ) -> Result<Self::Output>;
}

#[async_trait]
impl Cloneable for VsmbShare {
    type Output = VsmbShare;

    /// The clone starts with a single reference on `target`. No management
    /// request is sent; the share comes up when `target` boots from `doc`.
    ///
    /// Single-file shares land in the target's file table, all others in
    /// its directory table. The clone keeps the source's name, so it fails
    /// with [`VmError::NameInUse`](crate::VmError::NameInUse) if `target`
    /// ever used that name, leaving `doc` unchanged.
    async fn clone_to(
        &self,
        target: &UtilityVm,
        doc: &mut ProvisioningDocument,
    ) -> Result<VsmbShare> {
        let key = ShareKey::new(&self.host_path, self.options.read_only);
        let clone = VsmbShare {
            host_path: self.host_path.clone(),
            name: self.name.clone(),
            guest_path: self.guest_path.clone(),
            allowed_files: self.allowed_files.clone(),
            options: self.options,
            ref_count: 0,
            incarnation: 0,
            vm: std::sync::Weak::new(),
        };
        let clone = target
            .insert_bound(Granularity::of(self), key, clone, NonZeroU32::MIN)
            .await?;

        doc.virtual_machine
            .devices
            .virtual_smb
            .shares
            .push(VirtualSmbShare {
                name: self.name.clone(),
                path: Some(self.host_path.clone()),
                options: Some(self.options),
                allowed_files: self.allowed_files.clone(),
            });

        tracing::debug!(
            vm_id = %target.id(),
            share = %self.name,
            "Cloned VSMB share into provisioning document"
        );
        Ok(clone)
    }
}
