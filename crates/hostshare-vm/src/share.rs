//! VsmbShare - one host directory mapped into a utility VM.

use crate::error::{Result, VmError};
use crate::options::VirtualSmbShareOptions;
use crate::registry::Granularity;
use crate::vm::{UtilityVm, VmInner};
use std::path::{Path, PathBuf};
use std::sync::Weak;

/// Prefix of every guest-visible VSMB share path.
pub const VSMB_SHARE_PREFIX: &str = r"\\?\VMSMB\VSMB-{dcc079ae-60ba-4d07-847c-3493609c0870}\";

/// An active VSMB mapping from a host directory to a guest path.
///
/// Values handed out by [`UtilityVm`] are snapshots taken when the call
/// returned; the live entry is owned by the VM's registry.
#[derive(Debug, Clone)]
pub struct VsmbShare {
    pub(crate) host_path: PathBuf,
    pub(crate) name: String,
    pub(crate) guest_path: String,
    pub(crate) allowed_files: Vec<PathBuf>,
    pub(crate) options: VirtualSmbShareOptions,
    pub(crate) ref_count: u32,
    /// Registry incarnation this holder's reference belongs to
    pub(crate) incarnation: u64,
    /// Owning VM, used only to route [`release`](Self::release)
    pub(crate) vm: Weak<VmInner>,
}

impl VsmbShare {
    pub(crate) fn new(vm: Weak<VmInner>, host_path: PathBuf, name: String) -> Self {
        let guest_path = format!("{VSMB_SHARE_PREFIX}{name}");
        Self {
            host_path,
            name,
            guest_path,
            allowed_files: Vec::new(),
            options: VirtualSmbShareOptions::default(),
            ref_count: 0,
            incarnation: 0,
            vm,
        }
    }

    /// Canonical host directory backing this share.
    pub fn host_path(&self) -> &Path {
        &self.host_path
    }

    /// Share name, unique within the owning VM.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path under which the guest sees this share.
    pub fn guest_path(&self) -> &str {
        &self.guest_path
    }

    /// Files the guest may access when access is restricted.
    pub fn allowed_files(&self) -> &[PathBuf] {
        &self.allowed_files
    }

    pub fn options(&self) -> &VirtualSmbShareOptions {
        &self.options
    }

    /// Number of holders at the time this snapshot was taken.
    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    /// Drop one reference to this share on its owning VM.
    ///
    /// After a failed teardown this can be called again to retry it. If
    /// another holder reused the share in the meantime, the retry does
    /// nothing.
    ///
    /// # Errors
    /// Returns [`VmError::VmUnavailable`] if the VM has been dropped, or any
    /// error from the underlying removal.
    pub async fn release(&self) -> Result<()> {
        let vm = self
            .vm
            .upgrade()
            .map(UtilityVm::from_inner)
            .ok_or_else(|| VmError::VmUnavailable(self.name.clone()))?;

        vm.release_share(
            Granularity::of(self),
            &self.host_path,
            self.options.read_only,
            self.incarnation,
        )
        .await
    }
}
