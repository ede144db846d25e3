//! UtilityVm - handle to a running utility VM and its VSMB shares.

use crate::channel::{ManagementChannel, ModifyRequest, RequestType};
use crate::config::UtilityVmConfig;
use crate::error::{Result, VmError};
use crate::options::VirtualSmbShareOptions;
use crate::registry::{clean_path, Granularity, ShareKey, ShareRegistry};
use crate::share::VsmbShare;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared state behind a [`UtilityVm`] handle.
pub(crate) struct VmInner {
    config: UtilityVmConfig,
    channel: Arc<dyn ManagementChannel>,
    /// Guards both share tables and the name counter. Held across
    /// management requests so that share operations on one VM are serialized.
    shares: Mutex<ShareRegistry>,
}

/// Handle to a utility VM.
///
/// Cloning the handle is cheap; all clones refer to the same VM and share
/// tables. Shares handed out by the VM keep only a weak reference back to it.
#[derive(Clone)]
pub struct UtilityVm {
    inner: Arc<VmInner>,
}

impl std::fmt::Debug for UtilityVm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UtilityVm")
            .field("id", &self.inner.config.id)
            .field("operating_system", &self.inner.config.operating_system)
            .finish()
    }
}

/// A host path after probing: which table it routes to and the canonical
/// directory that keys it.
#[derive(Debug, Clone)]
struct ResolvedPath {
    granularity: Granularity,
    dir: PathBuf,
    /// The requested file, for single-file requests
    file: Option<PathBuf>,
}

/// Probe `host_path` and decide between directory and single-file mapping.
async fn resolve_host_path(host_path: &Path) -> Result<ResolvedPath> {
    if host_path.as_os_str().is_empty() {
        return Err(VmError::NotFound("no host path supplied".into()));
    }

    let metadata = tokio::fs::metadata(host_path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            VmError::NotFound(host_path.display().to_string())
        } else {
            VmError::Probe {
                path: host_path.to_path_buf(),
                source: e,
            }
        }
    })?;

    if metadata.is_dir() {
        return Ok(ResolvedPath {
            granularity: Granularity::Directory,
            dir: clean_path(host_path),
            file: None,
        });
    }

    let parent = match host_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    Ok(ResolvedPath {
        granularity: Granularity::File,
        dir: clean_path(parent),
        file: Some(clean_path(host_path)),
    })
}

impl UtilityVm {
    /// Create a handle for a VM reachable through `channel`.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(config: UtilityVmConfig, channel: Arc<dyn ManagementChannel>) -> Result<Self> {
        config.validate()?;
        tracing::info!(
            vm_id = %config.id,
            os = %config.operating_system,
            "Attached to utility VM"
        );
        Ok(Self {
            inner: Arc::new(VmInner {
                config,
                channel,
                shares: Mutex::new(ShareRegistry::default()),
            }),
        })
    }

    pub(crate) fn from_inner(inner: Arc<VmInner>) -> Self {
        Self { inner }
    }

    /// Get the VM identifier.
    pub fn id(&self) -> &str {
        &self.inner.config.id
    }

    /// Get the configuration used to create this handle.
    pub fn config(&self) -> &UtilityVmConfig {
        &self.inner.config
    }

    /// Default share options for this VM.
    pub fn default_vsmb_options(&self, read_only: bool) -> VirtualSmbShareOptions {
        VirtualSmbShareOptions::defaults(read_only, self.inner.config.devices_physically_backed)
    }

    fn ensure_vsmb_supported(&self) -> Result<()> {
        let os = self.inner.config.operating_system;
        if !os.supports_vsmb() {
            return Err(VmError::Unsupported(os));
        }
        Ok(())
    }

    fn not_attached(&self, host_path: &Path) -> VmError {
        VmError::NotAttached {
            host_path: host_path.to_path_buf(),
            vm_id: self.inner.config.id.clone(),
        }
    }

    async fn send(&self, request: &ModifyRequest, host_path: &Path) -> Result<()> {
        self.inner.channel.modify(request).await.map_err(|e| {
            tracing::error!(
                vm_id = %self.inner.config.id,
                host_path = %host_path.display(),
                share = %request.settings.name,
                request_type = ?request.request_type,
                error = %e,
                "VSMB modification failed"
            );
            VmError::HypervisorRequestFailed {
                host_path: host_path.to_path_buf(),
                vm_id: self.inner.config.id.clone(),
                source: e,
            }
        })
    }

    /// Share `host_path` with the VM, or take another reference to an
    /// existing share with the same directory and access mode.
    ///
    /// If `host_path` is a file, its directory is shared with access
    /// restricted to the files added so far.
    ///
    /// # Errors
    /// Returns an error if the guest cannot mount VSMB shares, the path cannot
    /// be probed, or the hypervisor rejects the request. On error the share
    /// tables are left untouched.
    pub async fn add_vsmb(
        &self,
        host_path: impl AsRef<Path>,
        mut options: VirtualSmbShareOptions,
    ) -> Result<VsmbShare> {
        let host_path = host_path.as_ref();
        self.ensure_vsmb_supported()?;

        let mut registry = self.inner.shares.lock().await;

        let resolved = resolve_host_path(host_path).await?;
        if resolved.granularity == Granularity::File {
            options.restrict_file_access = true;
            options.single_file_mapping = true;
        }

        let key = ShareKey::new(&resolved.dir, options.read_only);
        let existing = registry.table(resolved.granularity).get(&key).cloned();
        let (mut share, request_type) = match existing {
            Some(share) => (share, RequestType::Update),
            None => {
                let name = registry.next_name();
                let share = VsmbShare::new(Arc::downgrade(&self.inner), resolved.dir.clone(), name);
                (share, RequestType::Add)
            }
        };

        let mut allowed_files = share.allowed_files.clone();
        if let Some(file) = &resolved.file {
            if !allowed_files.contains(file) {
                allowed_files.push(file.clone());
            }
        }

        // Update only supports changing the allowed-file list and fails on
        // unrestricted shares.
        if request_type == RequestType::Add || options.restrict_file_access {
            let request = ModifyRequest::share(
                request_type,
                &share.name,
                resolved.dir.clone(),
                options,
                allowed_files.clone(),
            );
            self.send(&request, &resolved.dir).await?;
        }

        if share.ref_count == 0 {
            // New entry, or one left behind by a failed teardown
            share.incarnation = registry.next_incarnation();
        }
        share.allowed_files = allowed_files;
        share.ref_count += 1;
        share.options = options;
        registry
            .table_mut(resolved.granularity)
            .insert(key, share.clone());

        if request_type == RequestType::Add {
            tracing::info!(
                vm_id = %self.inner.config.id,
                host_path = %share.host_path.display(),
                share = %share.name,
                read_only = options.read_only,
                "Added VSMB share"
            );
        } else {
            tracing::debug!(
                vm_id = %self.inner.config.id,
                share = %share.name,
                ref_count = share.ref_count,
                "Reused VSMB share"
            );
        }

        Ok(share)
    }

    /// Drop one reference to the share for `host_path`, tearing it down in
    /// the VM when the last reference goes.
    ///
    /// # Errors
    /// Returns [`VmError::NotAttached`] if no such share exists. If the
    /// hypervisor rejects the teardown the entry stays registered with a ref
    /// count of zero and a later call retries the teardown.
    pub async fn remove_vsmb(&self, host_path: impl AsRef<Path>, read_only: bool) -> Result<()> {
        let host_path = host_path.as_ref();
        self.ensure_vsmb_supported()?;

        let mut registry = self.inner.shares.lock().await;
        let resolved = resolve_host_path(host_path).await?;
        self.remove_locked(
            &mut registry,
            resolved.granularity,
            &resolved.dir,
            read_only,
            None,
        )
        .await
    }

    /// Drop the reference held by a share handle from `incarnation`,
    /// without probing the host.
    ///
    /// A handle whose entry was revived by a later add after a failed
    /// teardown already gave up its reference, so nothing is released.
    pub(crate) async fn release_share(
        &self,
        granularity: Granularity,
        dir: &Path,
        read_only: bool,
        incarnation: u64,
    ) -> Result<()> {
        self.ensure_vsmb_supported()?;
        let mut registry = self.inner.shares.lock().await;
        self.remove_locked(
            &mut registry,
            granularity,
            dir,
            read_only,
            Some(incarnation),
        )
        .await
    }

    /// An entry at ref count zero is pending teardown: its last Remove
    /// failed. Removing it again resends the Remove without decrementing.
    async fn remove_locked(
        &self,
        registry: &mut ShareRegistry,
        granularity: Granularity,
        dir: &Path,
        read_only: bool,
        holder: Option<u64>,
    ) -> Result<()> {
        let key = ShareKey::new(dir, read_only);
        let table = registry.table_mut(granularity);
        let share = table
            .get_mut(&key)
            .ok_or_else(|| self.not_attached(dir))?;

        if holder.is_some_and(|incarnation| incarnation != share.incarnation) {
            tracing::debug!(
                vm_id = %self.inner.config.id,
                share = %share.name,
                ref_count = share.ref_count,
                "Reference was already dropped before the share was reused"
            );
            return Ok(());
        }

        if share.ref_count > 0 {
            share.ref_count -= 1;
            if share.ref_count > 0 {
                tracing::debug!(
                    vm_id = %self.inner.config.id,
                    share = %share.name,
                    ref_count = share.ref_count,
                    "Released VSMB share reference"
                );
                return Ok(());
            }
        } else {
            tracing::warn!(
                vm_id = %self.inner.config.id,
                share = %share.name,
                "Retrying teardown of VSMB share left by a failed removal"
            );
        }

        let name = share.name.clone();
        self.send(&ModifyRequest::remove(&name), dir).await?;
        table.remove(&key);

        tracing::info!(
            vm_id = %self.inner.config.id,
            host_path = %dir.display(),
            share = %name,
            "Removed VSMB share"
        );
        Ok(())
    }

    /// Guest path under which `host_path` is visible, including the file
    /// name for single-file shares.
    ///
    /// # Errors
    /// Returns [`VmError::NotFound`] for an empty or missing path and
    /// [`VmError::NotAttached`] if the path was never shared.
    pub async fn get_vsmb_guest_path(
        &self,
        host_path: impl AsRef<Path>,
        read_only: bool,
    ) -> Result<String> {
        let host_path = host_path.as_ref();
        if host_path.as_os_str().is_empty() {
            return Err(VmError::NotFound("no host path supplied".into()));
        }

        let registry = self.inner.shares.lock().await;
        let resolved = resolve_host_path(host_path).await?;

        let key = ShareKey::new(&resolved.dir, read_only);
        let share = registry
            .table(resolved.granularity)
            .get(&key)
            .ok_or_else(|| self.not_attached(&resolved.dir))?;

        let file_name = resolved.file.as_deref().and_then(Path::file_name);
        Ok(match file_name {
            Some(f) => format!("{}\\{}", share.guest_path, f.to_string_lossy()),
            None => share.guest_path.clone(),
        })
    }

    /// Snapshot of every registered share, in no particular order.
    pub async fn shares(&self) -> Vec<VsmbShare> {
        self.inner.shares.lock().await.all().cloned().collect()
    }

    /// Register a share decoded from a saved VM state.
    ///
    /// The share is bound to this VM with `ref_count` holders and placed in
    /// the file or directory table according to its single-file flag. No
    /// management request is sent; the share must already exist in the VM.
    ///
    /// # Errors
    /// Returns [`VmError::AlreadyAttached`] if a share with the same key is
    /// already registered, and [`VmError::NameInUse`] if the share's name was
    /// already used on this VM.
    pub async fn restore_share(&self, share: VsmbShare, ref_count: NonZeroU32) -> Result<VsmbShare> {
        let granularity = Granularity::of(&share);
        let key = ShareKey::new(&share.host_path, share.options.read_only);
        self.insert_bound(granularity, key, share, ref_count).await
    }

    /// Bind `share` to this VM and insert it, taking over its name.
    pub(crate) async fn insert_bound(
        &self,
        granularity: Granularity,
        key: ShareKey,
        mut share: VsmbShare,
        ref_count: NonZeroU32,
    ) -> Result<VsmbShare> {
        let mut registry = self.inner.shares.lock().await;
        if registry.table(granularity).contains_key(&key) {
            return Err(VmError::AlreadyAttached {
                host_path: share.host_path,
                vm_id: self.inner.config.id.clone(),
            });
        }

        if !registry.reserve_name(&share.name) {
            return Err(VmError::NameInUse {
                name: share.name,
                vm_id: self.inner.config.id.clone(),
            });
        }
        share.vm = Arc::downgrade(&self.inner);
        share.ref_count = ref_count.get();
        share.incarnation = registry.next_incarnation();
        registry.table_mut(granularity).insert(key, share.clone());

        tracing::debug!(
            vm_id = %self.inner.config.id,
            share = %share.name,
            ref_count = share.ref_count,
            "Registered VSMB share"
        );
        Ok(share)
    }
}
