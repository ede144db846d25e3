//! Mounting host paths into a container's utility VM.

use crate::activity::run_activity;
use crate::error::{CoreError, Result};
use crate::resources::{Resource, Resources};
use hostshare_vm::UtilityVm;
use std::path::Path;

/// Share `host_path` with `vm` using the VM's default options and return the
/// guest path a container should use for it.
///
/// The share reference is recorded on `resources` and dropped when they are
/// released.
pub async fn mount_host_path(
    vm: &UtilityVm,
    resources: &mut Resources,
    host_path: impl AsRef<Path>,
    read_only: bool,
) -> Result<String> {
    let host_path = host_path.as_ref();
    let container_id = resources.container_id().to_string();

    run_activity("MountHostPath", &container_id, async {
        let options = vm.default_vsmb_options(read_only);
        let share = vm.add_vsmb(host_path, options).await?;

        let guest_path = match vm.get_vsmb_guest_path(host_path, read_only).await {
            Ok(guest_path) => guest_path,
            Err(e) => {
                if let Err(release_err) = share.release().await {
                    tracing::warn!(
                        share = %share.name(),
                        error = %release_err,
                        "Failed to release share after lookup failure"
                    );
                }
                return Err(e.into());
            }
        };

        tracing::debug!(
            container_id = %container_id,
            host_path = %host_path.display(),
            guest_path = %guest_path,
            "Mounted host path"
        );
        resources.add(Resource::VsmbShare(share));
        Ok::<_, CoreError>(guest_path)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostshare_vm::{OperatingSystem, RecordingChannel, UtilityVmBuilder, VmError};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_mount_directory_and_file() {
        let vm = UtilityVmBuilder::new()
            .channel(Arc::new(RecordingChannel::new()))
            .build()
            .unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("config.json");
        std::fs::write(&file, "{}").unwrap();

        let mut resources = Resources::new("c1");
        let dir_guest = mount_host_path(&vm, &mut resources, tmp.path(), true)
            .await
            .unwrap();
        let file_guest = mount_host_path(&vm, &mut resources, &file, true)
            .await
            .unwrap();

        assert!(dir_guest.ends_with(r"\s1"));
        assert!(file_guest.ends_with(r"\s2\config.json"));
        assert_eq!(resources.resources().len(), 2);

        let shares = vm.shares().await;
        assert!(shares.iter().all(|s| s.options().read_only));
    }

    #[tokio::test]
    async fn test_mount_unsupported_guest_records_nothing() {
        let vm = UtilityVmBuilder::new()
            .operating_system(OperatingSystem::Linux)
            .channel(Arc::new(RecordingChannel::new()))
            .build()
            .unwrap();
        let tmp = tempfile::tempdir().unwrap();

        let mut resources = Resources::new("c2");
        let err = mount_host_path(&vm, &mut resources, tmp.path(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Vm(VmError::Unsupported(_))));
        assert!(resources.resources().is_empty());
    }
}
