//! VSMB share mapping options and the default-options policy.

use serde::{Deserialize, Serialize};

/// Mapping-mode flags for a VSMB share, as understood by the hypervisor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VirtualSmbShareOptions {
    pub read_only: bool,
    pub share_read: bool,
    pub cache_io: bool,
    pub no_oplocks: bool,
    pub take_backup_privilege: bool,
    pub use_share_root_identity: bool,
    /// Suppress direct memory mapping of file contents into the guest
    pub no_directmap: bool,
    /// Share exists to expose individual files of a directory
    pub single_file_mapping: bool,
    /// Only files in the allowed-file list are visible
    pub restrict_file_access: bool,
    #[serde(rename = "ForceLevelIIOplocks")]
    pub force_level_ii_oplocks: bool,
    pub reparse_base_layer: bool,
    pub pseudo_oplocks: bool,
    pub non_cache_io: bool,
    pub pseudo_dirnotify: bool,
}

impl VirtualSmbShareOptions {
    /// Default options for a share.
    ///
    /// Direct mapping is suppressed whenever the VM's devices are physically
    /// backed. Read-only shares additionally get shared reads, cached I/O and
    /// pseudo-oplocks.
    pub fn defaults(read_only: bool, devices_physically_backed: bool) -> Self {
        let mut opts = Self {
            no_directmap: devices_physically_backed,
            ..Default::default()
        };
        if read_only {
            opts.share_read = true;
            opts.cache_io = true;
            opts.read_only = true;
            opts.pseudo_oplocks = true;
        }
        opts
    }

    /// Pack the flags into a bit set. Bit positions are part of the saved
    /// share format and must never be reordered.
    pub(crate) fn to_bits(self) -> u16 {
        let flags = [
            self.read_only,
            self.share_read,
            self.cache_io,
            self.no_oplocks,
            self.take_backup_privilege,
            self.use_share_root_identity,
            self.no_directmap,
            self.single_file_mapping,
            self.restrict_file_access,
            self.force_level_ii_oplocks,
            self.reparse_base_layer,
            self.pseudo_oplocks,
            self.non_cache_io,
            self.pseudo_dirnotify,
        ];
        flags
            .iter()
            .enumerate()
            .fold(0u16, |bits, (i, &set)| bits | (u16::from(set) << i))
    }

    /// Inverse of [`to_bits`](Self::to_bits). Returns `None` if unknown bits are set.
    pub(crate) fn from_bits(bits: u16) -> Option<Self> {
        if bits >> Self::FLAG_COUNT != 0 {
            return None;
        }
        let bit = |i: u32| bits & (1 << i) != 0;
        Some(Self {
            read_only: bit(0),
            share_read: bit(1),
            cache_io: bit(2),
            no_oplocks: bit(3),
            take_backup_privilege: bit(4),
            use_share_root_identity: bit(5),
            no_directmap: bit(6),
            single_file_mapping: bit(7),
            restrict_file_access: bit(8),
            force_level_ii_oplocks: bit(9),
            reparse_base_layer: bit(10),
            pseudo_oplocks: bit(11),
            non_cache_io: bit(12),
            pseudo_dirnotify: bit(13),
        })
    }

    const FLAG_COUNT: u32 = 14;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_read_write() {
        let opts = VirtualSmbShareOptions::defaults(false, false);
        assert_eq!(opts, VirtualSmbShareOptions::default());
    }

    #[test]
    fn test_defaults_read_only() {
        let opts = VirtualSmbShareOptions::defaults(true, false);
        assert!(opts.read_only);
        assert!(opts.share_read);
        assert!(opts.cache_io);
        assert!(opts.pseudo_oplocks);
        assert!(!opts.no_directmap);
        assert!(!opts.restrict_file_access);
    }

    #[test]
    fn test_defaults_physically_backed() {
        assert!(VirtualSmbShareOptions::defaults(false, true).no_directmap);
        assert!(VirtualSmbShareOptions::defaults(true, true).no_directmap);
    }

    #[test]
    fn test_bits_reject_unknown() {
        assert!(VirtualSmbShareOptions::from_bits(1 << 14).is_none());
        assert!(VirtualSmbShareOptions::from_bits(u16::MAX).is_none());
    }

    #[test]
    fn test_bits_positions() {
        let opts = VirtualSmbShareOptions {
            read_only: true,
            pseudo_dirnotify: true,
            ..Default::default()
        };
        assert_eq!(opts.to_bits(), 0b10_0000_0000_0001);
        assert_eq!(VirtualSmbShareOptions::from_bits(opts.to_bits()), Some(opts));
    }

    #[test]
    fn test_serialize_pascal_case() {
        let opts = VirtualSmbShareOptions {
            no_directmap: true,
            force_level_ii_oplocks: true,
            ..Default::default()
        };
        let json = serde_json::to_string(&opts).unwrap();
        assert!(json.contains("\"NoDirectmap\":true"));
        assert!(json.contains("\"ForceLevelIIOplocks\":true"));
        assert!(json.contains("\"ReadOnly\":false"));
    }
}
