//! Byte encoding of a VsmbShare for save/restore.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! u8   format version (1)
//! str  host path
//! str  name
//! u32  allowed file count, followed by that many str
//! str  guest path
//! u16  option bits
//! ```
//!
//! where `str` is a u32 byte length followed by UTF-8. The ref count and the
//! owning VM are not part of the record; a decoded share has a ref count of
//! zero and no VM until [`UtilityVm::restore_share`](crate::UtilityVm::restore_share)
//! binds it.

use crate::error::{Result, VmError};
use crate::options::VirtualSmbShareOptions;
use crate::share::VsmbShare;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::path::{Path, PathBuf};
use std::sync::Weak;

const FORMAT_VERSION: u8 = 1;

impl VsmbShare {
    /// Encode the persistent fields of this share.
    ///
    /// # Errors
    /// Returns [`VmError::Serialization`] if a path is not valid UTF-8 or a
    /// field exceeds the format's length limits.
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        buf.put_u8(FORMAT_VERSION);
        put_path(&mut buf, "host_path", &self.host_path)?;
        put_str(&mut buf, "name", &self.name)?;
        put_len(&mut buf, "allowed_files", self.allowed_files.len())?;
        for file in &self.allowed_files {
            put_path(&mut buf, "allowed_files", file)?;
        }
        put_str(&mut buf, "guest_path", &self.guest_path)?;
        buf.put_u16_le(self.options.to_bits());
        Ok(buf.freeze())
    }

    /// Decode a share produced by [`encode`](Self::encode).
    ///
    /// # Errors
    /// Returns [`VmError::Deserialization`] naming the first field that is
    /// truncated or malformed, or `trailing` if bytes remain afterwards.
    pub fn decode(mut data: &[u8]) -> Result<Self> {
        let version = get_u8(&mut data, "version")?;
        if version != FORMAT_VERSION {
            return Err(decode_error(
                "version",
                format!("unsupported format version {version}"),
            ));
        }

        let host_path = PathBuf::from(get_str(&mut data, "host_path")?);
        let name = get_str(&mut data, "name")?;

        let count = get_u32(&mut data, "allowed_files")? as usize;
        // Every entry needs at least its length prefix
        if count > data.remaining() / 4 {
            return Err(decode_error(
                "allowed_files",
                format!("count {count} exceeds remaining input"),
            ));
        }
        let mut allowed_files = Vec::with_capacity(count);
        for _ in 0..count {
            allowed_files.push(PathBuf::from(get_str(&mut data, "allowed_files")?));
        }

        let guest_path = get_str(&mut data, "guest_path")?;

        let bits = get_u16(&mut data, "options")?;
        let options = VirtualSmbShareOptions::from_bits(bits)
            .ok_or_else(|| decode_error("options", format!("unknown option bits {bits:#06x}")))?;

        if data.has_remaining() {
            return Err(decode_error(
                "trailing",
                format!("{} unexpected bytes after record", data.remaining()),
            ));
        }

        Ok(Self {
            host_path,
            name,
            guest_path,
            allowed_files,
            options,
            ref_count: 0,
            incarnation: 0,
            vm: Weak::new(),
        })
    }
}

fn encode_error(field: &'static str, reason: impl Into<String>) -> VmError {
    VmError::Serialization {
        field,
        reason: reason.into(),
    }
}

fn decode_error(field: &'static str, reason: impl Into<String>) -> VmError {
    VmError::Deserialization {
        field,
        reason: reason.into(),
    }
}

fn put_len(buf: &mut BytesMut, field: &'static str, len: usize) -> Result<()> {
    let len = u32::try_from(len).map_err(|_| encode_error(field, "length exceeds u32"))?;
    buf.put_u32_le(len);
    Ok(())
}

fn put_str(buf: &mut BytesMut, field: &'static str, value: &str) -> Result<()> {
    put_len(buf, field, value.len())?;
    buf.put_slice(value.as_bytes());
    Ok(())
}

fn put_path(buf: &mut BytesMut, field: &'static str, path: &Path) -> Result<()> {
    let value = path
        .to_str()
        .ok_or_else(|| encode_error(field, format!("{} is not valid UTF-8", path.display())))?;
    put_str(buf, field, value)
}

fn ensure(data: &[u8], field: &'static str, needed: usize) -> Result<()> {
    if data.remaining() < needed {
        return Err(decode_error(
            field,
            format!("need {needed} bytes, {} remaining", data.remaining()),
        ));
    }
    Ok(())
}

fn get_u8(data: &mut &[u8], field: &'static str) -> Result<u8> {
    ensure(data, field, 1)?;
    Ok(data.get_u8())
}

fn get_u16(data: &mut &[u8], field: &'static str) -> Result<u16> {
    ensure(data, field, 2)?;
    Ok(data.get_u16_le())
}

fn get_u32(data: &mut &[u8], field: &'static str) -> Result<u32> {
    ensure(data, field, 4)?;
    Ok(data.get_u32_le())
}

fn get_str(data: &mut &[u8], field: &'static str) -> Result<String> {
    let len = get_u32(data, field)? as usize;
    ensure(data, field, len)?;
    let input: &[u8] = *data;
    let (head, rest) = input.split_at(len);
    let value = String::from_utf8(head.to_vec())
        .map_err(|e| decode_error(field, format!("invalid UTF-8: {e}")))?;
    *data = rest;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> VsmbShare {
        let mut share = VsmbShare::new(Weak::new(), PathBuf::from("/data"), "s1f".into());
        share.allowed_files = vec![PathBuf::from("/data/a.txt"), PathBuf::from("/data/b.txt")];
        share.options = VirtualSmbShareOptions {
            read_only: true,
            restrict_file_access: true,
            single_file_mapping: true,
            ..Default::default()
        };
        share.ref_count = 7;
        share
    }

    #[test]
    fn test_round_trip_preserves_persistent_fields() {
        let share = sample();
        let decoded = VsmbShare::decode(&share.encode().unwrap()).unwrap();

        assert_eq!(decoded.host_path(), share.host_path());
        assert_eq!(decoded.name(), "s1f");
        assert_eq!(decoded.allowed_files(), share.allowed_files());
        assert_eq!(decoded.guest_path(), share.guest_path());
        assert_eq!(decoded.options(), share.options());
        assert_eq!(decoded.ref_count(), 0);
        assert!(decoded.vm.upgrade().is_none());
    }

    #[test]
    fn test_field_order_is_fixed() {
        let share = VsmbShare::new(Weak::new(), PathBuf::from("/d"), "s1".into());
        let bytes = share.encode().unwrap();

        let mut expected = vec![FORMAT_VERSION];
        expected.extend_from_slice(&2u32.to_le_bytes());
        expected.extend_from_slice(b"/d");
        expected.extend_from_slice(&2u32.to_le_bytes());
        expected.extend_from_slice(b"s1");
        expected.extend_from_slice(&0u32.to_le_bytes());
        expected.extend_from_slice(&(share.guest_path().len() as u32).to_le_bytes());
        expected.extend_from_slice(share.guest_path().as_bytes());
        expected.extend_from_slice(&0u16.to_le_bytes());
        assert_eq!(&bytes[..], &expected[..]);
    }

    #[test]
    fn test_truncated_input_names_field() {
        let bytes = sample().encode().unwrap();
        let err = VsmbShare::decode(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(
            err,
            VmError::Deserialization {
                field: "options",
                ..
            }
        ));

        let err = VsmbShare::decode(&bytes[..3]).unwrap_err();
        assert!(matches!(
            err,
            VmError::Deserialization {
                field: "host_path",
                ..
            }
        ));

        assert!(VsmbShare::decode(&[]).is_err());
    }

    #[test]
    fn test_rejects_unknown_version() {
        let mut bytes = sample().encode().unwrap().to_vec();
        bytes[0] = 9;
        let err = VsmbShare::decode(&bytes).unwrap_err();
        assert!(matches!(
            err,
            VmError::Deserialization {
                field: "version",
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_trailing_bytes() {
        let mut bytes = sample().encode().unwrap().to_vec();
        bytes.push(0);
        let err = VsmbShare::decode(&bytes).unwrap_err();
        assert!(matches!(
            err,
            VmError::Deserialization {
                field: "trailing",
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_huge_allowed_file_count() {
        let mut bytes = vec![FORMAT_VERSION];
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        let err = VsmbShare::decode(&bytes).unwrap_err();
        assert!(matches!(
            err,
            VmError::Deserialization {
                field: "allowed_files",
                ..
            }
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_path_fails_to_encode() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let path = PathBuf::from(OsStr::from_bytes(b"/data/\xff"));
        let share = VsmbShare::new(Weak::new(), path, "s1".into());
        let err = share.encode().unwrap_err();
        assert!(matches!(
            err,
            VmError::Serialization {
                field: "host_path",
                ..
            }
        ));
    }
}
