//! Per-VM share tables and the key used to de-duplicate shares.

use crate::share::VsmbShare;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// De-duplication key for a share: canonical host directory plus access mode.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShareKey(String);

impl ShareKey {
    /// Derive the key for `host_dir` (already cleaned) and `read_only`.
    pub fn new(host_dir: &Path, read_only: bool) -> Self {
        Self(format!("{}-{}", host_dir.to_string_lossy(), read_only))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShareKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lexically normalise a path: drop `.` components, fold `..` into the
/// preceding component and strip trailing separators. The filesystem is not
/// consulted.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                // `..` above the root is the root
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Which table a share lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Granularity {
    /// Whole directory mapped without restriction
    Directory,
    /// Directory mapped to expose an allow-list of single files
    File,
}

impl Granularity {
    pub(crate) fn of(share: &VsmbShare) -> Self {
        if share.options().single_file_mapping {
            Self::File
        } else {
            Self::Directory
        }
    }
}

/// Directory and file share tables of one VM, plus its share-name counter.
///
/// Only ever accessed with the owning VM's lock held.
#[derive(Debug, Default)]
pub(crate) struct ShareRegistry {
    dir_shares: HashMap<ShareKey, VsmbShare>,
    file_shares: HashMap<ShareKey, VsmbShare>,
    counter: u64,
    /// Every name this VM has handed out or taken over, live or not
    issued: HashSet<String>,
    incarnations: u64,
}

impl ShareRegistry {
    pub(crate) fn table(&self, granularity: Granularity) -> &HashMap<ShareKey, VsmbShare> {
        match granularity {
            Granularity::Directory => &self.dir_shares,
            Granularity::File => &self.file_shares,
        }
    }

    pub(crate) fn table_mut(
        &mut self,
        granularity: Granularity,
    ) -> &mut HashMap<ShareKey, VsmbShare> {
        match granularity {
            Granularity::Directory => &mut self.dir_shares,
            Granularity::File => &mut self.file_shares,
        }
    }

    /// Allocate the next share name. Names are never reused.
    pub(crate) fn next_name(&mut self) -> String {
        loop {
            self.counter += 1;
            let name = format!("s{:x}", self.counter);
            if self.issued.insert(name.clone()) {
                return name;
            }
        }
    }

    /// Take over a name allocated elsewhere. Returns `false`, leaving the
    /// registry untouched, if the name was already used on this VM.
    ///
    /// The counter advances by one, and past `name` if it was produced by
    /// [`next_name`](Self::next_name).
    pub(crate) fn reserve_name(&mut self, name: &str) -> bool {
        if !self.issued.insert(name.to_owned()) {
            return false;
        }
        self.counter += 1;
        if let Some(n) = name
            .strip_prefix('s')
            .and_then(|hex| u64::from_str_radix(hex, 16).ok())
        {
            self.counter = self.counter.max(n);
        }
        true
    }

    /// Identifier for an entry that is created, or revived after a failed
    /// teardown. Holders from an earlier incarnation no longer count.
    pub(crate) fn next_incarnation(&mut self) -> u64 {
        self.incarnations += 1;
        self.incarnations
    }

    pub(crate) fn all(&self) -> impl Iterator<Item = &VsmbShare> {
        self.dir_shares.values().chain(self.file_shares.values())
    }
}
