//! The metadata walker (`spec.md` §4.6, component C6): expands a list of
//! `(file_id, path_spec)` pairs into a stream of `file` commands describing
//! every regular file, directory, and symlink reachable from those specs,
//! deduplicating hard links and resolving in-tree symlink targets.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use protocol::{Action, FileTransferCommand, FileType};

use crate::error::TransmissionError;

/// One item produced by [`walk_file_specs`]: either a `file` command ready
/// to forward to the remote, or a per-spec error to surface as a `status`.
pub enum WalkItem {
    /// A filesystem entry's metadata, ready to send as a `file` command.
    Entry(FileTransferCommand),
    /// A spec (or a directory entry read while recursing) that could not be
    /// listed.
    Error(TransmissionError),
}

/// Resolves `spec` against `home`: an absolute spec is used as-is; a
/// relative one is expanded under `home` (mirroring
/// [`crate::DestFile::resolve_path`]'s first step — there is no temp-dir
/// fallback here since a send spec must name something that already
/// exists).
fn expand_spec(spec: &str, home: &Path) -> PathBuf {
    let given = Path::new(spec);
    if given.is_absolute() {
        given.to_path_buf()
    } else {
        home.join(given)
    }
}

#[cfg(unix)]
fn dev_ino(meta: &fs::Metadata) -> (u64, u64) {
    use std::os::unix::fs::MetadataExt;
    (meta.dev(), meta.ino())
}

#[cfg(not(unix))]
fn dev_ino(_meta: &fs::Metadata) -> (u64, u64) {
    // No stable (dev, ino) pair off the standard library on this platform;
    // every entry is its own "inode", so hard-link dedup never triggers.
    static COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
    (0, COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed))
}

#[cfg(unix)]
fn readable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::symlink_metadata(path)
        .map(|m| m.permissions().mode() & 0o444 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn readable(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

fn ftype_of(meta: &fs::Metadata) -> Option<FileType> {
    let ft = meta.file_type();
    if ft.is_symlink() {
        Some(FileType::symlink)
    } else if ft.is_dir() {
        Some(FileType::directory)
    } else if ft.is_file() {
        Some(FileType::regular)
    } else {
        None
    }
}

struct Walker {
    counter: u64,
    // keyed by (dev, ino); first entry is canonical.
    by_inode: HashMap<(u64, u64), Vec<usize>>,
    // parallel to `entries`: the (dev, ino) each entry index was filed under.
    inode_of: Vec<(u64, u64)>,
    entries: Vec<FileTransferCommand>,
    errors: Vec<TransmissionError>,
}

impl Walker {
    fn next_status(&mut self) -> String {
        let id = self.counter;
        self.counter += 1;
        id.to_string()
    }

    fn make_entry(
        &mut self,
        path: &Path,
        spec_id: &str,
        meta: &fs::Metadata,
        parent: &str,
    ) -> Result<usize, TransmissionError> {
        let Some(ftype) = ftype_of(meta) else {
            return Err(TransmissionError::einval("not a valid filetype").with_file_id(spec_id));
        };
        let status = self.next_status();
        #[allow(clippy::cast_possible_wrap)]
        let cmd = FileTransferCommand {
            action: Action::file,
            file_id: spec_id.to_string(),
            mtime: mtime_ns(meta),
            permissions: i64::from(mode_bits(meta)),
            name: path.to_string_lossy().into_owned(),
            status,
            size: meta.len() as i64,
            ftype,
            parent: parent.to_string(),
            ..Default::default()
        };
        let idx = self.entries.len();
        let key = dev_ino(meta);
        self.entries.push(cmd);
        self.inode_of.push(key);
        self.by_inode.entry(key).or_default().push(idx);
        Ok(idx)
    }

    fn add_dir(&mut self, dir_idx: usize, spec_id: &str) {
        let dir_path = PathBuf::from(self.entries[dir_idx].name.clone());
        let parent_status = self.entries[dir_idx].status.clone();
        let Ok(read_dir) = fs::read_dir(&dir_path) else {
            return;
        };
        for entry in read_dir.flatten() {
            let child_path = entry.path();
            let Ok(meta) = fs::symlink_metadata(&child_path) else {
                continue;
            };
            let Ok(child_idx) = self.make_entry(&child_path, spec_id, &meta, &parent_status) else {
                continue;
            };
            if self.entries[child_idx].ftype == FileType::directory {
                self.add_dir(child_idx, spec_id);
            }
        }
    }
}

#[cfg(unix)]
fn mtime_ns(meta: &fs::Metadata) -> i64 {
    use std::os::unix::fs::MetadataExt;
    meta.mtime() * 1_000_000_000 + meta.mtime_nsec()
}

#[cfg(not(unix))]
fn mtime_ns(meta: &fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_nanos() as i64)
}

#[cfg(unix)]
fn mode_bits(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_bits(meta: &fs::Metadata) -> u32 {
    if meta.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

/// Walks `specs` (each a `(file_id, path_spec)` pair, `spec.md` §4.5 phase
/// 1) into the full listing of `file` commands an outbound send transmits
/// as its metadata phase (`spec.md` §4.6).
///
/// Output order: each canonical entry (the first one discovered for a given
/// `(st_dev, st_ino)`) is followed immediately by any hard-link alias
/// entries for the same inode, each rewritten to `ftype=link` with `data`
/// set to the canonical entry's `status`. A symlink whose target resolves
/// (via `realpath`) to a regular file already present in the walk gets its
/// `data` set to that target's `status`; otherwise `data` stays empty and
/// the remote is expected to treat it as a `path:`-style literal outside
/// this set.
#[must_use]
pub fn walk_file_specs(specs: &[(String, String)], home: &Path) -> Vec<WalkItem> {
    let mut walker = Walker {
        counter: 0,
        by_inode: HashMap::new(),
        inode_of: Vec::new(),
        entries: Vec::new(),
        errors: Vec::new(),
    };

    for (spec_id, spec) in specs {
        let path = expand_spec(spec, home);
        let meta = match fs::symlink_metadata(&path) {
            Ok(meta) => meta,
            Err(e) => {
                walker
                    .errors
                    .push(TransmissionError::io(&e).with_file_id(spec_id));
                continue;
            }
        };
        if !readable(&path) {
            walker.errors.push(
                TransmissionError::eperm()
                    .with_message("no permission to read spec")
                    .with_file_id(spec_id),
            );
            continue;
        }
        match walker.make_entry(&path, spec_id, &meta, "") {
            Ok(idx) => {
                if walker.entries[idx].ftype == FileType::directory {
                    walker.add_dir(idx, spec_id);
                }
            }
            Err(e) => walker.errors.push(e),
        }
    }

    resolve_symlinks(&mut walker);

    let mut out = Vec::with_capacity(walker.entries.len() + walker.errors.len());
    for e in walker.errors.drain(..) {
        out.push(WalkItem::Error(e));
    }

    let mut emitted = vec![false; walker.entries.len()];
    for idx in 0..walker.entries.len() {
        if emitted[idx] {
            continue;
        }
        let siblings = walker
            .by_inode
            .get(&walker.inode_of[idx])
            .cloned()
            .unwrap_or_default();
        let canonical_idx = siblings.first().copied().unwrap_or(idx);
        if canonical_idx != idx {
            // Will be emitted when we reach its canonical sibling.
            continue;
        }
        emitted[canonical_idx] = true;
        out.push(WalkItem::Entry(walker.entries[canonical_idx].clone()));

        let canonical_status = walker.entries[canonical_idx].status.clone();
        let canonical_is_regular = walker.entries[canonical_idx].ftype == FileType::regular;
        if canonical_is_regular {
            for &sibling_idx in siblings.iter().skip(1) {
                if emitted[sibling_idx] {
                    continue;
                }
                emitted[sibling_idx] = true;
                if walker.entries[sibling_idx].ftype == FileType::regular {
                    let mut link_entry = walker.entries[sibling_idx].clone();
                    link_entry.ftype = FileType::link;
                    link_entry.data = canonical_status.clone().into_bytes();
                    out.push(WalkItem::Entry(link_entry));
                } else {
                    out.push(WalkItem::Entry(walker.entries[sibling_idx].clone()));
                }
            }
        } else {
            for &sibling_idx in siblings.iter().skip(1) {
                if emitted[sibling_idx] {
                    continue;
                }
                emitted[sibling_idx] = true;
                out.push(WalkItem::Entry(walker.entries[sibling_idx].clone()));
            }
        }
    }

    out
}

fn resolve_symlinks(walker: &mut Walker) {
    let status_by_canon_path: HashMap<PathBuf, String> = walker
        .entries
        .iter()
        .filter(|e| e.ftype != FileType::symlink)
        .filter_map(|e| {
            fs::canonicalize(&e.name)
                .ok()
                .map(|canon| (canon, e.status.clone()))
        })
        .collect();

    for entry in &mut walker.entries {
        if entry.ftype != FileType::symlink {
            continue;
        }
        if let Ok(resolved) = fs::canonicalize(&entry.name) {
            if let Some(status) = status_by_canon_path.get(&resolved) {
                entry.data = status.clone().into_bytes();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn entry_names(items: &[WalkItem]) -> Vec<String> {
        items
            .iter()
            .filter_map(|i| match i {
                WalkItem::Entry(e) => Some(e.name.clone()),
                WalkItem::Error(_) => None,
            })
            .collect()
    }

    #[test]
    fn single_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, b"hi").unwrap();

        let specs = vec![("s1".to_string(), path.to_string_lossy().into_owned())];
        let items = walk_file_specs(&specs, dir.path());
        assert_eq!(items.len(), 1);
        match &items[0] {
            WalkItem::Entry(e) => {
                assert_eq!(e.ftype, FileType::regular);
                assert_eq!(e.size, 2);
            }
            WalkItem::Error(_) => panic!("expected an entry"),
        }
    }

    #[test]
    fn missing_spec_yields_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let specs = vec![("s1".to_string(), missing.to_string_lossy().into_owned())];
        let items = walk_file_specs(&specs, dir.path());
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], WalkItem::Error(_)));
    }

    #[test]
    fn directory_recurses_into_children() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("f.txt"), b"x").unwrap();

        let specs = vec![("s1".to_string(), sub.to_string_lossy().into_owned())];
        let items = walk_file_specs(&specs, dir.path());
        let names = entry_names(&items);
        assert_eq!(names.len(), 2);
        assert!(names.iter().any(|n| n.ends_with("sub")));
        assert!(names.iter().any(|n| n.ends_with("f.txt")));
    }

    #[cfg(unix)]
    #[test]
    fn hard_link_siblings_become_link_entries() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, b"same inode").unwrap();
        fs::hard_link(&a, &b).unwrap();

        let specs = vec![
            ("s1".to_string(), a.to_string_lossy().into_owned()),
            ("s2".to_string(), b.to_string_lossy().into_owned()),
        ];
        let items = walk_file_specs(&specs, dir.path());
        assert_eq!(items.len(), 2);
        let WalkItem::Entry(first) = &items[0] else {
            panic!("expected entry")
        };
        assert_eq!(first.ftype, FileType::regular);
        let WalkItem::Entry(second) = &items[1] else {
            panic!("expected entry")
        };
        assert_eq!(second.ftype, FileType::link);
        assert_eq!(second.data, first.status.clone().into_bytes());
    }
}
