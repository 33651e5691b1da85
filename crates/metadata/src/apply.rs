//! `apply_file`/`apply_dir`/`apply_symlink`: the three metadata-commit
//! entry points `spec.md` §4.2 and §4.4's `commit` call once a destination
//! path is fully written.
//!
//! All three take the wire record's raw `mtime`/`permissions` fields
//! (`spec.md` §3: `-1` sentinel meaning "not provided") directly, so callers
//! don't need to thread an `Option` translation layer between the protocol
//! and this crate.

use std::fs;
use std::io;
use std::path::Path;

use filetime::FileTime;

use crate::error::Error;

const UNSET: i64 = -1;

fn file_time_from_ns(mtime_ns: i64) -> FileTime {
    let secs = mtime_ns.div_euclid(1_000_000_000);
    let nanos = mtime_ns.rem_euclid(1_000_000_000);
    #[allow(clippy::cast_possible_truncation)]
    FileTime::from_unix_time(secs, nanos as u32)
}

/// Applies `permissions` (POSIX mode bits) and `mtime_ns` (nanoseconds since
/// the epoch, applied to both atime and mtime per `spec.md` §4.2) to a
/// regular file, skipping whichever field is the wire default (`-1`).
///
/// # Errors
///
/// Returns an error if the underlying `chmod`/`utime` syscall fails.
pub fn apply_file(path: &Path, mtime_ns: i64, permissions: i64) -> Result<(), Error> {
    apply_following_symlinks(path, mtime_ns, permissions)
}

/// Identical contract to [`apply_file`], kept as a distinct entry point
/// because `spec.md` §4.4's `commit` reapplies directory metadata in a
/// separate pass (longest path first) after every contained entry has
/// already been written.
///
/// # Errors
///
/// Returns an error if the underlying `chmod`/`utime` syscall fails.
pub fn apply_dir(path: &Path, mtime_ns: i64, permissions: i64) -> Result<(), Error> {
    apply_following_symlinks(path, mtime_ns, permissions)
}

fn apply_following_symlinks(path: &Path, mtime_ns: i64, permissions: i64) -> Result<(), Error> {
    if permissions != UNSET {
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let mode = permissions as u32;
        set_mode(path, mode).map_err(|e| Error::io(path, e))?;
    }
    if mtime_ns != UNSET {
        let ft = file_time_from_ns(mtime_ns);
        filetime::set_file_times(path, ft, ft).map_err(|e| Error::io(path, e))?;
    }
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(mode & 0o200 == 0);
    fs::set_permissions(path, perms)
}

/// Applies `permissions`/`mtime_ns` to the symlink itself (not its target),
/// swallowing [`io::ErrorKind::Unsupported`]/`ENOTSUP` — most platforms
/// (Linux in particular, which has no `lchmod` syscall) cannot change a
/// symlink's own mode bits, mirroring `spec.md` §4.2's "ignoring
/// `NotImplementedError`".
///
/// # Errors
///
/// Returns an error if a syscall fails for a reason other than "this
/// platform doesn't support the link-preserving variant".
pub fn apply_symlink(path: &Path, mtime_ns: i64, permissions: i64) -> Result<(), Error> {
    if permissions != UNSET {
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let mode = permissions as u32;
        match lchmod(path, mode) {
            Ok(()) | Err(LchmodError::Unsupported) => {}
            Err(LchmodError::Io(e)) => return Err(Error::io(path, e)),
        }
    }
    if mtime_ns != UNSET {
        let ft = file_time_from_ns(mtime_ns);
        match filetime::set_symlink_file_times(path, ft, ft) {
            Ok(()) => {}
            Err(e) if is_unsupported(&e) => {}
            Err(e) => return Err(Error::io(path, e)),
        }
    }
    Ok(())
}

fn is_unsupported(e: &io::Error) -> bool {
    if e.kind() == io::ErrorKind::Unsupported {
        return true;
    }
    #[cfg(unix)]
    {
        matches!(e.raw_os_error(), Some(libc::ENOTSUP) | Some(libc::ENOSYS))
    }
    #[cfg(not(unix))]
    {
        false
    }
}

enum LchmodError {
    Unsupported,
    Io(io::Error),
}

#[cfg(unix)]
fn lchmod(path: &Path, mode: u32) -> Result<(), LchmodError> {
    use rustix::fs::{AtFlags, Mode, CWD, chmodat};

    match chmodat(CWD, path, Mode::from_raw_mode(mode), AtFlags::SYMLINK_NOFOLLOW) {
        Ok(()) => Ok(()),
        Err(errno) => {
            let io_err: io::Error = errno.into();
            if is_unsupported(&io_err) {
                Err(LchmodError::Unsupported)
            } else {
                Err(LchmodError::Io(io_err))
            }
        }
    }
}

#[cfg(not(unix))]
fn lchmod(_path: &Path, _mode: u32) -> Result<(), LchmodError> {
    Err(LchmodError::Unsupported)
}
