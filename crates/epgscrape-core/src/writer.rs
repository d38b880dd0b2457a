//! Atomic output file replacement.
//!
//! Content is written to a temporary file in the destination directory,
//! synced, then renamed over the destination, and the directory is synced
//! so the rename survives a crash. Readers see either the old file or the
//! new one, never a partial write.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::WriteError;

/// Directory holding `path`, or `.` for a bare file name.
fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn io_err(op: &'static str, path: &Path) -> impl FnOnce(std::io::Error) -> WriteError {
    let path = path.to_path_buf();
    move |source| WriteError { op, path, source }
}

/// Writes `contents` to `path` atomically.
///
/// # Errors
///
/// Returns an error if the directory cannot be created, or the temporary
/// file cannot be written, synced or renamed, or the directory cannot be
/// synced. `path` is untouched unless the rename already happened.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), WriteError> {
    write_atomic_with(path, |file| file.write_all(contents))
}

/// Writes to `path` atomically, letting `fill` stream into the temporary file.
///
/// If `fill` fails the temporary file is removed and `path` is untouched.
///
/// # Errors
///
/// Returns an error if any filesystem step or `fill` fails.
pub fn write_atomic_with<F>(path: &Path, fill: F) -> Result<(), WriteError>
where
    F: FnOnce(&mut File) -> std::io::Result<()>,
{
    let dir = parent_dir(path);

    std::fs::create_dir_all(&dir).map_err(io_err("create directory", &dir))?;

    let prefix = format!(
        ".{}.",
        path.file_name()
            .map_or_else(|| String::from("epg"), |n| n.to_string_lossy().into_owned())
    );
    let mut tmp = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(&dir)
        .map_err(io_err("create temporary file in", &dir))?;

    fill(tmp.as_file_mut()).map_err(io_err("write temporary file for", path))?;
    tmp.as_file()
        .sync_all()
        .map_err(io_err("sync temporary file for", path))?;
    make_world_readable(&tmp).map_err(io_err("set permissions on temporary file for", path))?;

    tmp.persist(path)
        .map_err(|e| e.error)
        .map_err(io_err("rename temporary file to", path))?;
    sync_dir(&dir).map_err(io_err("sync directory", &dir))?;

    tracing::debug!(path = %path.display(), "output file replaced");
    Ok(())
}

/// Temporary files are created `0600`; the published guide is served by
/// another process and must be readable by it.
#[cfg(unix)]
fn make_world_readable(tmp: &NamedTempFile) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
const fn make_world_readable(_tmp: &NamedTempFile) -> std::io::Result<()> {
    Ok(())
}

/// Flushes the directory entry so a completed rename is durable.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
const fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}
