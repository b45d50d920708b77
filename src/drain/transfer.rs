/// File moves between the mounted image and the backup directory
///
/// The mounted image and the backup directory normally live on different
/// filesystems, so a move is a rename when possible and a recursive copy
/// followed by removal otherwise.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{IoContext, Result};

/// Top-level entries of `dir`, sorted by name.
///
/// Entries whose name equals `skip` are left out.
pub fn list_entries(dir: &Path, skip: Option<&str>) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from).at_path(dir)?;
        if skip.is_some_and(|name| entry.file_name() == name) {
            continue;
        }
        entries.push(entry.into_path());
    }
    Ok(entries)
}

pub fn count_entries(dir: &Path, skip: Option<&str>) -> Result<usize> {
    Ok(list_entries(dir, skip)?.len())
}

/// Create the "copy in progress" marker (like `touch`)
pub fn create_marker(path: &Path) -> Result<()> {
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .at_path(path)?;
    Ok(())
}

pub fn remove_marker(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).at_path(path),
    }
}

/// Move `src` into `dest_dir`, keeping its name. Returns the new path.
///
/// An existing file of the same name is replaced; an existing directory of
/// the same name has the contents merged into it. When the copy fallback
/// fails, whatever it wrote is removed again and `src` is left in place.
pub fn move_entry(src: &Path, dest_dir: &Path) -> Result<PathBuf> {
    let name = src
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "entry has no file name"))
        .at_path(src)?;
    let dest = dest_dir.join(name);

    if fs::rename(src, &dest).is_ok() {
        return Ok(dest);
    }

    // Cross-device or merge: copy, then remove the source
    copy_tree(src, &dest)?;
    let meta = fs::symlink_metadata(src).at_path(src)?;
    if meta.is_dir() {
        fs::remove_dir_all(src).at_path(src)?;
    } else {
        fs::remove_file(src).at_path(src)?;
    }
    Ok(dest)
}

/// Copy `src` to `dest`, undoing the partial copy on failure
fn copy_tree(src: &Path, dest: &Path) -> Result<()> {
    let mut written = Vec::new();
    let copied = copy_tree_tracked(src, dest, &mut written);
    if copied.is_err() {
        discard(&written);
    }
    copied
}

/// What a copy put in place, so a failed copy can be taken back
enum Written {
    File(PathBuf),
    Dir(PathBuf),
}

fn copy_tree_tracked(src: &Path, dest: &Path, written: &mut Vec<Written>) -> Result<()> {
    let meta = fs::symlink_metadata(src).at_path(src)?;
    if !meta.is_dir() {
        written.push(Written::File(dest.to_path_buf()));
        fs::copy(src, dest).at_path(dest)?;
        return Ok(());
    }

    for entry in WalkDir::new(src).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from).at_path(src)?;
        let relative = entry.path().strip_prefix(src).unwrap_or(Path::new(""));
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            if !target.is_dir() {
                fs::create_dir(&target).at_path(&target)?;
                written.push(Written::Dir(target));
            }
        } else {
            // A failed copy may still have created or truncated the target
            written.push(Written::File(target.clone()));
            fs::copy(entry.path(), &target).at_path(&target)?;
        }
    }
    Ok(())
}

/// Remove what a failed copy wrote, newest first. Directories that existed
/// before the copy are never in `written`, so merged-into footage survives.
fn discard(written: &[Written]) {
    for item in written.iter().rev() {
        let (path, removed) = match item {
            Written::File(path) => (path, fs::remove_file(path)),
            Written::Dir(path) => (path, fs::remove_dir(path)),
        };
        match removed {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "could not remove partial copy")
            }
        }
    }
}
