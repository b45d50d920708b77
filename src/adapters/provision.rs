use std::ffi::OsStr;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use super::{exec, Provisioner};
use crate::error::{IoContext, Result, RotatorError};
use crate::state::StorageImage;

/// Write granularity when zero-filling an image
const CHUNK_SIZE: usize = 1024 * 1024;

/// Write a new file of exactly `size_bytes` zero bytes.
///
/// Refuses to overwrite an existing file.
pub fn allocate_zeroed(path: &Path, size_bytes: u64) -> Result<()> {
    create_filled(path, |file| {
        let chunk = vec![0u8; CHUNK_SIZE];
        let mut remaining = size_bytes;
        while remaining > 0 {
            let n = remaining.min(CHUNK_SIZE as u64) as usize;
            file.write_all(&chunk[..n])?;
            remaining -= n as u64;
        }
        file.sync_all()
    })
}

/// Create `path` (which must not exist) and hand it to `fill`.
///
/// If `fill` fails the file is removed, so startup never mistakes a
/// half-written image for a provisioned one.
fn create_filled<F>(path: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .at_path(path)?;

    if let Err(err) = fill(&mut file) {
        drop(file);
        if let Err(remove_err) = fs::remove_file(path) {
            tracing::warn!(path = %path.display(), error = %remove_err, "could not remove partial image");
        }
        return Err(err).at_path(path);
    }
    Ok(())
}

/// Creates zero-filled FAT32 backing images
#[derive(Debug, Clone)]
pub struct FatProvisioner {
    mkfs: String,
    size_bytes: u64,
}

impl FatProvisioner {
    pub fn new(mkfs: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            mkfs: mkfs.into(),
            size_bytes,
        }
    }
}

impl Provisioner for FatProvisioner {
    fn provision(&mut self, image: &StorageImage) -> Result<()> {
        let index = image.index.as_u8();
        tracing::info!(
            image = index,
            path = %image.path.display(),
            size_mib = self.size_bytes / (1024 * 1024),
            "💾 creating backing image"
        );

        allocate_zeroed(&image.path, self.size_bytes).map_err(|err| RotatorError::Provision {
            index,
            detail: err.to_string(),
        })?;

        // -I: format the whole device, no partition table
        let formatted = exec::run_checked(
            &self.mkfs,
            [
                image.path.as_os_str(),
                OsStr::new("-F"),
                OsStr::new("32"),
                OsStr::new("-I"),
            ],
        );
        if let Err(err) = formatted {
            // A half-made image would look valid to the next startup
            if let Err(remove_err) = fs::remove_file(&image.path) {
                tracing::warn!(image = index, error = %remove_err, "could not remove unformatted image");
            }
            return Err(RotatorError::Provision {
                index,
                detail: err.to_string(),
            });
        }

        tracing::info!(image = index, "backing image formatted as FAT32");
        Ok(())
    }
}
