use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use super::{exec, LocalMount, RepairOutcome};
use crate::config::ToolPaths;
use crate::error::Result;
use crate::state::StorageImage;

/// Local mounting through `mount`, `umount` and `fsck`
#[derive(Debug, Clone)]
pub struct SystemMount {
    mount_point: PathBuf,
    tools: ToolPaths,
}

impl SystemMount {
    pub fn new(mount_point: impl Into<PathBuf>, tools: ToolPaths) -> Self {
        Self {
            mount_point: mount_point.into(),
            tools,
        }
    }
}

impl LocalMount for SystemMount {
    fn repair(&mut self, image: &StorageImage) -> Result<RepairOutcome> {
        tracing::info!(image = %image.index, "checking filesystem");
        let output = exec::run(&self.tools.fsck, [OsStr::new("-a"), image.path.as_os_str()])?;
        let outcome = RepairOutcome::from_fsck_code(output.code);
        match outcome {
            RepairOutcome::Clean => tracing::debug!(image = %image.index, "filesystem clean"),
            RepairOutcome::Corrected => {
                tracing::info!(image = %image.index, "filesystem errors corrected")
            }
            RepairOutcome::Uncorrected(code) => tracing::warn!(
                image = %image.index,
                ?code,
                stderr = %output.stderr,
                "filesystem errors left uncorrected"
            ),
        }
        Ok(outcome)
    }

    fn mount(&mut self, image: &StorageImage) -> Result<PathBuf> {
        tracing::info!(image = %image.index, mount_point = %self.mount_point.display(), "mounting locally");
        exec::run_checked(
            &self.tools.mount,
            [image.path.as_os_str(), self.mount_point.as_os_str()],
        )?;
        Ok(self.mount_point.clone())
    }

    fn unmount(&mut self, mount_path: &Path) -> Result<()> {
        tracing::info!(mount_point = %mount_path.display(), "unmounting");
        exec::run_checked(&self.tools.umount, [mount_path.as_os_str()])?;
        Ok(())
    }

    fn mount_point(&self) -> &Path {
        &self.mount_point
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ImageIndex;

    fn tools(program: &str) -> ToolPaths {
        ToolPaths {
            fsck: program.into(),
            mount: program.into(),
            umount: program.into(),
            ..ToolPaths::default()
        }
    }

    #[test]
    fn test_repair_never_fails_on_exit_code() {
        let mut mount = SystemMount::new("/mnt", tools("false"));
        let image = StorageImage::new(ImageIndex::Zero, Path::new("/images"));
        assert_eq!(
            mount.repair(&image).unwrap(),
            RepairOutcome::Corrected
        );
    }

    #[test]
    fn test_mount_returns_mount_point() {
        let mut mount = SystemMount::new("/mnt/cam", tools("true"));
        let image = StorageImage::new(ImageIndex::One, Path::new("/images"));
        assert_eq!(mount.mount(&image).unwrap(), PathBuf::from("/mnt/cam"));
    }

    #[test]
    fn test_unmount_failure_is_reported() {
        let mut mount = SystemMount::new("/mnt", tools("false"));
        assert!(mount.unmount(Path::new("/mnt")).is_err());
    }
}
