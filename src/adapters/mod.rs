/// External collaborators
///
/// This module wraps the system tools the rotation depends on:
/// - USB mass-storage gadget expose/withdraw (gadget.rs)
/// - Local mount, unmount and filesystem repair (mount.rs)
/// - Backing image allocation and formatting (provision.rs)
/// - Running external programs (exec.rs)
///
/// Each concern is a trait so the controller and the drain pipeline can be
/// driven by fakes in tests.

pub mod exec;
pub mod gadget;
pub mod mount;
pub mod provision;

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::state::StorageImage;

pub use gadget::ModprobeGadget;
pub use mount::SystemMount;
pub use provision::FatProvisioner;

/// Exposes one backing image at a time to the recording host
pub trait Gadget {
    /// Make `image` visible to the host. Any previously exposed image must
    /// already be withdrawn.
    fn expose(&mut self, image: &StorageImage) -> Result<()>;

    /// Remove whatever is exposed. A no-op when nothing is.
    fn withdraw(&mut self) -> Result<()>;
}

/// What a filesystem repair pass reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairOutcome {
    Clean,
    /// Errors were found and fixed
    Corrected,
    /// Errors remain, or the checker itself failed; carries the exit code
    Uncorrected(Option<i32>),
}

impl RepairOutcome {
    /// Interpret an `fsck` exit code (bit 0: corrected, bit 1: reboot
    /// needed, bits 2 and up: left uncorrected or operational error).
    pub fn from_fsck_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => RepairOutcome::Clean,
            Some(c) if c & !0b11 == 0 => RepairOutcome::Corrected,
            other => RepairOutcome::Uncorrected(other),
        }
    }
}

/// Mounts a backing image on the local mount point
pub trait LocalMount {
    fn repair(&mut self, image: &StorageImage) -> Result<RepairOutcome>;

    /// Mount `image`, returning where it is mounted
    fn mount(&mut self, image: &StorageImage) -> Result<PathBuf>;

    fn unmount(&mut self, mount_path: &Path) -> Result<()>;

    /// The fixed mount point this adapter mounts on
    fn mount_point(&self) -> &Path;
}

/// Creates a missing backing image
pub trait Provisioner {
    /// Allocate and format a new image at `image.path`
    fn provision(&mut self, image: &StorageImage) -> Result<()>;
}
