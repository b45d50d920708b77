/// Fakes for the adapter traits, shared by the unit tests
///
/// Every fake appends to a shared `CallLog` so tests can assert the exact
/// order of gadget, mount and drain operations.

use chrono::Utc;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::Duration;

use crate::adapters::{Gadget, LocalMount, Provisioner, RepairOutcome};
use crate::drain::Drain;
use crate::error::{Result, RotatorError};
use crate::state::data::Role;
use crate::state::{CopyVerdict, DrainResult, ImageIndex, StorageImage};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Expose(ImageIndex),
    Withdraw,
    Repair(ImageIndex),
    Mount(ImageIndex),
    Unmount(PathBuf),
    Provision(ImageIndex),
    Drain(ImageIndex),
}

#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    pub fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }
}

fn injected(what: &str) -> RotatorError {
    RotatorError::CommandFailed {
        program: "fake".into(),
        args: what.into(),
        code: Some(1),
        stderr: "injected failure".into(),
    }
}

pub struct FakeGadget {
    log: CallLog,
    pub fail_expose: bool,
    pub fail_withdraw: bool,
}

impl FakeGadget {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            fail_expose: false,
            fail_withdraw: false,
        }
    }
}

impl Gadget for FakeGadget {
    fn expose(&mut self, image: &StorageImage) -> Result<()> {
        self.log.push(Call::Expose(image.index));
        if self.fail_expose {
            return Err(injected("expose"));
        }
        Ok(())
    }

    fn withdraw(&mut self) -> Result<()> {
        self.log.push(Call::Withdraw);
        if self.fail_withdraw {
            return Err(injected("withdraw"));
        }
        Ok(())
    }
}

/// Mounts every image on the same real directory
pub struct FakeMount {
    log: CallLog,
    mount_point: PathBuf,
    pub fail_repair: bool,
    pub fail_mount: bool,
    pub fail_unmount: bool,
}

impl FakeMount {
    pub fn new(log: CallLog, mount_point: &Path) -> Self {
        Self {
            log,
            mount_point: mount_point.to_path_buf(),
            fail_repair: false,
            fail_mount: false,
            fail_unmount: false,
        }
    }
}

impl LocalMount for FakeMount {
    fn repair(&mut self, image: &StorageImage) -> Result<RepairOutcome> {
        self.log.push(Call::Repair(image.index));
        if self.fail_repair {
            return Err(injected("repair"));
        }
        Ok(RepairOutcome::Clean)
    }

    fn mount(&mut self, image: &StorageImage) -> Result<PathBuf> {
        self.log.push(Call::Mount(image.index));
        if self.fail_mount {
            return Err(injected("mount"));
        }
        Ok(self.mount_point.clone())
    }

    fn unmount(&mut self, mount_path: &Path) -> Result<()> {
        self.log.push(Call::Unmount(mount_path.to_path_buf()));
        if self.fail_unmount {
            return Err(injected("unmount"));
        }
        Ok(())
    }

    fn mount_point(&self) -> &Path {
        &self.mount_point
    }
}

/// Writes a small placeholder instead of a formatted image
pub struct FakeProvisioner {
    log: CallLog,
    pub fail: bool,
}

impl FakeProvisioner {
    pub fn new(log: CallLog) -> Self {
        Self { log, fail: false }
    }
}

impl Provisioner for FakeProvisioner {
    fn provision(&mut self, image: &StorageImage) -> Result<()> {
        self.log.push(Call::Provision(image.index));
        if self.fail {
            return Err(RotatorError::Provision {
                index: image.index.as_u8(),
                detail: "injected failure".into(),
            });
        }
        std::fs::write(&image.path, b"FAT32").map_err(|e| RotatorError::io(&image.path, e))
    }
}

/// Returns scripted drain durations and remembers the role it was handed
pub struct FakeDrainer {
    log: CallLog,
    elapsed: VecDeque<Duration>,
    pub roles_seen: Vec<(ImageIndex, Role)>,
    /// Thread each drain ran on
    pub threads_seen: Vec<ThreadId>,
    pub fail: bool,
}

impl FakeDrainer {
    pub fn new(log: CallLog, elapsed: impl IntoIterator<Item = Duration>) -> Self {
        Self {
            log,
            elapsed: elapsed.into_iter().collect(),
            roles_seen: Vec::new(),
            threads_seen: Vec::new(),
            fail: false,
        }
    }
}

impl Drain for FakeDrainer {
    fn drain(&mut self, image: &StorageImage) -> Result<DrainResult> {
        self.log.push(Call::Drain(image.index));
        self.roles_seen.push((image.index, image.role));
        self.threads_seen.push(thread::current().id());
        if self.fail {
            return Err(injected("drain"));
        }
        let elapsed = self.elapsed.pop_front().unwrap_or_default();
        Ok(DrainResult {
            index: image.index,
            started_at: Utc::now(),
            elapsed,
            files_pending: 0,
            files_moved: 0,
            move_errors: 0,
            verdict: CopyVerdict::Complete,
        })
    }
}
