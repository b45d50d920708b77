/// Shared data structures for the rotation state
///
/// These structs represent the data model that flows between
/// the controller, the drain pipeline and the journal.

use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which of the two backing images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageIndex {
    Zero,
    One,
}

impl ImageIndex {
    /// The opposite slot (`index ^ 1`)
    pub fn other(self) -> Self {
        match self {
            ImageIndex::Zero => ImageIndex::One,
            ImageIndex::One => ImageIndex::Zero,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            ImageIndex::Zero => 0,
            ImageIndex::One => 1,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ImageIndex::Zero),
            1 => Some(ImageIndex::One),
            _ => None,
        }
    }
}

impl fmt::Display for ImageIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Role an image plays in the rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Exposed to the recording host
    Live,
    /// Withdrawn and being repaired, copied and unmounted
    Draining,
    /// Neither exposed nor draining
    Idle,
}

/// One of the two backing image files
#[derive(Debug, Clone, PartialEq)]
pub struct StorageImage {
    pub index: ImageIndex,
    pub role: Role,
    /// Full path to the image file (e.g. "/root/teslacam/images/cam0")
    pub path: PathBuf,
}

impl StorageImage {
    pub fn new(index: ImageIndex, image_dir: &Path) -> Self {
        Self {
            index,
            role: Role::Idle,
            path: image_dir.join(format!("cam{}", index)),
        }
    }
}

/// Copy-integrity verdict of a drain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyVerdict {
    Complete,
    /// Fewer entries arrived in the backup directory than were pending
    ShortCopy,
}

impl CopyVerdict {
    /// Conservation check: the backup directory must have grown by at least
    /// the number of entries that were pending on the image, and every
    /// entry must have moved without error.
    pub fn from_counts(
        pending: usize,
        move_errors: usize,
        backup_before: usize,
        backup_after: usize,
    ) -> Self {
        let delta = backup_after.saturating_sub(backup_before);
        if move_errors > 0 || delta < pending {
            CopyVerdict::ShortCopy
        } else {
            CopyVerdict::Complete
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CopyVerdict::Complete => "complete",
            CopyVerdict::ShortCopy => "short_copy",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "complete" => Some(CopyVerdict::Complete),
            "short_copy" => Some(CopyVerdict::ShortCopy),
            _ => None,
        }
    }
}

/// Outcome of one run of the drain pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct DrainResult {
    pub index: ImageIndex,
    pub started_at: DateTime<Utc>,
    /// Wall-clock time from repair through unmount
    pub elapsed: Duration,
    /// Entries found in the capture directory before the move
    pub files_pending: usize,
    /// Growth of the backup directory
    pub files_moved: usize,
    /// Entries that could not be moved
    pub move_errors: usize,
    pub verdict: CopyVerdict,
}
