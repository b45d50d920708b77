use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::transfer;
use super::Drain;
use crate::adapters::LocalMount;
use crate::config::Config;
use crate::error::Result;
use crate::policy::{require, settle, Operation};
use crate::state::{CopyVerdict, DrainResult, ImageIndex, StorageImage};

/// Counts from the copy step
#[derive(Debug, Clone, Copy, PartialEq)]
struct CopyStats {
    pending: usize,
    moved: usize,
    errors: usize,
    verdict: CopyVerdict,
}

/// Repair → mount → copy → unmount, applied to a withdrawn image
pub struct DrainPipeline<M> {
    mount: M,
    capture_dir: String,
    backup_dir: PathBuf,
    lock_marker: String,
}

impl<M: LocalMount> DrainPipeline<M> {
    pub fn new(mount: M, config: &Config) -> Self {
        Self {
            mount,
            capture_dir: config.capture_dir.clone(),
            backup_dir: config.backup_dir.clone(),
            lock_marker: config.lock_marker.clone(),
        }
    }

    /// The mount adapter, for the startup sanity pass
    pub fn mount_mut(&mut self) -> &mut M {
        &mut self.mount
    }

    fn marker_path(&self) -> PathBuf {
        self.backup_dir.join(&self.lock_marker)
    }

    /// Move everything from the capture directory into the backup directory
    fn copy_out(&self, index: ImageIndex, mount_path: &Path) -> Result<CopyStats> {
        let capture_path = mount_path.join(&self.capture_dir);
        tracing::info!(
            image = %index,
            from = %capture_path.display(),
            to = %self.backup_dir.display(),
            "preparing to copy videos"
        );

        let pending = match transfer::list_entries(&capture_path, None) {
            Ok(entries) => entries,
            Err(err) => {
                // The camera recreates its directory; nothing to drain this time
                tracing::warn!(image = %index, error = %err, "capture directory unreadable");
                Vec::new()
            }
        };
        tracing::info!(image = %index, count = pending.len(), "found files in capture directory");

        if pending.is_empty() {
            return Ok(CopyStats {
                pending: 0,
                moved: 0,
                errors: 0,
                verdict: CopyVerdict::Complete,
            });
        }

        let marker = self.marker_path();
        let before = require(
            Operation::CopyBookkeeping,
            transfer::count_entries(&self.backup_dir, Some(&self.lock_marker)),
        )?;
        require(Operation::CopyBookkeeping, transfer::create_marker(&marker))?;

        let mut errors = 0;
        for entry in &pending {
            let moved = transfer::move_entry(entry, &self.backup_dir);
            if settle(Operation::MoveEntry, moved)?.is_none() {
                errors += 1;
            }
        }

        require(Operation::CopyBookkeeping, transfer::remove_marker(&marker))?;
        let after = require(
            Operation::CopyBookkeeping,
            transfer::count_entries(&self.backup_dir, Some(&self.lock_marker)),
        )?;

        let verdict = CopyVerdict::from_counts(pending.len(), errors, before, after);
        let stats = CopyStats {
            pending: pending.len(),
            moved: after.saturating_sub(before),
            errors,
            verdict,
        };

        if verdict == CopyVerdict::ShortCopy {
            tracing::warn!(
                image = %index,
                pending = stats.pending,
                moved = stats.moved,
                errors,
                "⚠️  copy error, number of files moved is incorrect"
            );
        }

        Ok(stats)
    }
}

impl<M: LocalMount> Drain for DrainPipeline<M> {
    fn drain(&mut self, image: &StorageImage) -> Result<DrainResult> {
        let started_at = Utc::now();
        let clock = Instant::now();

        // Step 1: best-effort repair; a broken image surfaces at mount
        settle(Operation::Repair, self.mount.repair(image))?;

        // Step 2: mount
        let mount_path = require(Operation::Mount, self.mount.mount(image))?;

        // Steps 3-5: copy
        let copied = self.copy_out(image.index, &mount_path);

        // Step 6: unmount even when the copy failed
        settle(Operation::Unmount, self.mount.unmount(&mount_path))?;

        let stats = copied?;
        let result = DrainResult {
            index: image.index,
            started_at,
            elapsed: clock.elapsed(),
            files_pending: stats.pending,
            files_moved: stats.moved,
            move_errors: stats.errors,
            verdict: stats.verdict,
        };

        tracing::info!(
            image = %image.index,
            pending = result.files_pending,
            moved = result.files_moved,
            elapsed_ms = result.elapsed.as_millis() as u64,
            verdict = result.verdict.as_str(),
            "✅ drain finished"
        );

        Ok(result)
    }
}
