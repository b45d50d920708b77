/// Runtime configuration
///
/// Loaded from an optional JSON file, then overridden by command-line flags.
/// Every field has a default matching the reference deployment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{IoContext, Result, RotatorError};

/// Options passed to the mass-storage gadget module
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GadgetConfig {
    /// Kernel module name
    pub module: String,
    /// Expose the image read-only to the host (`ro=1`)
    pub read_only: bool,
    /// Report the device as removable media (`removable=1`)
    pub removable: bool,
    /// Allow bulk endpoint halting (`stall=1`)
    pub stall: bool,
}

impl Default for GadgetConfig {
    fn default() -> Self {
        Self {
            module: "g_mass_storage".to_string(),
            read_only: false,
            removable: true,
            stall: false,
        }
    }
}

/// External programs, overridable for unusual installs
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ToolPaths {
    pub modprobe: String,
    pub mount: String,
    pub umount: String,
    pub fsck: String,
    pub mkfs: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            modprobe: "modprobe".to_string(),
            mount: "mount".to_string(),
            umount: "umount".to_string(),
            fsck: "fsck".to_string(),
            mkfs: "mkdosfs".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory holding the two backing images (cam0, cam1)
    pub image_dir: PathBuf,
    /// Where drained footage accumulates
    pub backup_dir: PathBuf,
    /// Transient local mount point for the draining image
    pub mount_point: PathBuf,
    /// Directory inside each image the camera records into
    pub capture_dir: String,
    /// Marker file created in the backup directory while a move is running
    pub lock_marker: String,
    /// Target time an image stays live
    pub record_window_secs: u64,
    /// Size of a newly created backing image
    pub image_size_mib: u64,
    /// Drain footage left on the images by a previous run before rotating
    pub drain_leftovers_on_startup: bool,
    /// Record drains in the SQLite journal
    pub journal_enabled: bool,
    /// Journal location (default: user data directory)
    pub journal_path: Option<PathBuf>,
    pub gadget: GadgetConfig,
    pub tools: ToolPaths,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            image_dir: PathBuf::from("/root/teslacam/images"),
            backup_dir: PathBuf::from("/root/teslacam/video"),
            mount_point: PathBuf::from("/mnt"),
            capture_dir: "teslacam".to_string(),
            lock_marker: "lock".to_string(),
            record_window_secs: 15 * 60,
            image_size_mib: 1024,
            drain_leftovers_on_startup: true,
            journal_enabled: true,
            journal_path: None,
            gadget: GadgetConfig::default(),
            tools: ToolPaths::default(),
        }
    }
}

impl Config {
    /// Default config file: ~/.config/dashcam-rotator/config.json on Linux
    pub fn default_path() -> Option<PathBuf> {
        let mut path = dirs::config_dir()?;
        path.push("dashcam-rotator");
        path.push("config.json");
        Some(path)
    }

    /// Parse from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).at_path(path)?;
        Self::from_json(&json)
    }

    /// Pretty JSON, as accepted by [`Config::load`]
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn record_window(&self) -> Duration {
        Duration::from_secs(self.record_window_secs)
    }

    pub fn image_size_bytes(&self) -> u64 {
        self.image_size_mib * 1024 * 1024
    }

    /// Where the journal lives, if enabled and a location can be determined
    pub fn resolved_journal_path(&self) -> Option<PathBuf> {
        if !self.journal_enabled {
            return None;
        }
        self.journal_path
            .clone()
            .or_else(crate::state::Journal::default_path)
    }

    /// Reject values the rotation cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.record_window_secs == 0 {
            return Err(RotatorError::Config(
                "record_window_secs must be greater than zero".into(),
            ));
        }
        if self.image_size_mib == 0 {
            return Err(RotatorError::Config(
                "image_size_mib must be greater than zero".into(),
            ));
        }
        for (name, value) in [
            ("capture_dir", &self.capture_dir),
            ("lock_marker", &self.lock_marker),
        ] {
            if value.is_empty() || value == "." || value == ".." || value.contains('/') {
                return Err(RotatorError::Config(format!(
                    "{} must be a single path component, got {:?}",
                    name, value
                )));
            }
        }
        if self.backup_dir == self.mount_point {
            return Err(RotatorError::Config(
                "backup_dir and mount_point must differ".into(),
            ));
        }
        if self.gadget.module.is_empty() {
            return Err(RotatorError::Config("gadget.module must not be empty".into()));
        }
        Ok(())
    }
}
