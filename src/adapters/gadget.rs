use std::ffi::OsString;

use super::{exec, Gadget};
use crate::config::GadgetConfig;
use crate::error::Result;
use crate::state::StorageImage;

/// Mass-storage gadget driven through the `g_mass_storage` kernel module.
///
/// The module takes a single backing file, so exposing a new image means
/// unloading and reloading it.
#[derive(Debug, Clone)]
pub struct ModprobeGadget {
    modprobe: String,
    config: GadgetConfig,
}

fn flag(value: bool) -> char {
    if value {
        '1'
    } else {
        '0'
    }
}

impl ModprobeGadget {
    pub fn new(modprobe: impl Into<String>, config: GadgetConfig) -> Self {
        Self {
            modprobe: modprobe.into(),
            config,
        }
    }

    /// `modprobe` arguments that load the module with `image` as its backing file
    pub fn expose_args(&self, image: &StorageImage) -> Vec<OsString> {
        let mut file = OsString::from("file=");
        file.push(&image.path);
        vec![
            OsString::from(&self.config.module),
            file,
            format!("stall={}", flag(self.config.stall)).into(),
            format!("ro={}", flag(self.config.read_only)).into(),
            format!("removable={}", flag(self.config.removable)).into(),
        ]
    }
}

impl Gadget for ModprobeGadget {
    fn expose(&mut self, image: &StorageImage) -> Result<()> {
        tracing::info!(image = %image.index, read_only = self.config.read_only, "exposing image to host");
        exec::run_checked(&self.modprobe, self.expose_args(image))?;
        Ok(())
    }

    fn withdraw(&mut self) -> Result<()> {
        tracing::info!(module = %self.config.module, "withdrawing gadget");
        // Removing a module that is not loaded succeeds, so this is idempotent
        exec::run_checked(&self.modprobe, ["-r", self.config.module.as_str()])?;
        Ok(())
    }
}
