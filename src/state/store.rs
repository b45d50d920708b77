use std::path::Path;

use super::data::{ImageIndex, Role, StorageImage};
use crate::error::{Result, RotatorError};

/// The ImageStore holds the two backing images and their roles.
///
/// Only the rotation controller mutates roles. Every transition keeps the
/// two roles complementary: never both `Live`, never both `Draining`.
#[derive(Debug, Clone)]
pub struct ImageStore {
    images: [StorageImage; 2],
}

impl ImageStore {
    /// Create both slots under `image_dir`, initially `Idle`
    pub fn new(image_dir: &Path) -> Self {
        Self {
            images: [
                StorageImage::new(ImageIndex::Zero, image_dir),
                StorageImage::new(ImageIndex::One, image_dir),
            ],
        }
    }

    pub fn image(&self, index: ImageIndex) -> &StorageImage {
        &self.images[index.as_u8() as usize]
    }

    fn image_mut(&mut self, index: ImageIndex) -> &mut StorageImage {
        &mut self.images[index.as_u8() as usize]
    }

    pub fn images(&self) -> &[StorageImage; 2] {
        &self.images
    }

    pub fn role(&self, index: ImageIndex) -> Role {
        self.image(index).role
    }

    /// The image currently exposed to the host, if any
    pub fn live(&self) -> Option<ImageIndex> {
        self.images
            .iter()
            .find(|image| image.role == Role::Live)
            .map(|image| image.index)
    }

    /// Make `index` live. A previously live other image becomes `Draining`.
    pub fn mark_live(&mut self, index: ImageIndex) {
        let other = index.other();
        if self.role(other) == Role::Live {
            self.image_mut(other).role = Role::Draining;
        }
        self.image_mut(index).role = Role::Live;
    }

    /// Return a drained image to `Idle`
    pub fn finish_drain(&mut self, index: ImageIndex) -> Result<()> {
        if self.role(index) != Role::Draining {
            return Err(RotatorError::Invariant(format!(
                "image {} finished draining while {:?}",
                index,
                self.role(index)
            )));
        }
        self.image_mut(index).role = Role::Idle;
        Ok(())
    }

    /// Check the complementary-roles invariant
    pub fn check(&self) -> Result<()> {
        let [a, b] = &self.images;
        if a.role == b.role && a.role != Role::Idle {
            return Err(RotatorError::Invariant(format!(
                "both images are {:?}",
                a.role
            )));
        }
        Ok(())
    }
}
