/// Drain module
///
/// This module handles emptying a withdrawn image:
/// - The repair → mount → copy → unmount sequence (pipeline.rs)
/// - Listing, moving and the lock marker in the backup directory (transfer.rs)

pub mod pipeline;
pub mod transfer;

use tokio::task;

use crate::error::Result;
use crate::state::{DrainResult, StorageImage};

pub use pipeline::DrainPipeline;

/// Empties a withdrawn image into the backup directory.
///
/// Implementations only read the image; roles belong to the controller.
pub trait Drain {
    fn drain(&mut self, image: &StorageImage) -> Result<DrainResult>;
}

/// Run `drainer` on the blocking pool and hand it back with its result.
///
/// A drain runs fsck, mount and a recursive copy, which can take minutes.
pub async fn drain_blocking<D>(
    mut drainer: D,
    image: StorageImage,
) -> Result<(D, Result<DrainResult>)>
where
    D: Drain + Send + 'static,
{
    let joined = task::spawn_blocking(move || {
        let result = drainer.drain(&image);
        (drainer, result)
    })
    .await?;
    Ok(joined)
}
