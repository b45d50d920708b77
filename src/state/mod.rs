/// State management module
///
/// This module handles all rotation state, including:
/// - Shared data structures (data.rs)
/// - The two backing images and their roles (store.rs)
/// - The persistent drain journal (journal.rs)

pub mod data;
pub mod journal;
pub mod store;

pub use data::{CopyVerdict, DrainResult, ImageIndex, StorageImage};
pub use journal::Journal;
pub use store::ImageStore;
