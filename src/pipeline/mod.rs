//! Item pipeline -- the lifecycle of one claimed work item.
//!
//! Split into focused submodules:
//! - [`context`] - External collaborators and per-item state
//! - [`directories`] - Clean working directory and output names
//! - [`manifest`] - Skip-lists, size budget and URL selection
//! - [`stats`] - Tracker statistics of the finished container
//! - [`relocate`] - All-or-nothing move into the shared data directory
//! - [`orchestration`] - The stage sequence tying it together

mod context;
mod directories;
pub mod manifest;
mod orchestration;
mod relocate;
mod stats;


pub use context::Collaborators;
pub use directories::prepare_directories;
pub use manifest::{ResolvedManifest, resolve_manifest};
pub use orchestration::ItemPipeline;
pub use relocate::{RelocatedFiles, relocate};
pub use stats::{FETCH_TOOL, extract_stats};
