//! Repair orchestration for a game install.
//!
//! [`PatchManager`] runs one of three flows at a time:
//! - self-diagnosis, which rebuilds the failed patch plan from the client log
//! - forced restoration of the essential executables from a given web root
//! - restoration of the originals saved by the previous run
//!
//! Downloads go through the [`Downloader`](patchdoc_transfer::Downloader)
//! seam with at most [`MAX_CONCURRENT_DOWNLOADS`] transfers in flight.

mod error;
mod manager;
mod plan;
mod settings;

pub use error::PatchError;
pub use manager::{DiagnosisOverrides, MAX_CONCURRENT_DOWNLOADS, PatchManager, PatchOutcome};
pub use plan::{build_plan, essential_plan};
pub use settings::{FixedSettings, SettingsReader};
