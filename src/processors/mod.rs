//! The two polling pipelines: mentions and direct messages.

pub mod dm_sync;
pub mod dms;
pub mod interpret;
pub mod mentions;

pub use dms::DmProcessor;
pub use interpret::interpret_dm;
pub use mentions::MentionsProcessor;

/// Counts from one processing cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Items fetched this cycle.
    pub seen: usize,
    /// Items already handled, or skipped because their state was unknown.
    pub skipped: usize,
    pub replied: usize,
    pub failed: usize,
}
