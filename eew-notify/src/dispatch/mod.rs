//! Event tracking and alert dispatch.
//!
//! Revisions flow through [`DispatchCoordinator::handle`]: the region table is
//! updated, the threshold gate decides whether the revision is alert-worthy, the
//! formatter renders the text and the notification service fans it out. Final
//! revisions additionally get a map caption once the map has been drawn.

pub mod coordinator;
pub mod formatter;
pub mod gate;
pub mod table;

pub use coordinator::{DispatchCoordinator, DispatchOutcome, DispatchPhase, EventSnapshot};
pub use formatter::{MessageFormatter, remaining_seconds};
pub use gate::should_notify;
pub use table::{RegionIntensityTable, RegionKey, RegionRecord, ReportMode};
