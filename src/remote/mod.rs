/// Remote segmentation: client for the labeled-segment service and the
/// worker pool that drives it.
///
/// ```text
///   list ids ──► split into `workers` chunks
///                      │
///          ┌───────────┼───────────┐
///          ▼           ▼           ▼
///       worker 0    worker 1 … worker n-1   find-segments → commit
///          └───────────┼───────────┘
///                      ▼
///               SegmentTotals (after join)
/// ```
pub mod client;
pub mod worker;

use crate::error::PrepResult;

pub use client::{Segment, SegmentClient};

/// The two per-sample calls the worker pool needs.
pub trait SegmentService: Sync {
    /// Ask the service to split a sample into fixed-length segments.
    fn find_segments(&self, sample_id: u64) -> PrepResult<Vec<Segment>>;

    /// Write accepted segment boundaries back.
    fn commit_segments(&self, sample_id: u64, segments: &[Segment]) -> PrepResult<()>;
}
