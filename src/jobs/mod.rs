//! Background jobs.
//!
//! - **Scrub**: removes blobs and metadata rows of deleted document versions
//!   once no live version of the same document still references the content.
//!
//! Jobs follow a consistent pattern:
//! 1. Configuration under its own config section (`[scrub]`)
//! 2. Run function that performs a single pass and returns a structured report
//! 3. Worker function that repeats the pass on an interval until cancelled
//! 4. Metrics for monitoring outcomes
//!
//! # Example
//!
//! ```toml
//! [scrub]
//! batch_size = 32
//! interval_secs = 3600
//! dry_run = true
//! ```

mod dedup;
mod scrub;

pub use dedup::{DedupGuard, DedupKey};
pub use scrub::{
    LogReporter, RunReporter, ScrubError, ScrubPhase, ScrubReport, Scrubber, UnitOutcome,
    UnitReport, start_scrub_worker,
};
