//! Specific background job implementations.

pub mod duration_backfill;

pub use duration_backfill::DurationBackfillJob;
