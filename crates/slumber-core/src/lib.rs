//! Core domain logic for sleep reconciliation.
//!
//! This crate contains the fundamental types and logic for:
//! - Record parsing: turning raw event rows into typed sleep records
//! - Clustering and resolution: picking one canonical session per group of
//!   overlapping reports, using heart-rate and step evidence
//! - Aggregation: per-day totals and the single-day minute timeline
//!
//! Everything here is pure computation over a caller-supplied snapshot.

mod aggregate;
pub mod cluster;
mod engine;
pub mod record;
pub mod resolve;
mod row;
mod scope;
#[cfg(test)]
mod test_support;
mod timeline;
pub mod types;
pub mod validator;

pub use aggregate::{
    CanonicalSleep, DayTotals, SleepOrigin, SleepPiece, Tally, aggregate, day_totals,
    stage_episodes,
};
pub use cluster::{Cluster, cluster_sessions};
pub use engine::{Engine, EngineConfig, ReconcileStats, Reconciliation};
pub use record::{
    HeartRateSample, ParsedRecords, RecordError, Sample, SleepSessionRecord, SleepStageInterval,
    StepSample, parse_rows,
};
pub use resolve::{ClusterShape, Resolution, WalkStep, resolve, resolve_with_trace};
pub use row::{EventRow, RawEventRow};
pub use scope::{DateRange, DateScope, SingleDay, normalize_date};
pub use timeline::{DayTimeline, SleepBlock, SlotTag, build_timeline};
pub use types::{DayClock, MINUTES_PER_DAY, MetricKind, StageKind, ValidationError};
pub use validator::{AwakeEvidence, ValidatorConfig};
