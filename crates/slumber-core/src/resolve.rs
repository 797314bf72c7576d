//! Cluster resolution.
//!
//! Picks the canonical session representing each cluster:
//! - Singletons resolve to themselves.
//! - Sequential (partially overlapping) clusters take the session with the
//!   most asleep minutes.
//! - Nested clusters start from the innermost session and walk outward one
//!   session at a time, extending only while the newly covered leading gap
//!   looks asleep. The first awake-looking gap ends the walk.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cluster::Cluster;
use crate::record::{HeartRateSample, SleepSessionRecord, StepSample};
use crate::validator::{self, ValidatorConfig};

/// Shape of a multi-session cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterShape {
    /// The earliest-starting session ends no earlier than the latest-starting
    /// one, so one range subsumes the others.
    Nested,
    /// Partially overlapping, non-nested sessions.
    Sequential,
}

impl ClusterShape {
    /// Classifies a cluster. Singletons classify as nested.
    pub fn of(cluster: &Cluster) -> Self {
        let sessions = cluster.sessions();
        let earliest = &sessions[0];
        let latest = &sessions[sessions.len() - 1];
        if earliest.end >= latest.end {
            Self::Nested
        } else {
            Self::Sequential
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Nested => "nested",
            Self::Sequential => "sequential",
        }
    }
}

/// One outward step of the nested walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkStep {
    /// Start of the exclusive gap `[gap_start, gap_end)`.
    pub gap_start: DateTime<Utc>,
    pub gap_end: DateTime<Utc>,
    pub score: u8,
    /// Whether the canonical session was extended to the outer session.
    pub extended: bool,
}

/// How a cluster was resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub cluster: Cluster,
    /// `None` for singleton clusters.
    pub shape: Option<ClusterShape>,
    /// Gap evaluations, in walk order. Empty unless nested.
    pub walk: Vec<WalkStep>,
    pub canonical: SleepSessionRecord,
}

/// Resolves a cluster to its canonical session.
pub fn resolve(
    cluster: &Cluster,
    hr_samples: &[HeartRateSample],
    step_samples: &[StepSample],
    config: &ValidatorConfig,
) -> SleepSessionRecord {
    resolve_with_trace(cluster, hr_samples, step_samples, config).canonical
}

/// Resolves a cluster and records the decisions taken.
pub fn resolve_with_trace(
    cluster: &Cluster,
    hr_samples: &[HeartRateSample],
    step_samples: &[StepSample],
    config: &ValidatorConfig,
) -> Resolution {
    if cluster.is_singleton() {
        return Resolution {
            cluster: cluster.clone(),
            shape: None,
            walk: Vec::new(),
            canonical: cluster.sessions()[0].clone(),
        };
    }

    let shape = ClusterShape::of(cluster);
    let (canonical, walk) = match shape {
        ClusterShape::Sequential => (most_asleep(cluster.sessions()).clone(), Vec::new()),
        ClusterShape::Nested => {
            let (best, walk) = walk_outward(cluster.sessions(), hr_samples, step_samples, config);
            (best.clone(), walk)
        }
    };

    tracing::debug!(
        sessions = cluster.len(),
        shape = shape.as_str(),
        steps = walk.len(),
        canonical_start = %canonical.start,
        canonical_end = %canonical.end,
        "resolved cluster"
    );

    Resolution {
        cluster: cluster.clone(),
        shape: Some(shape),
        walk,
        canonical,
    }
}

/// Session with the greatest asleep minutes; the earliest wins ties.
fn most_asleep(sessions: &[SleepSessionRecord]) -> &SleepSessionRecord {
    sessions[1..].iter().fold(&sessions[0], |best, candidate| {
        if candidate.total_asleep_min.total_cmp(&best.total_asleep_min) == Ordering::Greater {
            candidate
        } else {
            best
        }
    })
}

/// Walks from the innermost session outward, stopping at the first gap that
/// scores awake.
fn walk_outward<'a>(
    sessions: &'a [SleepSessionRecord],
    hr_samples: &[HeartRateSample],
    step_samples: &[StepSample],
    config: &ValidatorConfig,
) -> (&'a SleepSessionRecord, Vec<WalkStep>) {
    let mut by_span: Vec<&SleepSessionRecord> = sessions.iter().collect();
    // Longest first; stable, so equal spans keep start order.
    by_span.sort_by_key(|session| std::cmp::Reverse(session.span_secs()));

    let mut best = by_span[by_span.len() - 1];
    let mut walk = Vec::new();

    for &outer in by_span.iter().rev().skip(1) {
        let gap_start = outer.start;
        let gap_end = best.start;
        let evidence = validator::gather(gap_start, gap_end, hr_samples, step_samples, config);
        let score = evidence.score(config);
        let extended = !config.judges_awake(&evidence);
        walk.push(WalkStep {
            gap_start,
            gap_end,
            score,
            extended,
        });
        if !extended {
            break;
        }
        best = outer;
    }

    (best, walk)
}
