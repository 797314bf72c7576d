//! Reconciliation engine.
//!
//! Runs the full pipeline over one row snapshot:
//!
//! 1. Parse rows into sessions, stage intervals and samples
//! 2. Dates with granular stage data use stage episodes; their sessions are
//!    ignored
//! 3. Cluster the remaining sessions and resolve each cluster
//! 4. Hand the canonical units to the batch and single-day views
//!
//! Nothing is cached between calls; each snapshot is processed from scratch.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::aggregate::{self, CanonicalSleep, DayTotals, stage_episodes};
use crate::cluster::cluster_sessions;
use crate::record::{ParsedRecords, parse_rows};
use crate::resolve::{Resolution, resolve_with_trace};
use crate::row::EventRow;
use crate::scope::DateScope;
use crate::timeline::{DayTimeline, build_timeline};
use crate::types::DayClock;
use crate::validator::ValidatorConfig;

/// Configuration for reconciliation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    /// Where calendar days begin and end.
    pub clock: DayClock,
    /// Awake-scoring thresholds.
    pub validator: ValidatorConfig,
}

/// Counts describing one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileStats {
    pub rows: usize,
    pub dropped: usize,
    pub duplicate_stages: usize,
    pub sessions: usize,
    /// Sessions ignored because their date has granular stage data.
    pub superseded_sessions: usize,
    pub clusters: usize,
    pub stage_episodes: usize,
}

/// The reconciliation engine.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    pub const fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Reconciles a row snapshot for the given scope.
    pub fn reconcile<'s, R, S>(&self, rows: &[R], scope: &'s S) -> Reconciliation<'s, S>
    where
        R: EventRow + Sync,
        S: DateScope + Sync + ?Sized,
    {
        let clock = self.config.clock;
        let parsed = parse_rows(rows, scope, &clock);
        let ParsedRecords {
            sessions,
            stages,
            heart_rate,
            steps,
            dropped,
            duplicates,
        } = parsed;

        let granular_dates: HashSet<NaiveDate> =
            stages.iter().map(|interval| interval.storage_date).collect();
        let session_count = sessions.len();
        let sessions: Vec<_> = sessions
            .into_iter()
            .filter(|session| !granular_dates.contains(&session.storage_date))
            .collect();
        let superseded_sessions = session_count - sessions.len();
        if superseded_sessions > 0 {
            tracing::debug!(
                superseded_sessions,
                "granular stage data supersedes sessions"
            );
        }

        let clusters = cluster_sessions(sessions);
        let resolutions: Vec<Resolution> = clusters
            .par_iter()
            .map(|cluster| resolve_with_trace(cluster, &heart_rate, &steps, &self.config.validator))
            .collect();

        let episodes = stage_episodes(&stages);
        let mut units: Vec<CanonicalSleep> = resolutions
            .iter()
            .map(|resolution| CanonicalSleep::from_session(&resolution.canonical))
            .chain(episodes.iter().cloned())
            .collect();
        units.sort_by_key(|unit| (unit.start, unit.end));

        let stats = ReconcileStats {
            rows: rows.len(),
            dropped,
            duplicate_stages: duplicates,
            sessions: session_count,
            superseded_sessions,
            clusters: resolutions.len(),
            stage_episodes: episodes.len(),
        };
        tracing::info!(
            rows = stats.rows,
            dropped = stats.dropped,
            clusters = stats.clusters,
            stage_episodes = stats.stage_episodes,
            "reconciled snapshot"
        );

        Reconciliation {
            scope,
            clock,
            units,
            resolutions,
            stats,
        }
    }
}

/// Result of reconciling one snapshot.
#[derive(Debug)]
pub struct Reconciliation<'s, S: ?Sized> {
    scope: &'s S,
    clock: DayClock,
    units: Vec<CanonicalSleep>,
    resolutions: Vec<Resolution>,
    stats: ReconcileStats,
}

impl<S> Reconciliation<'_, S>
where
    S: DateScope + Sync + ?Sized,
{
    /// Batch view: totals per in-scope date with counted sleep.
    pub fn totals(&self) -> BTreeMap<NaiveDate, DayTotals> {
        aggregate::aggregate(self.scope, &self.units, &self.clock)
    }

    /// Expanded view of one date. Its totals equal the batch view's entry for
    /// the same date (or zero when the batch view has none).
    pub fn timeline(&self, date: NaiveDate) -> DayTimeline {
        build_timeline(date, &self.units, &self.clock)
    }

    /// Canonical units, ordered by start.
    pub fn units(&self) -> &[CanonicalSleep] {
        &self.units
    }

    /// Cluster decisions, ordered by cluster start.
    pub fn resolutions(&self) -> &[Resolution] {
        &self.resolutions
    }

    pub const fn stats(&self) -> ReconcileStats {
        self.stats
    }

    pub const fn clock(&self) -> &DayClock {
        &self.clock
    }
}
