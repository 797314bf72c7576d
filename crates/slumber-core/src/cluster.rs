//! Session clustering.
//!
//! Groups aggregate sleep sessions into connected components under strict
//! temporal overlap. Sessions that merely touch (`b.start == a.end`) stay in
//! separate clusters, so back-to-back naps are never merged.

use chrono::{DateTime, Utc};

use crate::record::SleepSessionRecord;

/// A non-empty set of transitively overlapping sessions, ordered by start.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    sessions: Vec<SleepSessionRecord>,
    end: DateTime<Utc>,
}

impl Cluster {
    fn new(first: SleepSessionRecord) -> Self {
        let end = first.end;
        Self {
            sessions: vec![first],
            end,
        }
    }

    fn push(&mut self, session: SleepSessionRecord) {
        self.end = self.end.max(session.end);
        self.sessions.push(session);
    }

    /// Sessions in ascending start order.
    pub fn sessions(&self) -> &[SleepSessionRecord] {
        &self.sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Always false; clusters are never empty.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn is_singleton(&self) -> bool {
        self.sessions.len() == 1
    }

    /// Earliest start across the cluster.
    pub fn start(&self) -> DateTime<Utc> {
        self.sessions[0].start
    }

    /// Latest end across the cluster.
    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }
}

/// Groups sessions into clusters of mutually overlapping time ranges.
///
/// # Algorithm
///
/// 1. Sort ascending by start (longer session first on equal starts)
/// 2. A session joins the current cluster iff `start < cluster_end`
/// 3. On join, `cluster_end = max(cluster_end, session.end)`
/// 4. Otherwise it opens a new cluster
pub fn cluster_sessions(mut sessions: Vec<SleepSessionRecord>) -> Vec<Cluster> {
    sessions.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| b.end.cmp(&a.end)));

    let mut clusters: Vec<Cluster> = Vec::new();
    for session in sessions {
        match clusters.last_mut() {
            Some(current) if session.start < current.end => current.push(session),
            _ => clusters.push(Cluster::new(session)),
        }
    }
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{session, ts};

    #[test]
    fn empty_input_yields_no_clusters() {
        assert!(cluster_sessions(Vec::new()).is_empty());
    }

    #[test]
    fn overlapping_sessions_share_a_cluster() {
        let clusters = cluster_sessions(vec![
            session(ts(23, 0), ts(25, 0), 120.0),
            session(ts(22, 0), ts(26, 0), 240.0),
        ]);

        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 2);
        assert_eq!(clusters[0].start(), ts(22, 0));
        assert_eq!(clusters[0].end(), ts(26, 0));
    }

    #[test]
    fn touching_sessions_stay_separate() {
        let clusters = cluster_sessions(vec![
            session(ts(13, 0), ts(14, 0), 60.0),
            session(ts(14, 0), ts(15, 0), 60.0),
        ]);

        assert_eq!(clusters.len(), 2);
        assert!(clusters.iter().all(Cluster::is_singleton));
    }

    #[test]
    fn chains_join_transitively() {
        // a overlaps b, b overlaps c, a does not overlap c
        let clusters = cluster_sessions(vec![
            session(ts(22, 0), ts(24, 0), 120.0),
            session(ts(23, 30), ts(26, 0), 150.0),
            session(ts(25, 0), ts(30, 0), 300.0),
            session(ts(31, 0), ts(32, 0), 60.0),
        ]);

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].len(), 3);
        assert_eq!(clusters[0].end(), ts(30, 0));
        assert!(clusters[1].is_singleton());
    }

    #[test]
    fn sequential_scenario_yields_two_clusters() {
        let clusters = cluster_sessions(vec![
            session(ts(20, 0), ts(23, 0), 150.0),
            session(ts(23, 5), ts(26, 0), 150.0),
        ]);

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].sessions()[0].start, ts(20, 0));
        assert_eq!(clusters[1].sessions()[0].start, ts(23, 5));
    }

    #[test]
    fn clusters_never_overlap_each_other() {
        let clusters = cluster_sessions(vec![
            session(ts(1, 0), ts(3, 0), 100.0),
            session(ts(2, 0), ts(4, 0), 100.0),
            session(ts(4, 0), ts(6, 0), 100.0),
            session(ts(5, 0), ts(5, 30), 30.0),
            session(ts(9, 0), ts(10, 0), 60.0),
        ]);

        for pair in clusters.windows(2) {
            assert!(pair[0].end() <= pair[1].start());
        }
        assert_eq!(clusters.len(), 3);
    }
}
