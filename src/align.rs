/// Reach series construction and nearest-timestamp node alignment.
///
/// The reach series fixes the time axis for a reach: its length is the `nt`
/// dimension of every output array. Each node's raw records are then
/// re-indexed onto that axis, one selected record (or nothing) per reach
/// instant.
///
/// # Matching rule
/// For a reach instant `t` on calendar date `d` (UTC), only node records
/// dated `d` are candidates. Among those, the record with the smallest
/// `|t_node - t|` wins. An exact tie goes to the record at or after `t`;
/// among records that are still tied, the first in the node's raw record
/// list wins. A reach instant with no parseable timestamp never matches
/// anything.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{FeatureId, InputError, NodeId, ObservationRecord};

// ---------------------------------------------------------------------------
// Reach series
// ---------------------------------------------------------------------------

/// Reach-level records ordered by observation instant, without duplicates.
#[derive(Debug, Clone, PartialEq)]
pub struct ReachSeries {
    records: Vec<ObservationRecord>,
}

impl ReachSeries {
    /// Orders records by instant and drops repeated instants.
    ///
    /// Records without a parseable instant (`no_data` passes) are dropped,
    /// so the series length is the number of valid observation instants.
    /// The sort is stable; of several records sharing one instant, the
    /// first wins.
    pub fn from_records(records: Vec<ObservationRecord>) -> ReachSeries {
        let total = records.len();
        let mut records: Vec<_> = records.into_iter().filter(|r| r.instant.is_some()).collect();
        if records.len() < total {
            tracing::debug!(dropped = total - records.len(), "dropping undated reach records");
        }
        records.sort_by_key(|r| r.instant);
        records.dedup_by(|later, kept| later.instant == kept.instant);
        ReachSeries { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ObservationRecord] {
        &self.records
    }

    pub fn instants(&self) -> impl Iterator<Item = Option<DateTime<Utc>>> + '_ {
        self.records.iter().map(|r| r.instant)
    }

    /// Observation labels, one per instant, as written to the dataset.
    pub fn time_labels(&self) -> Vec<String> {
        self.records.iter().map(|r| r.time_str.clone()).collect()
    }
}

// ---------------------------------------------------------------------------
// Mismatch policy
// ---------------------------------------------------------------------------

/// What to do when a node was observed on a date the reach was not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MismatchPolicy {
    /// Ignore the extra node records; unmatched instants become fill.
    #[default]
    Lenient,
    /// Abort the reach with `InputError::ReachNodeMismatch`.
    Strict,
}

impl std::str::FromStr for MismatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lenient" => Ok(MismatchPolicy::Lenient),
            "strict" => Ok(MismatchPolicy::Strict),
            other => Err(format!("unknown mismatch policy '{other}', expected lenient or strict")),
        }
    }
}

// ---------------------------------------------------------------------------
// Alignment
// ---------------------------------------------------------------------------

/// Selects the node record nearest to `instant` on the same UTC date.
///
/// Exact ties prefer the record at or after `instant`, then input order.
pub fn select_nearest(
    instant: Option<DateTime<Utc>>,
    candidates: &[ObservationRecord],
) -> Option<&ObservationRecord> {
    let target = instant?;
    let date = target.date_naive();

    // Ranked by (gap, earlier-than-target); only a strictly better rank
    // replaces the current pick.
    let mut best: Option<(&ObservationRecord, (i64, bool))> = None;
    for record in candidates {
        let Some(t) = record.instant else { continue };
        if t.date_naive() != date {
            continue;
        }
        let rank = ((t - target).num_milliseconds().abs(), t < target);
        match best {
            Some((_, best_rank)) if rank >= best_rank => {}
            _ => best = Some((record, rank)),
        }
    }
    best.map(|(record, _)| record)
}

/// One node's records re-indexed onto the reach time axis.
#[derive(Debug)]
pub struct AlignedNode<'a> {
    pub node_id: NodeId,
    /// Exactly one entry per reach instant; `None` means all-missing.
    pub rows: Vec<Option<&'a ObservationRecord>>,
}

impl AlignedNode<'_> {
    /// Number of reach instants for which a node record was found.
    pub fn observed_count(&self) -> usize {
        self.rows.iter().filter(|r| r.is_some()).count()
    }
}

/// Aligns node records onto a reach series under a mismatch policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeAligner {
    policy: MismatchPolicy,
}

impl TimeAligner {
    pub fn new(policy: MismatchPolicy) -> TimeAligner {
        TimeAligner { policy }
    }

    pub fn policy(&self) -> MismatchPolicy {
        self.policy
    }

    /// Produces exactly `reach.len()` rows for the node.
    ///
    /// Under the strict policy, a dated node record whose calendar date
    /// matches no reach instant aborts with `ReachNodeMismatch`. Under the
    /// lenient policy such records are simply never selected.
    pub fn align<'a>(
        &self,
        reach_id: FeatureId,
        reach: &ReachSeries,
        node_id: NodeId,
        node_records: &'a [ObservationRecord],
    ) -> Result<AlignedNode<'a>, InputError> {
        if self.policy == MismatchPolicy::Strict {
            check_coverage(reach_id, reach, node_id, node_records)?;
        }
        let rows = reach
            .instants()
            .map(|instant| select_nearest(instant, node_records))
            .collect();
        Ok(AlignedNode { node_id, rows })
    }
}

/// Verifies every dated node record falls on a date the reach observed.
pub fn check_coverage(
    reach_id: FeatureId,
    reach: &ReachSeries,
    node_id: NodeId,
    node_records: &[ObservationRecord],
) -> Result<(), InputError> {
    let reach_dates: Vec<_> = reach.instants().flatten().map(|t| t.date_naive()).collect();
    for record in node_records {
        let Some(t) = record.instant else { continue };
        if !reach_dates.contains(&t.date_naive()) {
            return Err(InputError::ReachNodeMismatch {
                reach_id,
                node_id,
                time_str: record.time_str.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn record(time_str: &str, width: f64) -> ObservationRecord {
        let mut fields = BTreeMap::new();
        fields.insert("width".to_string(), crate::model::FieldValue::Number(width));
        ObservationRecord::new(time_str, fields)
    }

    #[test]
    fn test_reach_series_sorts_and_dedupes() {
        let series = ReachSeries::from_records(vec![
            record("2023-05-02T10:00:00Z", 2.0),
            record("no_data", 9.0),
            record("2023-05-01T10:00:00Z", 1.0),
            record("2023-05-02T10:00:00Z", 3.0),
        ]);
        let widths: Vec<_> = series.records().iter().map(|r| r.float("width")).collect();
        assert_eq!(widths, vec![Some(1.0), Some(2.0)]);
        assert!(series.instants().all(|t| t.is_some()));
    }

    #[test]
    fn test_all_undated_reach_series_is_empty() {
        let series = ReachSeries::from_records(vec![record("no_data", 1.0), record("no_data", 2.0)]);
        assert_eq!(series.len(), 0);
        assert!(series.is_empty());
    }

    #[test]
    fn test_undefined_reach_instant_selects_nothing() {
        let nodes = vec![record("2023-05-01T10:00:00Z", 1.0)];
        assert!(select_nearest(None, &nodes).is_none());
    }

    #[test]
    fn test_tie_goes_to_the_later_record() {
        let reach = record("2023-05-01T10:00:00Z", 0.0);
        let later_first = vec![
            record("2023-05-01T10:05:00Z", 1.0),
            record("2023-05-01T09:55:00Z", 2.0),
        ];
        assert_eq!(select_nearest(reach.instant, &later_first).unwrap().float("width"), Some(1.0));

        let earlier_first = vec![later_first[1].clone(), later_first[0].clone()];
        assert_eq!(select_nearest(reach.instant, &earlier_first).unwrap().float("width"), Some(1.0));
    }

    #[test]
    fn test_identical_instants_go_to_first_occurrence() {
        let reach = record("2023-05-01T10:00:00Z", 0.0);
        let nodes = vec![
            record("2023-05-01T10:05:00Z", 1.0),
            record("2023-05-01T10:05:00Z", 2.0),
        ];
        assert_eq!(select_nearest(reach.instant, &nodes).unwrap().float("width"), Some(1.0));
    }

    #[test]
    fn test_undated_node_records_are_never_selected() {
        let reach = record("2023-05-01T10:00:00Z", 0.0);
        let nodes = vec![record("no_data", 1.0)];
        assert!(select_nearest(reach.instant, &nodes).is_none());
    }

    #[test]
    fn test_policy_parses() {
        assert_eq!("STRICT".parse::<MismatchPolicy>().unwrap(), MismatchPolicy::Strict);
        assert!("loose".parse::<MismatchPolicy>().is_err());
        assert_eq!(MismatchPolicy::default(), MismatchPolicy::Lenient);
    }
}
