/// Job lists for batch runs.
///
/// A batch array runs one job per index. The job list is a JSON array whose
/// entries are either a reach with its ordered node list or a prior lake:
///
/// ```json
/// [
///   {"reach_id": 74267100011, "node_ids": [74267100010011, 74267100010021]},
///   {"lake_id": "7420000123"}
/// ]
/// ```
///
/// Identifiers must be digit strings to load at all. Length and node
/// membership are checked only when a job is selected, so a reach/lake
/// mix-up fails its own array index and nothing else.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::fields::Product;
use crate::model::{FeatureId, InputError, LAKE_ID_DIGITS, REACH_ID_DIGITS};
use crate::pipeline::ReachJob;

/// Environment variable carrying the batch array index.
pub const ARRAY_INDEX_ENV: &str = "AWS_BATCH_JOB_ARRAY_INDEX";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LakeJob {
    pub lake_id: FeatureId,
}

/// One unit of work.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Job {
    Reach(ReachJob),
    Lake(LakeJob),
}

impl Job {
    pub fn product(&self) -> Product {
        match self {
            Job::Reach(_) => Product::River,
            Job::Lake(_) => Product::Lake,
        }
    }

    pub fn feature_id(&self) -> FeatureId {
        match self {
            Job::Reach(job) => job.reach_id,
            Job::Lake(job) => job.lake_id,
        }
    }

    /// Checks identifier lengths and that every node belongs to its reach.
    pub fn validate(&self) -> Result<(), InputError> {
        match self {
            Job::Reach(job) => {
                if digit_count(job.reach_id.value()) != REACH_ID_DIGITS {
                    return Err(InputError::InvalidIdentifier(format!(
                        "{} is not a reach identifier",
                        job.reach_id
                    )));
                }
                if let Some(stray) = job
                    .node_ids
                    .iter()
                    .find(|n| n.reach_prefix() != job.reach_id.reach_prefix())
                {
                    return Err(InputError::InvalidIdentifier(format!(
                        "node {} does not belong to reach {}",
                        stray, job.reach_id
                    )));
                }
                Ok(())
            }
            Job::Lake(job) => {
                if digit_count(job.lake_id.value()) != LAKE_ID_DIGITS {
                    return Err(InputError::InvalidIdentifier(format!(
                        "{} is not a lake identifier",
                        job.lake_id
                    )));
                }
                Ok(())
            }
        }
    }
}

fn digit_count(value: u64) -> usize {
    value.checked_ilog10().map_or(1, |d| d as usize + 1)
}

/// All jobs of a batch, in array-index order.
#[derive(Debug, Clone, PartialEq)]
pub struct JobList {
    jobs: Vec<Job>,
}

impl JobList {
    pub fn new(jobs: Vec<Job>) -> JobList {
        JobList { jobs }
    }

    pub fn from_json(text: &str) -> Result<JobList, InputError> {
        Ok(JobList::new(serde_json::from_str(text)?))
    }

    pub fn load(path: &Path) -> Result<JobList, InputError> {
        let text = fs::read_to_string(path).map_err(|e| InputError::io(path, e))?;
        let list = JobList::from_json(&text)?;
        tracing::debug!(path = %path.display(), jobs = list.len(), "loaded job list");
        Ok(list)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Returns the validated job for a batch array index.
    pub fn select(&self, index: usize) -> Result<&Job, InputError> {
        let job = self.jobs.get(index).ok_or_else(|| {
            InputError::Config(format!(
                "job index {index} out of range ({} jobs)",
                self.jobs.len()
            ))
        })?;
        job.validate()?;
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JOBS: &str = r#"[
        {"reach_id": 74267100011, "node_ids": [74267100010011, "74267100010021"]},
        {"lake_id": "7420000123"},
        {"reach_id": "74267100011", "node_ids": [74267200010011]}
    ]"#;

    #[test]
    fn test_job_list_parses_both_kinds() {
        let list = JobList::from_json(JOBS).unwrap();
        assert_eq!(list.len(), 3);

        let reach = list.select(0).unwrap();
        assert_eq!(reach.product(), Product::River);
        assert_eq!(reach.feature_id().value(), 74267100011);
        match reach {
            Job::Reach(job) => assert_eq!(job.node_ids.len(), 2),
            other => panic!("expected reach job, got {other:?}"),
        }

        let lake = list.select(1).unwrap();
        assert_eq!(lake.product(), Product::Lake);
    }

    #[test]
    fn test_select_rejects_foreign_nodes() {
        let list = JobList::from_json(JOBS).unwrap();
        assert!(matches!(list.select(2), Err(InputError::InvalidIdentifier(_))));
    }

    #[test]
    fn test_select_out_of_range() {
        let list = JobList::from_json(JOBS).unwrap();
        assert!(matches!(list.select(3), Err(InputError::Config(_))));
    }

    #[test]
    fn test_lake_slot_rejects_reach_identifier() {
        let list = JobList::from_json(r#"[{"lake_id": "74267100011"}]"#).unwrap();
        assert!(matches!(list.select(0), Err(InputError::InvalidIdentifier(_))));
    }

    #[test]
    fn test_malformed_identifier_fails_to_load() {
        assert!(JobList::from_json(r#"[{"lake_id": "12ab"}]"#).is_err());
    }

    #[test]
    fn test_digit_count() {
        assert_eq!(digit_count(7), 1);
        assert_eq!(digit_count(74267100011), 11);
        assert_eq!(digit_count(7420000123), 10);
    }
}
