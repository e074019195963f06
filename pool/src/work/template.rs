use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One coinbase split / merkle path for a job id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateJob {
    pub coinbase1: String,
    pub coinbase2: String,
    #[serde(default)]
    pub merkle_branch: Vec<String>,
    pub job_time: u32,
}

/// Upstream block template as served by the template endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTemplate {
    /// Big-endian hex, as a node reports it.
    pub prev_hash: String,
    pub version: u32,
    pub n_bits: u32,
    #[serde(default)]
    pub height: u64,
    /// Job id that `mining.notify` announces.
    pub last_job_id: String,
    /// `clean_jobs` flag for the announced job.
    #[serde(default)]
    pub clean_jobs: bool,
    #[serde(default)]
    pub jobs: HashMap<String, TemplateJob>,
}

impl BlockTemplate {
    pub fn last_job(&self) -> Option<&TemplateJob> {
        self.jobs.get(&self.last_job_id)
    }

    pub fn has_job(&self, job_id: &str) -> bool {
        self.jobs.contains_key(job_id)
    }
}
