use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{BlockTemplate, ShareSubmission, ShareVerdict, WorkSource};
use crate::difficulty;

#[derive(Default)]
struct StoreState {
    current: Option<Arc<BlockTemplate>>,
    /// Submissions seen on the current prev hash.
    seen: HashSet<String>,
}

/// In-memory template holder with per-block duplicate detection.
///
/// A share is valid when its job id belongs to the template it was checked
/// against; header hashing lives upstream.
pub struct TemplateStore {
    state: RwLock<StoreState>,
    sick: AtomicBool,
    genesis_work: i64,
}

impl TemplateStore {
    pub fn new(genesis_work: i64) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            sick: AtomicBool::new(false),
            genesis_work,
        }
    }

    /// Install `template`; returns true when it differs from the current one.
    ///
    /// A new prev hash starts a new duplicate window.
    pub fn update(&self, template: BlockTemplate) -> bool {
        let mut state = self.state.write();
        let (changed, new_block) = match state.current.as_deref() {
            Some(cur) => (cur != &template, cur.prev_hash != template.prev_hash),
            None => (true, true),
        };
        if new_block {
            state.seen.clear();
        }
        if changed {
            state.current = Some(Arc::new(template));
        }
        changed
    }

    pub fn set_sick(&self, sick: bool) {
        self.sick.store(sick, Ordering::Relaxed);
    }

    pub fn seen_count(&self) -> usize {
        self.state.read().seen.len()
    }

    fn share_key(share: &ShareSubmission<'_>) -> String {
        let mut key = String::from(share.extranonce1);
        for p in share.params.iter().skip(1) {
            key.push(':');
            key.push_str(p);
        }
        key
    }
}

impl Default for TemplateStore {
    fn default() -> Self {
        Self::new(difficulty::genesis_target_work())
    }
}

impl WorkSource for TemplateStore {
    fn current_block_template(&self) -> Option<Arc<BlockTemplate>> {
        self.state.read().current.clone()
    }

    fn process_share(&self, share: &ShareSubmission<'_>) -> ShareVerdict {
        let key = Self::share_key(share);
        let duplicate = !self.state.write().seen.insert(key);

        let valid = match (&share.template, share.params.get(1)) {
            (Some(t), Some(job_id)) => t.has_job(job_id),
            _ => false,
        };

        ShareVerdict { duplicate, valid }
    }

    fn is_sick(&self) -> bool {
        self.sick.load(Ordering::Relaxed)
    }

    fn genesis_work(&self) -> i64 {
        self.genesis_work
    }
}
