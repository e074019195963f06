/// Work source seam - block templates in, share verdicts out
///
/// The Stratum engine never builds templates or checks proof-of-work
/// itself; it asks a `WorkSource`. `TemplateStore` is the in-process
/// implementation the binary runs with, fed by `TemplateRefresher`.

pub mod refresher;
pub mod store;
pub mod template;

use std::net::IpAddr;
use std::sync::Arc;

pub use refresher::TemplateRefresher;
pub use store::TemplateStore;
pub use template::{BlockTemplate, TemplateJob};

/// Everything the work source needs to judge one `mining.submit`.
#[derive(Debug, Clone)]
pub struct ShareSubmission<'a> {
    pub login: &'a str,
    pub worker: &'a str,
    pub extranonce1: &'a str,
    pub ip: IpAddr,
    /// Session difficulty, `2^256 / target`, saturated into i64.
    pub difficulty: i64,
    pub template: Option<Arc<BlockTemplate>>,
    /// Raw submit params: worker, job id, extranonce2, ntime, nonce, ...
    pub params: &'a [String],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShareVerdict {
    pub duplicate: bool,
    pub valid: bool,
}

pub trait WorkSource: Send + Sync {
    fn current_block_template(&self) -> Option<Arc<BlockTemplate>>;

    fn process_share(&self, share: &ShareSubmission<'_>) -> ShareVerdict;

    /// Upstream is unhealthy; no jobs should go out.
    fn is_sick(&self) -> bool;

    /// Hash count of the difficulty-1 target, used to scale miner difficulty.
    fn genesis_work(&self) -> i64;
}
