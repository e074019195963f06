/// Stratum method handlers
///
/// One handler per JSON-RPC method. Protocol errors become error replies and
/// the connection stays up; only transport failures, a failed difficulty
/// push and the code-23 invalid-share limit end the session.

use anyhow::Result;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use super::protocol::{
    StratumError, StratumPush, StratumRequest, StratumResponse, BIP320_MASK, BIP320_MASK_STR,
    EXTRANONCE2_SIZE,
};
use super::server::StratumServer;
use super::session::{Session, DEFAULT_WORKER};
use crate::address::is_valid_btc_address;
use crate::difficulty;
use crate::logging::SHARE_LOG_TARGET;
use crate::metrics::prometheus as metrics;
use crate::work::{ShareSubmission, ShareVerdict};

/// What the read loop does after a message was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

/// Result of one share after the work source and the policy had their say.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareOutcome {
    Accepted,
    /// Valid, but the IP is over its invalid-share limit.
    AcceptedOverLimit,
    /// Invalid, silently rejected.
    Rejected,
    /// Invalid and over the limit; the connection is dropped.
    RejectedOverLimit,
    Duplicate,
}

pub fn decide_share(verdict: ShareVerdict, within_limit: bool) -> ShareOutcome {
    if verdict.duplicate {
        return ShareOutcome::Duplicate;
    }
    match (verdict.valid, within_limit) {
        (true, true) => ShareOutcome::Accepted,
        (true, false) => ShareOutcome::AcceptedOverLimit,
        (false, true) => ShareOutcome::Rejected,
        (false, false) => ShareOutcome::RejectedOverLimit,
    }
}

/// First 32 hex chars of `sha256("ip,pool_id,tag")`.
pub fn subscription_id(ip: &str, pool_id: u16, tag: u16) -> String {
    let digest = Sha256::digest(format!("{},{},{}", ip, pool_id, tag).as_bytes());
    let mut sid = hex::encode(digest);
    sid.truncate(32);
    sid
}

/// `%08x` of `pool_id << 16 | tag`; unique per live slot.
pub fn extranonce1(pool_id: u16, tag: u16) -> String {
    format!("{:08x}", (pool_id as u32) << 16 | tag as u32)
}

/// `[0-9a-zA-Z._-]{1,64}`
pub fn is_valid_worker(worker: &str) -> bool {
    !worker.is_empty()
        && worker.len() <= 64
        && worker
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'-')
}

/// Exactly eight lowercase hex digits.
pub fn is_valid_nonce_field(field: &str) -> bool {
    field.len() == 8 && field.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

impl StratumServer {
    pub(crate) async fn handle_message(
        &self,
        session: &Arc<Session>,
        request: StratumRequest,
    ) -> Result<Flow> {
        tracing::debug!("🔧 {} from {}: {}", request.method, session.ip(), request.params);

        match request.method.as_str() {
            "mining.subscribe" => self.handle_subscribe(session, request).await,
            "mining.authorize" => self.handle_authorize(session, request).await,
            "mining.submit" => self.handle_submit(session, request).await,
            "mining.extranonce.subscribe" => {
                session
                    .send(&StratumResponse::success(request.id, Value::Bool(true)))
                    .await?;
                Ok(Flow::Continue)
            }
            "mining.configure" => self.handle_configure(session, request).await,
            _ => self.handle_unknown(session, request).await,
        }
    }

    async fn handle_subscribe(
        &self,
        session: &Arc<Session>,
        request: StratumRequest,
    ) -> Result<Flow> {
        if let Some(agent) = request.params.get(0).and_then(Value::as_str) {
            tracing::info!("📡 mining.subscribe from {}: {}", session.ip(), agent);
        }

        let pool_id = self.settings.pool_id;
        let sid = subscription_id(&session.ip().to_string(), pool_id, session.tag());
        let en1 = extranonce1(pool_id, session.tag());
        session.subscribe(&self.settings.default_target, sid.clone(), en1.clone());
        self.registry.register(session.clone()).await;
        tracing::info!(
            "⛏️  Stratum miner subscribed from {} (sid={}, en1={})",
            session.ip(),
            sid,
            en1
        );

        let reply = json!([
            [["mining.set_difficulty", sid], ["mining.notify", sid]],
            en1,
            EXTRANONCE2_SIZE
        ]);
        session.send(&StratumResponse::success(request.id, reply)).await?;

        let next_target = session.snapshot().target_next_job;
        let genesis_work = self.work.genesis_work();
        let Some(diff) = difficulty::stratum_difficulty(&next_target, genesis_work) else {
            tracing::error!(
                "set difficulty failed for {}: genesis work {} unusable",
                session.ip(),
                genesis_work
            );
            return Ok(Flow::Close);
        };
        session
            .send(&StratumPush::new("mining.set_difficulty", json!([diff])))
            .await?;

        if session.version_mask() != 0 {
            session
                .send(&StratumPush::new("mining.set_version_mask", json!([BIP320_MASK_STR])))
                .await?;
        }
        Ok(Flow::Continue)
    }

    async fn handle_authorize(
        &self,
        session: &Arc<Session>,
        request: StratumRequest,
    ) -> Result<Flow> {
        let params = request.string_params().unwrap_or_default();
        let Some(first) = params.first() else {
            session
                .send(&StratumResponse::error(request.id, StratumError::invalid_params()))
                .await?;
            return Ok(Flow::Continue);
        };

        let mut parts = first.trim().split('.');
        let login = parts.next().unwrap_or_default();
        if !is_valid_btc_address(login) {
            tracing::warn!("Invalid login address {:?} from {}", login, session.ip());
            session
                .send(&StratumResponse::error(request.id, StratumError::invalid_authorize()))
                .await?;
            return Ok(Flow::Continue);
        }
        if !self.policy.apply_login_policy(login, session.ip()) {
            session
                .send(&StratumResponse::error(request.id, StratumError::blacklisted()))
                .await?;
            return Ok(Flow::Continue);
        }

        let worker = match parts.next() {
            Some(w) if is_valid_worker(w) => w,
            _ => DEFAULT_WORKER,
        };
        session.authorize(login, worker);
        tracing::info!("🔐 Stratum miner authorized {}.{}@{}", login, worker, session.ip());

        session
            .send(&StratumResponse::success(request.id, Value::Bool(true)))
            .await?;
        Ok(Flow::Continue)
    }

    async fn handle_submit(&self, session: &Arc<Session>, request: StratumRequest) -> Result<Flow> {
        if !self.registry.contains(session.key()).await {
            session
                .send(&StratumResponse::error(request.id, StratumError::not_subscribed()))
                .await?;
            return Ok(Flow::Continue);
        }

        let state = session.snapshot();
        let ip = session.ip();
        let params = match request.string_params() {
            Some(p) if p.len() >= 5 => p,
            _ => {
                self.policy.apply_malformed_policy(ip);
                tracing::error!("Malformed params from {}@{} {}", state.login, ip, request.params);
                session
                    .send(&StratumResponse::error(request.id, StratumError::invalid_params()))
                    .await?;
                return Ok(Flow::Continue);
            }
        };

        if !params[2..5].iter().all(|p| is_valid_nonce_field(p)) {
            self.policy.apply_malformed_policy(ip);
            tracing::error!("Malformed PoW result from {}@{} {:?}", state.login, ip, params);
            session
                .send(&StratumResponse::error(request.id, StratumError::malformed_pow()))
                .await?;
            return Ok(Flow::Continue);
        }

        let share = ShareSubmission {
            login: &state.login,
            worker: &state.worker,
            extranonce1: &state.extranonce1,
            ip,
            difficulty: difficulty::target_hex_to_diff_i64(&state.target),
            template: self.work.current_block_template(),
            params: &params,
        };
        let verdict = self.work.process_share(&share);
        let within_limit = self
            .policy
            .apply_share_policy(ip, !verdict.duplicate && verdict.valid);

        let (reply, flow) = match decide_share(verdict, within_limit) {
            ShareOutcome::Duplicate => {
                metrics::inc_duplicate();
                tracing::error!("Duplicate share from {}@{} {:?}", state.login, ip, params);
                tracing::info!(
                    target: SHARE_LOG_TARGET,
                    "Duplicate share from {}@{} {:?}",
                    state.login,
                    ip,
                    params
                );
                (
                    StratumResponse::error(request.id, StratumError::duplicate_share()),
                    Flow::Continue,
                )
            }
            outcome @ (ShareOutcome::Rejected | ShareOutcome::RejectedOverLimit) => {
                metrics::inc_rejected();
                tracing::error!("Invalid share from {}.{}@{}", state.login, state.worker, ip);
                tracing::info!(
                    target: SHARE_LOG_TARGET,
                    "Invalid share from {}.{}@{}",
                    state.login,
                    state.worker,
                    ip
                );
                if outcome == ShareOutcome::RejectedOverLimit {
                    (
                        StratumResponse::error(request.id, StratumError::invalid_share()),
                        Flow::Close,
                    )
                } else {
                    (StratumResponse::success(request.id, Value::Bool(false)), Flow::Continue)
                }
            }
            outcome @ (ShareOutcome::Accepted | ShareOutcome::AcceptedOverLimit) => {
                metrics::inc_accepted();
                tracing::info!("✅ Valid share from {}.{}@{}", state.login, state.worker, ip);
                tracing::info!(
                    target: SHARE_LOG_TARGET,
                    "Valid share from {}.{}@{}",
                    state.login,
                    state.worker,
                    ip
                );
                if outcome == ShareOutcome::AcceptedOverLimit {
                    (
                        StratumResponse::with_warning(
                            request.id,
                            Value::Bool(true),
                            StratumError::high_invalid_rate(),
                        ),
                        Flow::Continue,
                    )
                } else {
                    (StratumResponse::success(request.id, Value::Bool(true)), Flow::Continue)
                }
            }
        };

        session.send(&reply).await?;
        Ok(flow)
    }

    async fn handle_configure(
        &self,
        session: &Arc<Session>,
        request: StratumRequest,
    ) -> Result<Flow> {
        let error = match request.params.as_array() {
            None => Some(StratumError::illegal_params()),
            Some(p) if p.len() < 2 => Some(StratumError::too_few_params()),
            Some(p) if !p[1].is_object() => Some(StratumError::illegal_params()),
            Some(_) => None,
        };
        if let Some(error) = error {
            session.send(&StratumResponse::error(request.id, error)).await?;
            return Ok(Flow::Continue);
        }

        // The advertised mask is fixed; the real one follows subscribe.
        let reply = json!({
            "version-rolling": true,
            "version-rolling.mask": BIP320_MASK_STR,
        });
        session.set_version_mask(BIP320_MASK);
        session.send(&StratumResponse::success(request.id, reply)).await?;
        Ok(Flow::Continue)
    }

    async fn handle_unknown(
        &self,
        session: &Arc<Session>,
        request: StratumRequest,
    ) -> Result<Flow> {
        tracing::error!("Unknown request method {} from {}", request.method, session.ip());
        self.policy.apply_malformed_policy(session.ip());
        session
            .send(&StratumResponse::error(request.id, StratumError::method_not_found()))
            .await?;
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decide_share_table() {
        let v = |duplicate, valid| ShareVerdict { duplicate, valid };
        assert_eq!(decide_share(v(true, true), true), ShareOutcome::Duplicate);
        assert_eq!(decide_share(v(true, false), false), ShareOutcome::Duplicate);
        assert_eq!(decide_share(v(false, true), true), ShareOutcome::Accepted);
        assert_eq!(decide_share(v(false, true), false), ShareOutcome::AcceptedOverLimit);
        assert_eq!(decide_share(v(false, false), true), ShareOutcome::Rejected);
        assert_eq!(decide_share(v(false, false), false), ShareOutcome::RejectedOverLimit);
    }

    #[test]
    fn test_subscription_id() {
        let sid = subscription_id("127.0.0.1", 1, 7);
        assert_eq!(sid.len(), 32);
        let full = hex::encode(Sha256::digest(b"127.0.0.1,1,7"));
        assert_eq!(sid, full[..32]);
        assert_ne!(sid, subscription_id("127.0.0.1", 1, 8));
    }

    #[test]
    fn test_extranonce1() {
        assert_eq!(extranonce1(1, 7), "00010007");
        assert_eq!(extranonce1(0xabcd, 0xffff), "abcdffff");
        assert_eq!(extranonce1(0, 0), "00000000");
    }

    #[test]
    fn test_worker_label() {
        assert!(is_valid_worker("rig-01_a"));
        assert!(is_valid_worker(&"w".repeat(64)));
        assert!(!is_valid_worker(&"w".repeat(65)));
        assert!(!is_valid_worker(""));
        assert!(!is_valid_worker("rig 1"));
        assert!(!is_valid_worker("rig/1"));
    }

    #[test]
    fn test_nonce_field() {
        assert!(is_valid_nonce_field("deadbeef"));
        assert!(is_valid_nonce_field("00000000"));
        assert!(!is_valid_nonce_field("DEADBEEF"));
        assert!(!is_valid_nonce_field("deadbee"));
        assert!(!is_valid_nonce_field("deadbeef0"));
        assert!(!is_valid_nonce_field("deadbeeg"));
    }
}
