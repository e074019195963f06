/// Anti-abuse policy seam
///
/// The engine only asks yes/no questions; `MemoryPolicy` answers them from
/// per-IP counters kept in process.

use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::time::{Duration, Instant};

pub trait Policy: Send + Sync {
    fn is_banned(&self, ip: IpAddr) -> bool;

    /// Connection-rate gate, consulted once per accepted socket.
    fn apply_limit_policy(&self, ip: IpAddr) -> bool;

    /// False if `login` or `ip` is blacklisted.
    fn apply_login_policy(&self, login: &str, ip: IpAddr) -> bool;

    fn apply_malformed_policy(&self, ip: IpAddr);

    /// Record a share outcome. False once the invalid ratio is over the limit.
    fn apply_share_policy(&self, ip: IpAddr, accepted: bool) -> bool;

    fn ban_client(&self, ip: IpAddr);
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct PolicyConfig {
    pub ban_timeout_secs: u64,
    /// New connections allowed per IP per window.
    pub connection_limit: u32,
    pub limit_window_secs: u64,
    pub malformed_limit: u32,
    /// Shares counted before the invalid ratio is judged.
    pub check_threshold: u32,
    pub invalid_percent: f64,
    pub login_blacklist: Vec<String>,
    pub ip_blacklist: Vec<IpAddr>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            ban_timeout_secs: 1800,
            connection_limit: 30,
            limit_window_secs: 60,
            malformed_limit: 5,
            check_threshold: 30,
            invalid_percent: 30.0,
            login_blacklist: Vec::new(),
            ip_blacklist: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct IpStats {
    window_start: Instant,
    connections: u32,
    malformed: u32,
    valid_shares: u32,
    invalid_shares: u32,
}

impl IpStats {
    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            connections: 0,
            malformed: 0,
            valid_shares: 0,
            invalid_shares: 0,
        }
    }
}

#[derive(Default)]
struct PolicyState {
    stats: HashMap<IpAddr, IpStats>,
    banned: HashMap<IpAddr, Instant>,
}

pub struct MemoryPolicy {
    config: PolicyConfig,
    login_blacklist: HashSet<String>,
    ip_blacklist: HashSet<IpAddr>,
    state: Mutex<PolicyState>,
}

impl MemoryPolicy {
    pub fn new(config: PolicyConfig) -> Self {
        let login_blacklist = config.login_blacklist.iter().map(|l| l.to_lowercase()).collect();
        let ip_blacklist = config.ip_blacklist.iter().copied().collect();
        Self {
            config,
            login_blacklist,
            ip_blacklist,
            state: Mutex::new(PolicyState::default()),
        }
    }

    fn ban_timeout(&self) -> Duration {
        Duration::from_secs(self.config.ban_timeout_secs)
    }

    fn ban_locked(&self, state: &mut PolicyState, ip: IpAddr, reason: &str) {
        if state.banned.insert(ip, Instant::now() + self.ban_timeout()).is_none() {
            tracing::warn!("🚫 Banned {} for {}s: {}", ip, self.config.ban_timeout_secs, reason);
        }
        state.stats.remove(&ip);
    }

    /// Drop expired bans and idle counters.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let window = Duration::from_secs(self.config.limit_window_secs);
        let mut state = self.state.lock();
        let before = state.banned.len();
        state.banned.retain(|_, until| *until > now);
        state
            .stats
            .retain(|_, s| now.duration_since(s.window_start) < window * 4);
        before - state.banned.len()
    }

    pub fn banned_count(&self) -> usize {
        self.state.lock().banned.len()
    }
}

impl Policy for MemoryPolicy {
    fn is_banned(&self, ip: IpAddr) -> bool {
        if self.ip_blacklist.contains(&ip) {
            return true;
        }
        let mut state = self.state.lock();
        match state.banned.get(&ip) {
            Some(until) if *until > Instant::now() => true,
            Some(_) => {
                state.banned.remove(&ip);
                false
            }
            None => false,
        }
    }

    fn apply_limit_policy(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let window = Duration::from_secs(self.config.limit_window_secs);
        let mut state = self.state.lock();
        let stats = state.stats.entry(ip).or_insert_with(|| IpStats::new(now));
        if now.duration_since(stats.window_start) >= window {
            stats.window_start = now;
            stats.connections = 0;
        }
        stats.connections += 1;
        stats.connections <= self.config.connection_limit
    }

    fn apply_login_policy(&self, login: &str, ip: IpAddr) -> bool {
        if self.ip_blacklist.contains(&ip) {
            return false;
        }
        if self.login_blacklist.contains(&login.to_lowercase()) {
            let mut state = self.state.lock();
            self.ban_locked(&mut state, ip, "blacklisted login");
            return false;
        }
        true
    }

    fn apply_malformed_policy(&self, ip: IpAddr) {
        let now = Instant::now();
        let mut state = self.state.lock();
        let stats = state.stats.entry(ip).or_insert_with(|| IpStats::new(now));
        stats.malformed += 1;
        if stats.malformed > self.config.malformed_limit {
            self.ban_locked(&mut state, ip, "malformed requests");
        }
    }

    fn apply_share_policy(&self, ip: IpAddr, accepted: bool) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock();
        let stats = state.stats.entry(ip).or_insert_with(|| IpStats::new(now));
        if accepted {
            stats.valid_shares += 1;
        } else {
            stats.invalid_shares += 1;
        }

        let total = stats.valid_shares + stats.invalid_shares;
        if total < self.config.check_threshold.max(1) {
            return true;
        }

        let ratio = stats.invalid_shares as f64 * 100.0 / total as f64;
        stats.valid_shares = 0;
        stats.invalid_shares = 0;
        if ratio >= self.config.invalid_percent {
            self.ban_locked(&mut state, ip, "invalid share rate");
            return false;
        }
        true
    }

    fn ban_client(&self, ip: IpAddr) {
        let mut state = self.state.lock();
        self.ban_locked(&mut state, ip, "flood or idle timeout");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn test_connection_limit() {
        let policy = MemoryPolicy::new(PolicyConfig {
            connection_limit: 2,
            ..Default::default()
        });
        assert!(policy.apply_limit_policy(ip(1)));
        assert!(policy.apply_limit_policy(ip(1)));
        assert!(!policy.apply_limit_policy(ip(1)));
        assert!(policy.apply_limit_policy(ip(2)));
    }

    #[test]
    fn test_login_blacklist_bans() {
        let policy = MemoryPolicy::new(PolicyConfig {
            login_blacklist: vec!["1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa".to_string()],
            ..Default::default()
        });
        assert!(policy.apply_login_policy("3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy", ip(1)));
        assert!(!policy.apply_login_policy("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa", ip(1)));
        assert!(policy.is_banned(ip(1)));
    }

    #[test]
    fn test_ip_blacklist() {
        let policy = MemoryPolicy::new(PolicyConfig {
            ip_blacklist: vec![ip(9)],
            ..Default::default()
        });
        assert!(policy.is_banned(ip(9)));
        assert!(!policy.apply_login_policy("anything", ip(9)));
        assert!(!policy.is_banned(ip(8)));
    }

    #[test]
    fn test_malformed_budget() {
        let policy = MemoryPolicy::new(PolicyConfig {
            malformed_limit: 2,
            ..Default::default()
        });
        policy.apply_malformed_policy(ip(1));
        policy.apply_malformed_policy(ip(1));
        assert!(!policy.is_banned(ip(1)));
        policy.apply_malformed_policy(ip(1));
        assert!(policy.is_banned(ip(1)));
    }

    #[test]
    fn test_invalid_share_ratio() {
        let policy = MemoryPolicy::new(PolicyConfig {
            check_threshold: 4,
            invalid_percent: 50.0,
            ..Default::default()
        });
        assert!(policy.apply_share_policy(ip(1), true));
        assert!(policy.apply_share_policy(ip(1), true));
        assert!(policy.apply_share_policy(ip(1), true));
        // 1 of 4 invalid, under the limit; counters reset
        assert!(policy.apply_share_policy(ip(1), false));

        assert!(policy.apply_share_policy(ip(1), false));
        assert!(policy.apply_share_policy(ip(1), false));
        assert!(policy.apply_share_policy(ip(1), true));
        assert!(!policy.apply_share_policy(ip(1), false));
        assert!(policy.is_banned(ip(1)));
    }

    #[test]
    fn test_ban_expiry() {
        let policy = MemoryPolicy::new(PolicyConfig {
            ban_timeout_secs: 0,
            ..Default::default()
        });
        policy.ban_client(ip(1));
        assert_eq!(policy.banned_count(), 1);
        assert!(!policy.is_banned(ip(1)));
        assert_eq!(policy.banned_count(), 0);

        policy.ban_client(ip(2));
        assert_eq!(policy.sweep(), 1);
    }
}
