use rand::Rng;
use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_PORT: u16 = 24224;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("invalid endpoint '{0}': expected host[:port]")]
    InvalidEndpoint(String),
    #[error("primary server list must not be empty")]
    EmptyPrimary,
}

/// A collection server address. Value equality; immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parses `host` or `host:port`, defaulting to port 24224. Hosts are
    /// names or IPv4 addresses; bare IPv6 literals are rejected rather than
    /// mis-split on their colons.
    pub fn parse(s: &str) -> Result<Self, PoolError> {
        let s = s.trim();
        if s.is_empty() || s.bytes().filter(|b| *b == b':').count() > 1 {
            return Err(PoolError::InvalidEndpoint(s.to_string()));
        }
        match s.split_once(':') {
            Some((host, port)) => {
                if host.is_empty() {
                    return Err(PoolError::InvalidEndpoint(s.to_string()));
                }
                let port = port
                    .parse::<u16>()
                    .map_err(|_| PoolError::InvalidEndpoint(s.to_string()))?;
                Ok(Self::new(host, port))
            }
            None => Ok(Self::new(s, DEFAULT_PORT)),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Primary and secondary endpoint lists, fixed at startup.
#[derive(Debug, Clone)]
pub struct ServerPool {
    primary: Vec<Endpoint>,
    secondary: Vec<Endpoint>,
}

impl ServerPool {
    pub fn new(primary: Vec<Endpoint>, secondary: Vec<Endpoint>) -> Result<Self, PoolError> {
        if primary.is_empty() {
            return Err(PoolError::EmptyPrimary);
        }
        Ok(Self { primary, secondary })
    }

    pub fn primary(&self) -> &[Endpoint] {
        &self.primary
    }

    pub fn secondary(&self) -> &[Endpoint] {
        &self.secondary
    }
}

/// Tie-break rule for choosing among the live endpoints of a pool.
/// Pluggable so the failover state machine is testable deterministically.
pub trait PickStrategy: Send {
    /// Returns an index in `0..len`. `len` is always at least 1.
    fn pick(&mut self, len: usize) -> usize;
}

/// Default strategy: uniform random choice.
#[derive(Debug, Default)]
pub struct UniformPick;

impl PickStrategy for UniformPick {
    fn pick(&mut self, len: usize) -> usize {
        if len <= 1 {
            0
        } else {
            rand::rng().random_range(0..len)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    UsingPrimary,
    UsingSecondary,
}

/// Tracks which pool is in use, which endpoints have failed in the current
/// failover episode, and the currently active endpoint.
///
/// Transitions: `UsingPrimary -> UsingSecondary` when every primary entry
/// has failed, back to `UsingPrimary` (after a backoff delay) when the
/// secondary pool is exhausted or empty, and to `UsingPrimary` immediately
/// on [`reset`](Self::reset).
pub struct PoolSelector {
    pool: ServerPool,
    state: PoolState,
    failed: HashSet<Endpoint>,
    active: Option<Endpoint>,
    strategy: Box<dyn PickStrategy>,
    backoff: Duration,
    retry_after: Option<Instant>,
}

impl PoolSelector {
    pub fn new(pool: ServerPool, backoff: Duration) -> Self {
        Self::with_strategy(pool, backoff, Box::new(UniformPick))
    }

    pub fn with_strategy(
        pool: ServerPool,
        backoff: Duration,
        strategy: Box<dyn PickStrategy>,
    ) -> Self {
        Self {
            pool,
            state: PoolState::UsingPrimary,
            failed: HashSet::new(),
            active: None,
            strategy,
            backoff,
            retry_after: None,
        }
    }

    pub fn state(&self) -> PoolState {
        self.state
    }

    /// Returns the endpoint to use for the next flush, or `None` while the
    /// selector is in its cross-pool backoff window. Sticky: once selected,
    /// the same endpoint is returned until it fails or the selector resets.
    pub fn select(&mut self) -> Option<Endpoint> {
        if let Some(active) = &self.active {
            return Some(active.clone());
        }
        if let Some(until) = self.retry_after {
            if Instant::now() < until {
                return None;
            }
            self.retry_after = None;
        }

        let candidates: Vec<Endpoint> = self
            .current_pool()
            .iter()
            .filter(|ep| !self.failed.contains(*ep))
            .cloned()
            .collect();
        // Pool transitions clear the failure set, so this is never empty.
        let idx = self.strategy.pick(candidates.len());
        let chosen = candidates[idx].clone();
        self.active = Some(chosen.clone());
        Some(chosen)
    }

    /// Records a connect or send failure against `endpoint`, advancing the
    /// failover state machine when the active pool is exhausted.
    pub fn mark_failed(&mut self, endpoint: &Endpoint) {
        self.active = None;
        self.failed.insert(endpoint.clone());
        if self.current_pool().iter().any(|ep| !self.failed.contains(ep)) {
            return;
        }
        self.advance_exhausted_pool();
    }

    /// Treats every endpoint of the active pool as failed at once.
    pub fn mark_all_failed(&mut self) {
        self.active = None;
        for ep in self.current_pool().to_vec() {
            self.failed.insert(ep);
        }
        self.advance_exhausted_pool();
    }

    /// A confirmed send: the failover episode is over.
    pub fn mark_success(&mut self) {
        self.failed.clear();
        self.retry_after = None;
    }

    /// Forced-reconnect path: back to the primary pool with a clean slate,
    /// no backoff.
    pub fn reset(&mut self) {
        self.state = PoolState::UsingPrimary;
        self.failed.clear();
        self.active = None;
        self.retry_after = None;
    }

    fn current_pool(&self) -> &[Endpoint] {
        match self.state {
            PoolState::UsingPrimary => self.pool.primary(),
            PoolState::UsingSecondary => self.pool.secondary(),
        }
    }

    fn advance_exhausted_pool(&mut self) {
        match self.state {
            PoolState::UsingPrimary if !self.pool.secondary().is_empty() => {
                info!("primary pool exhausted, failing over to secondary servers");
                self.state = PoolState::UsingSecondary;
                self.failed.clear();
            }
            _ => {
                let delay = jittered(self.backoff);
                warn!(
                    backoff_ms = delay.as_millis() as u64,
                    "all server pools exhausted, retrying primary after backoff"
                );
                self.state = PoolState::UsingPrimary;
                self.failed.clear();
                self.retry_after = Some(Instant::now() + delay);
            }
        }
    }
}

impl fmt::Debug for PoolSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolSelector")
            .field("state", &self.state)
            .field("failed", &self.failed)
            .field("active", &self.active)
            .field("retry_after", &self.retry_after)
            .finish()
    }
}

/// +/-50% jitter, so agents restarted together do not re-probe in lockstep.
fn jittered(base: Duration) -> Duration {
    let factor = rand::rng().random_range(0.5..1.5);
    Duration::from_millis((base.as_millis() as f64 * factor) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic strategy: always the first live candidate.
    struct FirstPick;

    impl PickStrategy for FirstPick {
        fn pick(&mut self, _len: usize) -> usize {
            0
        }
    }

    fn pool(primary: &[&str], secondary: &[&str]) -> ServerPool {
        let parse = |list: &[&str]| {
            list.iter()
                .map(|s| Endpoint::parse(s).unwrap())
                .collect::<Vec<_>>()
        };
        ServerPool::new(parse(primary), parse(secondary)).unwrap()
    }

    fn selector(primary: &[&str], secondary: &[&str]) -> PoolSelector {
        PoolSelector::with_strategy(
            pool(primary, secondary),
            Duration::from_millis(50),
            Box::new(FirstPick),
        )
    }

    #[test]
    fn endpoint_parse_defaults_port() {
        let ep = Endpoint::parse("logs.example.com").unwrap();
        assert_eq!(ep, Endpoint::new("logs.example.com", 24224));

        let ep = Endpoint::parse("logs.example.com:9999").unwrap();
        assert_eq!(ep.port, 9999);
    }

    #[test]
    fn endpoint_parse_rejects_garbage() {
        assert!(Endpoint::parse("").is_err());
        assert!(Endpoint::parse("host:notaport").is_err());
        assert!(Endpoint::parse(":24224").is_err());
    }

    #[test]
    fn endpoint_parse_rejects_ipv6_literals() {
        assert!(Endpoint::parse("::1").is_err());
        assert!(Endpoint::parse("2001:db8::1").is_err());
        assert!(Endpoint::parse("2001:db8::1:24224").is_err());
    }

    #[test]
    fn pool_requires_primary() {
        assert!(ServerPool::new(vec![], vec![]).is_err());
    }

    #[test]
    fn selection_is_sticky_until_failure() {
        let mut sel = selector(&["a", "b"], &[]);
        let first = sel.select().unwrap();
        assert_eq!(sel.select().unwrap(), first);

        sel.mark_failed(&first);
        let second = sel.select().unwrap();
        assert_ne!(second, first);
    }

    #[test]
    fn fails_over_to_secondary_after_primary_exhaustion() {
        let mut sel = selector(&["a"], &["b"]);

        let ep = sel.select().unwrap();
        assert_eq!(ep.host, "a");
        sel.mark_failed(&ep);

        assert_eq!(sel.state(), PoolState::UsingSecondary);
        assert_eq!(sel.select().unwrap().host, "b");
    }

    #[test]
    fn cycles_back_to_primary_after_secondary_exhaustion() {
        let mut sel = selector(&["a"], &["b"]);
        let a = sel.select().unwrap();
        sel.mark_failed(&a);
        let b = sel.select().unwrap();
        sel.mark_failed(&b);

        assert_eq!(sel.state(), PoolState::UsingPrimary);
        // In the backoff window nothing is selectable.
        assert!(sel.select().is_none());

        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(sel.select().unwrap().host, "a");
    }

    #[test]
    fn empty_secondary_goes_straight_to_backoff() {
        let mut sel = selector(&["a"], &[]);
        let a = sel.select().unwrap();
        sel.mark_failed(&a);

        assert_eq!(sel.state(), PoolState::UsingPrimary);
        assert!(sel.select().is_none());
    }

    #[test]
    fn success_ends_the_failover_episode() {
        let mut sel = selector(&["a", "b"], &[]);
        let first = sel.select().unwrap();
        sel.mark_failed(&first);
        let second = sel.select().unwrap();

        sel.mark_success();
        // The failed endpoint is eligible again once the episode ends.
        sel.mark_failed(&second);
        assert_eq!(sel.select().unwrap(), first);
    }

    #[test]
    fn reset_returns_to_primary_mid_failover() {
        let mut sel = selector(&["a"], &["b"]);
        let a = sel.select().unwrap();
        sel.mark_failed(&a);
        assert_eq!(sel.state(), PoolState::UsingSecondary);

        sel.reset();
        assert_eq!(sel.state(), PoolState::UsingPrimary);
        assert_eq!(sel.select().unwrap().host, "a");
    }

    #[test]
    fn mark_all_failed_advances_immediately() {
        let mut sel = selector(&["a", "b"], &["c"]);
        sel.mark_all_failed();
        assert_eq!(sel.state(), PoolState::UsingSecondary);
        assert_eq!(sel.select().unwrap().host, "c");
    }

    #[test]
    fn uniform_pick_stays_in_bounds() {
        let mut strategy = UniformPick;
        for len in 1..=8 {
            for _ in 0..64 {
                assert!(strategy.pick(len) < len);
            }
        }
    }
}
