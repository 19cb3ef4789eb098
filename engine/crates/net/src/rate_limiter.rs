use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

/// Configuration for connection caps and the per-session command throttle.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_connections_total: usize,
    pub max_connections_per_ip: usize,
    pub max_commands_per_second: u32,
    /// Longest accepted text frame, in bytes.
    pub max_input_length: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_connections_total: 1000,
            max_connections_per_ip: 5,
            max_commands_per_second: 20,
            max_input_length: 4096,
        }
    }
}

/// Reason a connection was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitRejection {
    #[error("server at max connections")]
    TotalLimitReached,
    #[error("too many connections from this IP")]
    IpLimitReached,
}

/// Tracks connection counts per IP and total.
#[derive(Debug)]
pub struct ConnectionLimiter {
    config: RateLimitConfig,
    total: usize,
    per_ip: BTreeMap<IpAddr, usize>,
}

pub type SharedLimiter = Arc<Mutex<ConnectionLimiter>>;

impl ConnectionLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            total: 0,
            per_ip: BTreeMap::new(),
        }
    }

    pub fn shared(config: RateLimitConfig) -> SharedLimiter {
        Arc::new(Mutex::new(Self::new(config)))
    }

    pub fn try_admit(&mut self, ip: IpAddr) -> Result<(), RateLimitRejection> {
        if self.total >= self.config.max_connections_total {
            return Err(RateLimitRejection::TotalLimitReached);
        }
        let count = self.per_ip.entry(ip).or_insert(0);
        if *count >= self.config.max_connections_per_ip {
            return Err(RateLimitRejection::IpLimitReached);
        }
        *count += 1;
        self.total += 1;
        Ok(())
    }

    pub fn release(&mut self, ip: IpAddr) {
        if let Some(count) = self.per_ip.get_mut(&ip) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.per_ip.remove(&ip);
            }
        }
        self.total = self.total.saturating_sub(1);
    }

    pub fn total_connections(&self) -> usize {
        self.total
    }
}

fn lock(limiter: &SharedLimiter) -> MutexGuard<'_, ConnectionLimiter> {
    // Counters stay consistent even if a holder panicked mid-update.
    limiter.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Holds one admitted connection slot; releases it on drop.
#[derive(Debug)]
pub struct ConnectionSlot {
    limiter: SharedLimiter,
    ip: IpAddr,
}

impl ConnectionSlot {
    pub fn acquire(limiter: &SharedLimiter, ip: IpAddr) -> Result<Self, RateLimitRejection> {
        lock(limiter).try_admit(ip)?;
        Ok(Self {
            limiter: Arc::clone(limiter),
            ip,
        })
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        lock(&self.limiter).release(self.ip);
    }
}

/// Per-session token-bucket command throttle.
#[derive(Debug)]
pub struct CommandThrottle {
    max_per_second: u32,
    tokens: u32,
    last_refill: Instant,
}

impl CommandThrottle {
    pub fn new(max_per_second: u32) -> Self {
        Self {
            max_per_second,
            tokens: max_per_second,
            last_refill: Instant::now(),
        }
    }

    /// Try to consume one command token. Returns true if allowed.
    pub fn try_consume(&mut self) -> bool {
        self.refill(Instant::now());
        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill);
        let new_tokens = (elapsed.as_secs_f64() * self.max_per_second as f64) as u32;
        if new_tokens > 0 {
            self.tokens = (self.tokens + new_tokens).min(self.max_per_second);
            self.last_refill = now;
        }
    }
}
