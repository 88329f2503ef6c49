//! Rate limiting module for the churn server
//!
//! Sliding-window limiting keyed by client address: a client may make at
//! most `max_requests` requests in any `window`-long interval.

use crate::config::RateLimitSettings;
use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use warp::Filter;

/// Body of every 429 response.
pub const RATE_LIMIT_DETAIL: &str = "Rate limit exceeded. Please try again later.";

// =============================================================================
// Configuration
// =============================================================================

/// Rate limiting configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Whether rate limiting is enabled
    pub enabled: bool,
    /// Maximum requests per client per window
    pub max_requests: u32,
    /// Window length
    pub window: Duration,
    /// Maximum number of tracked IP addresses (prevents memory exhaustion)
    pub max_tracked_ips: usize,
}

impl RateLimitConfig {
    /// Default maximum number of tracked IP addresses.
    const DEFAULT_MAX_TRACKED_IPS: usize = 10_000;

    /// Create a disabled rate limit config
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            max_requests: 0,
            window: Duration::ZERO,
            max_tracked_ips: Self::DEFAULT_MAX_TRACKED_IPS,
        }
    }

    /// Allow `max_requests` per `window`
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            enabled: true,
            max_requests,
            window,
            max_tracked_ips: Self::DEFAULT_MAX_TRACKED_IPS,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::disabled()
    }
}

impl From<&RateLimitSettings> for RateLimitConfig {
    fn from(settings: &RateLimitSettings) -> Self {
        if !settings.enabled {
            return Self::disabled();
        }
        Self {
            enabled: true,
            max_requests: settings.requests,
            window: Duration::from_secs(settings.window_secs),
            max_tracked_ips: settings.max_tracked_ips,
        }
    }
}

// =============================================================================
// Sliding window
// =============================================================================

/// Timestamps of one client's requests inside the current window
#[derive(Debug, Clone, Default)]
struct RequestLog {
    /// Oldest first, never longer than `max_requests`
    hits: VecDeque<Instant>,
    /// Last time this client was seen (allowed or not)
    last_seen: Option<Instant>,
}

impl RequestLog {
    /// Drop hits that have left the window ending at `now`
    fn expire(&mut self, now: Instant, window: Duration) {
        while let Some(front) = self.hits.front() {
            if now.duration_since(*front) >= window {
                self.hits.pop_front();
            } else {
                break;
            }
        }
    }

    /// Record a request at `now` if the window has room
    fn try_record(&mut self, now: Instant, window: Duration, max_requests: u32) -> bool {
        self.last_seen = Some(now);
        self.expire(now, window);
        if self.hits.len() < max_requests as usize {
            self.hits.push_back(now);
            true
        } else {
            false
        }
    }

    /// Requests still available in the window
    fn remaining(&self, max_requests: u32) -> u32 {
        (max_requests as usize).saturating_sub(self.hits.len()) as u32
    }

    /// Time until the oldest hit leaves the window
    fn reset_after(&self, now: Instant, window: Duration) -> Duration {
        match self.hits.front() {
            Some(oldest) => window.saturating_sub(now.duration_since(*oldest)),
            None => Duration::ZERO,
        }
    }
}

// =============================================================================
// Rate Limiter
// =============================================================================

/// Rate limiter with per-IP tracking
pub struct RateLimiter {
    config: RateLimitConfig,
    clients: RwLock<HashMap<IpAddr, RequestLog>>,
    limited_counter: Option<prometheus::Counter>,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            clients: RwLock::new(HashMap::new()),
            limited_counter: None,
        }
    }

    /// Increment `counter` on every refused request
    pub fn with_limited_counter(mut self, counter: prometheus::Counter) -> Self {
        self.limited_counter = Some(counter);
        self
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check if a request from the given IP should be allowed
    pub async fn check(&self, ip: IpAddr) -> RateLimitResult {
        self.check_at(ip, Instant::now()).await
    }

    /// Same as [`check`](Self::check) with an explicit clock reading
    pub async fn check_at(&self, ip: IpAddr, now: Instant) -> RateLimitResult {
        if !self.config.enabled {
            return RateLimitResult::Allowed {
                remaining: u32::MAX,
                reset_after: Duration::ZERO,
            };
        }

        let mut clients = self.clients.write().await;

        // Evict least recently seen entry if at capacity and this is a new IP
        if !clients.contains_key(&ip) && clients.len() >= self.config.max_tracked_ips {
            let oldest_ip = clients
                .iter()
                .min_by_key(|(_, log)| log.last_seen)
                .map(|(ip, _)| *ip);
            if let Some(ip_to_evict) = oldest_ip {
                clients.remove(&ip_to_evict);
            }
        }

        let log = clients.entry(ip).or_default();
        let window = self.config.window;

        if log.try_record(now, window, self.config.max_requests) {
            RateLimitResult::Allowed {
                remaining: log.remaining(self.config.max_requests),
                reset_after: log.reset_after(now, window),
            }
        } else {
            if let Some(counter) = &self.limited_counter {
                counter.inc();
            }
            RateLimitResult::Limited {
                retry_after: log.reset_after(now, window),
            }
        }
    }

    /// Forget clients idle for longer than `max_age` (call periodically)
    pub async fn cleanup(&self, max_age: Duration) {
        self.cleanup_at(max_age, Instant::now()).await
    }

    async fn cleanup_at(&self, max_age: Duration, now: Instant) {
        let mut clients = self.clients.write().await;
        clients.retain(|_, log| match log.last_seen {
            Some(seen) => now.duration_since(seen) < max_age,
            None => false,
        });
    }

    /// Get number of tracked clients
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

/// Result of a rate limit check
#[derive(Debug, Clone)]
pub enum RateLimitResult {
    /// Request is allowed
    Allowed {
        /// Remaining requests in current window
        remaining: u32,
        /// Time until the oldest counted request expires
        reset_after: Duration,
    },
    /// Request is rate limited
    Limited {
        /// Time until next request is allowed
        retry_after: Duration,
    },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed { .. })
    }
}

/// Spawn a task that prunes idle clients once per window
pub fn spawn_cleanup(limiter: Arc<RateLimiter>) -> Option<tokio::task::JoinHandle<()>> {
    if !limiter.config.enabled || limiter.config.window.is_zero() {
        return None;
    }
    let window = limiter.config.window;
    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(window);
        loop {
            interval.tick().await;
            limiter.cleanup(window).await;
            let clients = limiter.client_count().await;
            tracing::debug!(clients, "Pruned idle rate limit entries");
        }
    }))
}

// =============================================================================
// Warp Filter
// =============================================================================

/// Warp rejection type for rate limiting
#[derive(Debug)]
pub struct RateLimitRejection {
    pub retry_after_secs: u64,
}

impl warp::reject::Reject for RateLimitRejection {}

/// Create a warp filter that applies rate limiting
pub fn with_rate_limit(
    limiter: Arc<RateLimiter>,
) -> impl warp::Filter<Extract = (RateLimitHeaders,), Error = warp::Rejection> + Clone {
    warp::addr::remote().and_then(move |addr: Option<std::net::SocketAddr>| {
        let limiter = limiter.clone();
        async move {
            // Get client IP (use localhost if not available)
            let ip = addr
                .map(|a| a.ip())
                .unwrap_or(IpAddr::V4(std::net::Ipv4Addr::LOCALHOST));

            match limiter.check(ip).await {
                RateLimitResult::Allowed {
                    remaining,
                    reset_after,
                } => Ok(RateLimitHeaders {
                    remaining,
                    reset_after_secs: ceil_secs(reset_after),
                }),
                RateLimitResult::Limited { retry_after } => {
                    tracing::warn!(client = %ip, "Rate limit exceeded");
                    Err(warp::reject::custom(RateLimitRejection {
                        retry_after_secs: ceil_secs(retry_after).max(1),
                    }))
                }
            }
        }
    })
}

fn ceil_secs(d: Duration) -> u64 {
    if d.subsec_nanos() > 0 {
        d.as_secs() + 1
    } else {
        d.as_secs()
    }
}

/// Headers to include in response
#[derive(Debug, Clone)]
pub struct RateLimitHeaders {
    pub remaining: u32,
    pub reset_after_secs: u64,
}

/// Handle rate limit rejection in recovery
pub fn handle_rate_limit_rejection(rejection: &warp::Rejection) -> Option<warp::reply::Response> {
    use warp::Reply;

    rejection.find::<RateLimitRejection>().map(|r| {
        let json = warp::reply::json(&serde_json::json!({ "detail": RATE_LIMIT_DETAIL }));
        let reply = warp::reply::with_status(json, warp::http::StatusCode::TOO_MANY_REQUESTS);
        warp::reply::with_header(reply, "retry-after", r.retry_after_secs.to_string())
            .into_response()
    })
}

// =============================================================================
// Tests
// =============================================================================
