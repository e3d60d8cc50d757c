//! Fixed-window request limiting per route and client address.
//!
//! Limits are written the way operators usually write them: `1/minute`,
//! `10/5 seconds`, `100 per hour`.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, MatchedPath, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use thiserror::Error;

use crate::error::AppError;

/// Client key used when the connection address is unknown.
const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub requests: u32,
    /// Number of `unit`s in one window.
    pub multiples: u32,
    pub unit: Unit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Second,
    Minute,
    Hour,
    Day,
}

impl Unit {
    fn seconds(self) -> u64 {
        match self {
            Unit::Second => 1,
            Unit::Minute => 60,
            Unit::Hour => 60 * 60,
            Unit::Day => 24 * 60 * 60,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Unit::Second => "second",
            Unit::Minute => "minute",
            Unit::Hour => "hour",
            Unit::Day => "day",
        }
    }
}

impl FromStr for Unit {
    type Err = RateLimitParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().trim_end_matches('s') {
            "second" | "sec" => Ok(Unit::Second),
            "minute" | "min" => Ok(Unit::Minute),
            "hour" => Ok(Unit::Hour),
            "day" => Ok(Unit::Day),
            _ => Err(RateLimitParseError::Unit(s.trim().to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateLimitParseError {
    #[error("rate limit {0:?} is not of the form `<count>/<period>` or `<count> per <period>`")]
    Shape(String),
    #[error("invalid request count {0:?}")]
    Count(String),
    #[error("unknown time unit {0:?}")]
    Unit(String),
}

impl RateLimit {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.unit.seconds() * u64::from(self.multiples))
    }
}

impl FromStr for RateLimit {
    type Err = RateLimitParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let shape = || RateLimitParseError::Shape(s.to_string());
        let (count, period) = s
            .split_once('/')
            .or_else(|| s.split_once(" per "))
            .ok_or_else(shape)?;

        let count = count.trim();
        let requests: u32 = count
            .parse()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| RateLimitParseError::Count(count.to_string()))?;

        let mut parts = period.split_whitespace();
        let (multiples, unit) = match (parts.next(), parts.next(), parts.next()) {
            (Some(unit), None, None) => (1, unit),
            (Some(n), Some(unit), None) => {
                let n: u32 = n
                    .parse()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| RateLimitParseError::Count(n.to_string()))?;
                (n, unit)
            }
            _ => return Err(shape()),
        };

        Ok(RateLimit {
            requests,
            multiples,
            unit: unit.parse()?,
        })
    }
}

impl fmt::Display for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} per {} {}",
            self.requests,
            self.multiples,
            self.unit.name()
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Counts requests per `(route, client)` in fixed windows.
#[derive(Debug)]
pub struct RateLimiter {
    limit: RateLimit,
    windows: DashMap<(String, String), Window>,
    // When expired windows were last dropped.
    last_sweep: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(limit: RateLimit) -> Self {
        Self {
            limit,
            windows: DashMap::new(),
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    /// Record one request; `Err` once the window's allowance is used up.
    pub fn check(&self, route: &str, client: &str) -> Result<(), RateLimit> {
        self.check_at(route, client, Instant::now())
    }

    fn check_at(&self, route: &str, client: &str, now: Instant) -> Result<(), RateLimit> {
        self.sweep(now);
        let mut window = self
            .windows
            .entry((route.to_string(), client.to_string()))
            .or_insert(Window {
                started: now,
                count: 0,
            });
        if now.saturating_duration_since(window.started) >= self.limit.window() {
            *window = Window {
                started: now,
                count: 0,
            };
        }
        window.count = window.count.saturating_add(1);
        if window.count > self.limit.requests {
            Err(self.limit)
        } else {
            Ok(())
        }
    }

    /// Drop windows that have run out, at most once per window length.
    fn sweep(&self, now: Instant) {
        let period = self.limit.window();
        // Another request is already sweeping.
        let Ok(mut last) = self.last_sweep.try_lock() else {
            return;
        };
        if now.saturating_duration_since(*last) < period {
            return;
        }
        *last = now;
        drop(last);
        self.windows
            .retain(|_, window| now.saturating_duration_since(window.started) < period);
    }
}

/// Middleware rejecting requests over the limit with 429.
pub async fn enforce(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string());

    match limiter.check(&route, &client) {
        Ok(()) => next.run(request).await,
        Err(limit) => {
            log::warn!("rate limit exceeded for {client} on {route}");
            AppError::RateLimited(limit).into_response()
        }
    }
}
