//! Webhook ingress hardening: HMAC verification over `timestamp.body`,
//! timestamp freshness, and per-IP sliding-window rate limiting. All checks
//! fail closed.

use std::collections::VecDeque;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "webhook-signature";
pub const TIMESTAMP_HEADER: &str = "webhook-timestamp";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngressError {
    MissingHeader,
    BadSignature,
    TimestampOutOfWindow,
}

/// Constant-time verification of `v1=<hex hmac-sha256(timestamp "." body)>`.
pub fn verify_signature(
    secret: &[u8],
    timestamp: &str,
    body: &[u8],
    signature_header: &str,
) -> Result<(), IngressError> {
    let sig_hex = signature_header
        .strip_prefix("v1=")
        .ok_or(IngressError::BadSignature)?;
    let provided = hex::decode(sig_hex).map_err(|_| IngressError::BadSignature)?;

    let mut mac =
        HmacSha256::new_from_slice(secret).map_err(|_| IngressError::BadSignature)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    mac.verify_slice(&provided)
        .map_err(|_| IngressError::BadSignature)
}

/// Counter-party helper for tests and local tooling.
pub fn sign(secret: &[u8], timestamp: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("hmac accepts any key length");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    format!("v1={}", hex::encode(mac.finalize().into_bytes()))
}

pub fn check_timestamp(now_unix: i64, timestamp: i64, window_secs: i64) -> Result<(), IngressError> {
    if (now_unix - timestamp).abs() > window_secs {
        return Err(IngressError::TimestampOutOfWindow);
    }
    Ok(())
}

/// Sliding-window limiter keyed by source IP.
pub struct RateLimiter {
    window: Duration,
    max_requests: usize,
    hits: DashMap<IpAddr, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            window,
            max_requests,
            hits: DashMap::new(),
        }
    }

    /// Record a hit; false when the source is over its budget.
    pub fn allow(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut entry = self.hits.entry(ip).or_default();
        while entry
            .front()
            .is_some_and(|first| now.duration_since(*first) > self.window)
        {
            entry.pop_front();
        }
        if entry.len() >= self.max_requests {
            return false;
        }
        entry.push_back(now);
        true
    }
}
