//! Per-action rate gate
//!
//! Every outbound call is tagged with its action name and waits for a slot.
//! Slots are evenly spaced (`1s / limit`) and handed out in reservation order,
//! so concurrent callers never starve and different actions never contend.

use crate::config::RateLimitConfig;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
pub struct RateGate {
    limits: RateLimitConfig,
    next_slot: Mutex<HashMap<String, Instant>>,
}

impl RateGate {
    pub fn new(limits: RateLimitConfig) -> Self {
        Self {
            limits,
            next_slot: Mutex::new(HashMap::new()),
        }
    }

    /// Gate with the same ceiling for every action
    pub fn uniform(per_second: u32) -> Self {
        Self::new(RateLimitConfig {
            default_per_second: per_second,
            per_action: HashMap::new(),
        })
    }

    /// Spacing between two calls of `action`
    pub fn spacing(&self, action: &str) -> Duration {
        let limit = self.limits.limit_for(action).max(1);
        Duration::from_secs(1) / limit
    }

    /// Wait until a call tagged `action` is permitted
    pub async fn acquire(&self, action: &str) {
        let slot = self.reserve(action);
        if slot > Instant::now() {
            tracing::trace!(action, wait = ?(slot - Instant::now()), "rate limited");
            tokio::time::sleep_until(slot).await;
        }
    }

    fn reserve(&self, action: &str) -> Instant {
        let spacing = self.spacing(action);
        let now = Instant::now();
        // the map only holds instants, a poisoned lock is still consistent
        let mut slots = self
            .next_slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let next = slots.entry(action.to_string()).or_insert(now);
        let slot = (*next).max(now);
        *next = slot + spacing;
        slot
    }
}

impl Default for RateGate {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_first_call_is_immediate() {
        let gate = RateGate::uniform(20);
        let start = Instant::now();
        gate.acquire("DescribeFlow").await;
        assert_eq!(Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn test_calls_are_spaced() {
        let gate = RateGate::uniform(10);
        let start = Instant::now();
        for _ in 0..5 {
            gate.acquire("DescribeFlow").await;
        }
        // slots at 0, 100, 200, 300, 400 ms
        assert_eq!(Instant::now() - start, Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_actions_are_independent() {
        let mut limits = RateLimitConfig::default();
        limits.per_action.insert("CreateInstance".to_string(), 1);
        let gate = RateGate::new(limits);
        let start = Instant::now();

        gate.acquire("CreateInstance").await;
        gate.acquire("DescribeFlow").await;
        gate.acquire("DescribeFlow").await;
        assert_eq!(Instant::now() - start, Duration::from_millis(50));

        gate.acquire("CreateInstance").await;
        assert_eq!(Instant::now() - start, Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_all_pass() {
        let gate = Arc::new(RateGate::uniform(4));
        let start = Instant::now();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = Arc::clone(&gate);
                tokio::spawn(async move {
                    gate.acquire("DescribeFlow").await;
                    Instant::now()
                })
            })
            .collect();

        let mut finished = Vec::new();
        for handle in handles {
            finished.push(handle.await.unwrap() - start);
        }
        finished.sort();
        assert_eq!(finished.first(), Some(&Duration::ZERO));
        assert_eq!(finished.last(), Some(&Duration::from_millis(1750)));
    }

    #[test]
    fn test_spacing() {
        let gate = RateGate::default();
        assert_eq!(gate.spacing("anything"), Duration::from_millis(50));
    }
}
