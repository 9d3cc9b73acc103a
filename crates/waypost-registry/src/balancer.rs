//! Uniform random load balancing
//!
//! No weighting and no health checks: anything present in the directory
//! is a candidate.

use std::sync::Arc;

use waypost_core::RngProvider;

/// Picks one candidate uniformly at random
#[derive(Debug, Clone)]
pub struct LoadBalancer {
    rng: Arc<dyn RngProvider>,
}

impl LoadBalancer {
    /// Create a balancer over an injected RNG
    pub fn new(rng: Arc<dyn RngProvider>) -> Self {
        Self { rng }
    }

    /// Pick one URL, skipping absent ones; `None` when nothing remains
    pub fn pick<I>(&self, candidates: I) -> Option<String>
    where
        I: IntoIterator<Item = Option<String>>,
    {
        let mut urls: Vec<String> = candidates.into_iter().flatten().collect();
        let index = self.rng.pick_index(urls.len())?;
        debug_assert!(index < urls.len());
        Some(urls.swap_remove(index))
    }
}
