// routing/src/executor.rs

use crate::request::RoutePath;
use mesh_core::{Amount, NetworkHealthStore, SCALE};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Result of moving value along a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOutcome {
    pub success: bool,
    pub latency_ms: u64,
}

/// Carries out a transfer along a chosen path
pub trait TransferExecutor {
    fn execute(&mut self, path: &RoutePath, amount: Amount, health: &NetworkHealthStore) -> TransferOutcome;
}

/// Stand-in executor: succeeds with the destination's success rate and
/// reports the path latency with up to 10% jitter.
#[derive(Debug)]
pub struct SimulatedExecutor {
    rng: StdRng,
}

impl SimulatedExecutor {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn new_random() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl TransferExecutor for SimulatedExecutor {
    fn execute(&mut self, path: &RoutePath, _amount: Amount, health: &NetworkHealthStore) -> TransferOutcome {
        let success_rate = path.destination()
            .map(|d| health.success_rate(d))
            .unwrap_or(0);
        let success = self.rng.gen_range(0..SCALE) < success_rate;

        let jitter = path.total_latency_ms / 10;
        let latency_ms = path.total_latency_ms.saturating_add(self.rng.gen_range(0..=jitter));

        TransferOutcome { success, latency_ms }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(dest: u32) -> RoutePath {
        RoutePath {
            hops: vec![dest],
            hop_costs: vec![10],
            hop_latencies_ms: vec![1000],
            total_cost: 10,
            total_latency_ms: 1000,
            quality_score: 1000,
            score: 1,
        }
    }

    #[test]
    fn test_healthy_destination_always_succeeds() {
        let mut executor = SimulatedExecutor::new(7);
        let health = NetworkHealthStore::new();
        for _ in 0..50 {
            let outcome = executor.execute(&path(1), Amount::from_u64(1), &health);
            assert!(outcome.success);
            assert!((1000..=1100).contains(&outcome.latency_ms));
        }
    }

    #[test]
    fn test_dead_destination_always_fails() {
        let mut executor = SimulatedExecutor::new(7);
        let mut health = NetworkHealthStore::new();
        health.observe(1, 0, 1000, 0);
        assert!(!executor.execute(&path(1), Amount::from_u64(1), &health).success);
    }

    #[test]
    fn test_same_seed_same_outcomes() {
        let mut health = NetworkHealthStore::new();
        health.observe(1, 500, 1000, 0);
        let mut a = SimulatedExecutor::new(42);
        let mut b = SimulatedExecutor::new(42);
        for _ in 0..20 {
            assert_eq!(
                a.execute(&path(1), Amount::zero(), &health),
                b.execute(&path(1), Amount::zero(), &health)
            );
        }
    }
}
