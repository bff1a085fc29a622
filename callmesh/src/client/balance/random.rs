// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//! Random load balance implemention

use super::LoadBalance;
use crate::client::discover::{Instance, InstanceSnapshot};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};

/// Weighted random load balance implemention.
///
/// An instance is picked with a probability proportional to its weight. If every weight is zero
/// the pick is uniform.
#[derive(Debug)]
pub struct RandomBalance {
    rng: Mutex<StdRng>,
}

impl Default for RandomBalance {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomBalance {
    /// Returns a balancer seeded from the operating system.
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Returns a deterministic balancer.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl LoadBalance for RandomBalance {
    fn pick(&self, snapshot: &InstanceSnapshot) -> Option<Arc<Instance>> {
        if snapshot.is_empty() {
            return None;
        }
        let sum_of_weights: u64 = snapshot.iter().map(|i| u64::from(i.weight)).sum();
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if sum_of_weights == 0 {
            return snapshot.get(rng.gen_range(0..snapshot.len())).cloned();
        }
        pick_one(rng.gen_range(0..sum_of_weights), snapshot)
    }
}

#[inline]
fn pick_one(mut weight: u64, instances: &[Arc<Instance>]) -> Option<Arc<Instance>> {
    for instance in instances {
        let w = u64::from(instance.weight);
        if weight < w {
            return Some(instance.clone());
        }
        weight -= w;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::RandomBalance;
    use crate::client::balance::LoadBalance;
    use crate::client::discover::{Instance, InstanceSnapshot};
    use crate::net::Address;
    use std::sync::Arc;

    fn snapshot(weights: &[u32]) -> InstanceSnapshot {
        weights
            .iter()
            .enumerate()
            .map(|(i, w)| Arc::new(Instance::new(Address::Ip(([127, 0, 0, 1], 8000 + i as u16).into())).with_weight(*w)))
            .collect::<Vec<_>>()
            .into()
    }

    #[test]
    fn same_seed_same_picks() {
        let snapshot = snapshot(&[1, 2, 3]);
        let a = RandomBalance::with_seed(7);
        let b = RandomBalance::with_seed(7);
        for _ in 0..32 {
            assert_eq!(a.pick(&snapshot), b.pick(&snapshot));
        }
    }

    #[test]
    fn zero_weight_is_never_picked() {
        let snapshot = snapshot(&[0, 5, 0]);
        let balance = RandomBalance::with_seed(1);
        for _ in 0..64 {
            assert_eq!(balance.pick(&snapshot).unwrap().address, snapshot[1].address);
        }
    }

    #[test]
    fn all_zero_weights_fall_back_to_uniform() {
        let snapshot = snapshot(&[0, 0]);
        assert!(RandomBalance::with_seed(3).pick(&snapshot).is_some());
        assert!(RandomBalance::new().pick(&InstanceSnapshot::default()).is_none());
    }
}
