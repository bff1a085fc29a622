// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//! Round-robin load balance implemention

use super::LoadBalance;
use crate::client::discover::{Instance, InstanceSnapshot};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Picks the instances of a snapshot in turn.
#[derive(Debug, Default)]
pub struct RoundRobinBalance {
    cursor: AtomicUsize,
}

impl RoundRobinBalance {
    /// Returns a balancer starting at the first instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a balancer starting at `cursor`.
    pub fn with_cursor(cursor: usize) -> Self {
        Self { cursor: AtomicUsize::new(cursor) }
    }
}

impl LoadBalance for RoundRobinBalance {
    fn pick(&self, snapshot: &InstanceSnapshot) -> Option<Arc<Instance>> {
        if snapshot.is_empty() {
            return None;
        }
        let cursor = self.cursor.fetch_add(1, Ordering::Relaxed);
        snapshot.get(cursor % snapshot.len()).cloned()
    }
}
