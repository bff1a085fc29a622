// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! load balance over instance snapshots.

pub mod random;
pub mod round_robin;

pub use random::RandomBalance;
pub use round_robin::RoundRobinBalance;

use crate::client::discover::{Instance, InstanceSnapshot};
use std::sync::Arc;

/// [`LoadBalance`] promise the feature of the load balance policy.
///
/// Implementations are shared by every concurrent call of a client, so any cursor they keep must
/// be safe under concurrent use.
pub trait LoadBalance: Send + Sync + 'static {
    /// Picks one instance of `snapshot`, or `None` if it is empty.
    fn pick(&self, snapshot: &InstanceSnapshot) -> Option<Arc<Instance>>;
}

impl<B: LoadBalance> LoadBalance for Arc<B> {
    fn pick(&self, snapshot: &InstanceSnapshot) -> Option<Arc<Instance>> {
        (**self).pick(snapshot)
    }
}
