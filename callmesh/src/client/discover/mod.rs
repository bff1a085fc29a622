// Modifications Copyright Andeya Lee 2024
// Based on original source code from Volo Contributors licensed under MIT OR Apache-2.0
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! Service discovery consumption.
//!
//! The discovery storage itself lives outside this crate; a [`Discover`] collaborator only has to
//! resolve a [`Target`] into instances and, optionally, push membership changes over a watch.

use super::ClientError;
use crate::net::Address;
use crate::target::Target;
use async_broadcast::Receiver;
use faststr::FastStr;
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;

pub use dummy::DummyDiscover;
pub use fixed::FixedDiscover;
pub use memory::MemoryDiscover;

mod dummy;
mod fixed;
mod memory;

/// [`Discover`] is the most basic trait for Discover.
pub trait Discover: Send + Sync + 'static {
    /// `discover` resolves a target into its current instances. It may return a cached view.
    fn discover<'s>(&'s self, target: &'s Target) -> impl Future<Output = Result<Vec<Arc<Instance>>, ClientError>> + Send;
    /// `watch` should return a [`async_broadcast::Receiver`] which can be used to subscribe [`Discovery`].
    fn watch(&self, keys: Option<&[FastStr]>) -> Option<Receiver<Discovery>>;
}

impl<D: Discover> Discover for Arc<D> {
    fn discover<'s>(&'s self, target: &'s Target) -> impl Future<Output = Result<Vec<Arc<Instance>>, ClientError>> + Send {
        (**self).discover(target)
    }

    fn watch(&self, keys: Option<&[FastStr]>) -> Option<Receiver<Discovery>> {
        (**self).watch(keys)
    }
}

/// [`Instance`] contains information of an instance from the target service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    /// service address
    pub address: Address,
    /// service weight
    pub weight: u32,
    /// service tags extension
    pub tags: HashMap<Cow<'static, str>, Cow<'static, str>>,
}

impl Instance {
    /// Creates an instance with weight 1 and no tags.
    pub fn new(address: impl Into<Address>) -> Self {
        Self {
            address: address.into(),
            weight: 1,
            tags: HashMap::new(),
        }
    }

    /// Sets the weight used by weighted balancing.
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    /// Adds a tag.
    pub fn with_tag(mut self, key: impl Into<Cow<'static, str>>, value: impl Into<Cow<'static, str>>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// Discovery indicates the change of the service discover.
#[derive(Debug, Clone)]
pub struct Discovery {
    /// Target key.
    pub key: FastStr,
    /// The full membership after the change.
    pub instances: Vec<Arc<Instance>>,
}

/// The instances of a service valid at one point in time.
///
/// A snapshot is never mutated: membership changes publish a new snapshot, so one taken for an
/// attempt stays valid until the attempt completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSnapshot {
    instances: Arc<[Arc<Instance>]>,
}

impl InstanceSnapshot {
    /// Freezes `instances` into a snapshot.
    pub fn new(instances: Vec<Arc<Instance>>) -> Self {
        Self { instances: instances.into() }
    }

    /// The instances, in resolution order.
    pub fn instances(&self) -> &[Arc<Instance>] {
        &self.instances
    }
}

impl Default for InstanceSnapshot {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Deref for InstanceSnapshot {
    type Target = [Arc<Instance>];

    fn deref(&self) -> &Self::Target {
        &self.instances
    }
}

impl From<Vec<Arc<Instance>>> for InstanceSnapshot {
    fn from(instances: Vec<Arc<Instance>>) -> Self {
        Self::new(instances)
    }
}

/// Change contains the difference between the current discovery result and the previous one.
#[derive(Debug, Clone)]
pub struct Change {
    /// The full membership after the change.
    pub all: Vec<Arc<Instance>>,
    /// Instances whose address was not present before.
    pub added: Vec<Arc<Instance>>,
    /// Instances whose address is gone.
    pub removed: Vec<Arc<Instance>>,
}

/// [`diff_address`] provides a naive implementation that compares prev and next only by the
/// address, and returns the [`Change`].
///
/// The bool in the return value indicates whether there's diff between prev and next.
/// If users need to compare the instances by also weight or tags, they should not use this.
pub fn diff_address(prev: &[Arc<Instance>], next: Vec<Arc<Instance>>) -> (Change, bool) {
    let prev_set: HashSet<&Address> = prev.iter().map(|i| &i.address).collect();
    let next_set: HashSet<&Address> = next.iter().map(|i| &i.address).collect();

    let added: Vec<_> = next.iter().filter(|i| !prev_set.contains(&i.address)).cloned().collect();
    let removed: Vec<_> = prev.iter().filter(|i| !next_set.contains(&i.address)).cloned().collect();
    let changed = !added.is_empty() || !removed.is_empty();

    (Change { all: next, added, removed }, changed)
}

#[cfg(test)]
mod tests {
    use super::{diff_address, Discover, DummyDiscover, FixedDiscover, Instance, InstanceSnapshot};
    use crate::net::Address;
    use crate::target::Target;
    use std::sync::Arc;

    fn instance(addr: &str) -> Arc<Instance> {
        Arc::new(Instance::new(addr.parse::<Address>().unwrap()))
    }

    #[test]
    fn test_fixed_discover() {
        let discover = FixedDiscover::from_address_str(vec!["127.0.0.1:8000", "127.0.0.2:9000"]).unwrap();
        let resp = futures::executor::block_on(async { discover.discover(&Target::new("svc")).await }).unwrap();
        assert_eq!(resp, vec![instance("127.0.0.1:8000"), instance("127.0.0.2:9000")]);
        assert!(discover.watch(None).is_none());
    }

    #[test]
    fn test_dummy_discover() {
        let resp = futures::executor::block_on(async { DummyDiscover.discover(&Target::new("svc")).await }).unwrap();
        assert!(resp.is_empty());
    }

    #[test]
    fn diff_by_address() {
        let a = instance("127.0.0.1:8000");
        let b = instance("127.0.0.1:8001");
        let c = instance("127.0.0.1:8002");

        let (change, changed) = diff_address(&[a.clone(), b.clone()], vec![b.clone(), c.clone()]);
        assert!(changed);
        assert_eq!(change.added, vec![c]);
        assert_eq!(change.removed, vec![a]);
        assert_eq!(change.all.len(), 2);

        let reweighted = Arc::new(Instance::new(b.address.clone()).with_weight(9));
        let (_, changed) = diff_address(&[b], vec![reweighted]);
        assert!(!changed);
    }

    #[test]
    fn snapshot_clones_share_instances() {
        let snapshot = InstanceSnapshot::new(vec![instance("127.0.0.1:8000")]);
        let other = snapshot.clone();
        assert_eq!(snapshot, other);
        assert!(Arc::ptr_eq(&snapshot[0], &other[0]));
        assert!(InstanceSnapshot::default().is_empty());
    }
}
