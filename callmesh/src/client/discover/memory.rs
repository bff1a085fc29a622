// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! In-process registry discover, publishing every membership change to its watchers.

use super::{Discover, Discovery, Instance};
use crate::client::ClientError;
use crate::net::Address;
use crate::target::Target;
use async_broadcast::{InactiveReceiver, Receiver, Sender};
use dashmap::DashMap;
use faststr::FastStr;
use std::future::Future;
use std::sync::Arc;
use tracing::trace;

const DEFAULT_WATCH_CAPACITY: usize = 16;

/// [`MemoryDiscover`] keeps the membership of each target key in memory.
///
/// Every [`MemoryDiscover::register`] and [`MemoryDiscover::deregister`] broadcasts the full new
/// membership of the key as a [`Discovery`]. Slow watchers lose the oldest events, which is harmless
/// since each event carries the whole membership.
pub struct MemoryDiscover {
    registry: DashMap<FastStr, Vec<Arc<Instance>>>,
    sender: Sender<Discovery>,
    _watchers: InactiveReceiver<Discovery>,
}

impl Default for MemoryDiscover {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDiscover {
    /// Creates an empty registry.
    pub fn new() -> Self {
        let (mut sender, receiver) = async_broadcast::broadcast(DEFAULT_WATCH_CAPACITY);
        sender.set_overflow(true);
        Self {
            registry: DashMap::new(),
            sender,
            _watchers: receiver.deactivate(),
        }
    }

    /// Adds `instance` under `key`, replacing an instance with the same address.
    pub fn register(&self, key: impl Into<FastStr>, instance: Instance) {
        let key = key.into();
        let mut entry = self.registry.entry(key.clone()).or_default();
        entry.retain(|i| i.address != instance.address);
        entry.push(Arc::new(instance));
        // Publishing under the entry guard keeps events of one key in write order.
        self.publish(key, entry.clone());
    }

    /// Removes the instance at `address` under `key`. Returns false if it was not registered.
    pub fn deregister(&self, key: impl Into<FastStr>, address: &Address) -> bool {
        let key = key.into();
        let Some(mut entry) = self.registry.get_mut(&key) else {
            return false;
        };
        let before = entry.len();
        entry.retain(|i| &i.address != address);
        if entry.len() == before {
            return false;
        }
        self.publish(key, entry.clone());
        true
    }

    /// The current membership of `key`.
    pub fn instances(&self, key: &FastStr) -> Vec<Arc<Instance>> {
        self.registry.get(key).map(|entry| entry.clone()).unwrap_or_default()
    }

    /// Never blocks: with overflow on, a full channel drops its oldest event.
    fn publish(&self, key: FastStr, instances: Vec<Arc<Instance>>) {
        if self.sender.try_broadcast(Discovery { key: key.clone(), instances }).is_err() {
            trace!("[CALLMESH] MemoryDiscover: nobody watches {key}");
        }
    }
}

impl Discover for MemoryDiscover {
    fn discover<'s>(&'s self, target: &'s Target) -> impl Future<Output = Result<Vec<Arc<Instance>>, ClientError>> + Send {
        async move { Ok(self.instances(&target.key())) }
    }

    fn watch(&self, _keys: Option<&[FastStr]>) -> Option<Receiver<Discovery>> {
        Some(self.sender.new_receiver())
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryDiscover;
    use crate::client::discover::{Discover, Instance};
    use crate::net::Address;
    use crate::target::Target;
    use async_broadcast::TryRecvError;
    use faststr::FastStr;
    use std::sync::Arc;

    #[tokio::test]
    async fn register_publishes_full_membership() {
        let discover = MemoryDiscover::new();
        let mut watch = discover.watch(None).unwrap();
        let a: Address = "127.0.0.1:7000".parse().unwrap();
        let b: Address = "127.0.0.1:7001".parse().unwrap();

        discover.register("svc", Instance::new(a.clone()));
        discover.register("svc", Instance::new(b.clone()));
        assert_eq!(watch.recv().await.unwrap().instances.len(), 1);
        let event = watch.recv().await.unwrap();
        assert_eq!(event.key, FastStr::from_static_str("svc"));
        assert_eq!(event.instances.len(), 2);

        assert!(discover.deregister("svc", &a));
        assert!(!discover.deregister("svc", &a));
        assert_eq!(watch.recv().await.unwrap().instances[0].address, b);

        let resolved = discover.discover(&Target::new("svc")).await.unwrap();
        assert_eq!(resolved.len(), 1);
        assert!(discover.discover(&Target::new("other")).await.unwrap().is_empty());
    }

    #[test]
    fn register_without_watchers_does_not_block() {
        let discover = MemoryDiscover::new();
        for port in 0..64u16 {
            discover.register("svc", Instance::new(Address::Ip(([127, 0, 0, 1], 9000 + port).into())));
        }
        assert_eq!(discover.instances(&FastStr::from_static_str("svc")).len(), 64);
    }

    #[test]
    fn concurrent_writers_publish_in_write_order() {
        let discover = Arc::new(MemoryDiscover::new());
        let mut watch = discover.watch(None).unwrap();
        let writers: Vec<_> = (0..2u16)
            .map(|w| {
                let discover = discover.clone();
                std::thread::spawn(move || {
                    for i in 0..200u16 {
                        discover.register("svc", Instance::new(Address::Ip(([127, 0, 0, 1], 10000 + w * 1000 + i).into())));
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let mut last = None;
        loop {
            match watch.try_recv() {
                Ok(event) => last = Some(event),
                Err(TryRecvError::Overflowed(_)) => continue,
                Err(_) => break,
            }
        }
        assert_eq!(last.unwrap().instances.len(), 400);
    }
}
