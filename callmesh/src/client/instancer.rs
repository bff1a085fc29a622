// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! Turns a [`Discover`] collaborator into instance snapshots for the invoker.

use super::discover::{diff_address, Discover, Discovery, Instance, InstanceSnapshot};
use super::ClientError;
use crate::target::Target;
use async_broadcast::{Receiver, RecvError};
use faststr::FastStr;
use std::sync::Arc;
use tokio::sync::{watch, OnceCell};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Resolves the instances of one [`Target`].
///
/// Resolution is lazy: nothing is resolved until the first [`Instancer::snapshot`]. If the
/// discoverer offers a watch, the first resolution is cached and a background task publishes a
/// fresh snapshot on every membership event; otherwise every call resolves anew. Once the watch
/// closes, calls fall back to resolving anew. Dropping the instancer stops the background task.
pub struct Instancer<D> {
    discover: D,
    target: Target,
    cached: OnceCell<watch::Receiver<InstanceSnapshot>>,
    cancel: CancellationToken,
}

impl<D: Discover> Instancer<D> {
    /// Creates an instancer; does not contact the discoverer.
    pub fn new(discover: D, target: Target) -> Self {
        Self {
            discover,
            target,
            cached: OnceCell::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// The target being resolved.
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// The discoverer.
    pub fn discover(&self) -> &D {
        &self.discover
    }

    /// Returns the current membership.
    pub async fn snapshot(&self) -> Result<InstanceSnapshot, ClientError> {
        if let Some(address) = &self.target.address {
            return Ok(InstanceSnapshot::new(vec![Arc::new(Instance::new(address.clone()))]));
        }
        if let Some(cached) = self.cached.get() {
            // A closed watch leaves no publisher behind; its last snapshot would never move again.
            if cached.has_changed().is_ok() {
                return Ok(cached.borrow().clone());
            }
            return Ok(InstanceSnapshot::new(self.discover.discover(&self.target).await?));
        }

        let key = self.target.key();
        // Subscribe before resolving so no event between the two is lost.
        let events = self.discover.watch(Some(std::slice::from_ref(&key)));
        let snapshot = InstanceSnapshot::new(self.discover.discover(&self.target).await?);
        let Some(events) = events else {
            return Ok(snapshot);
        };

        let cached = self
            .cached
            .get_or_init(|| async move {
                let (publisher, subscriber) = watch::channel(snapshot);
                tokio::spawn(watch_membership(key, events, publisher, self.cancel.clone()));
                subscriber
            })
            .await;
        Ok(cached.borrow().clone())
    }
}

impl<D> Drop for Instancer<D> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn watch_membership(key: FastStr, mut events: Receiver<Discovery>, publisher: watch::Sender<InstanceSnapshot>, cancel: CancellationToken) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return,
            event = events.recv() => event,
        };
        match event {
            Ok(discovery) if discovery.key == key => {
                let prev = publisher.borrow().clone();
                let (change, changed) = diff_address(&prev, discovery.instances);
                if changed {
                    debug!(
                        "[CALLMESH] membership of {key} changed, added: {:?}, removed: {:?}",
                        change.added.iter().map(|i| i.address.to_string()).collect::<Vec<_>>(),
                        change.removed.iter().map(|i| i.address.to_string()).collect::<Vec<_>>(),
                    );
                }
                publisher.send_replace(InstanceSnapshot::new(change.all));
            },
            Ok(_) => {},
            Err(RecvError::Overflowed(missed)) => {
                warn!("[CALLMESH] watch of {key} lagged, {missed} events skipped");
            },
            Err(RecvError::Closed) => {
                warn!("[CALLMESH] watch of {key} closed, resolving on every call from now on");
                return;
            },
        }
    }
}
