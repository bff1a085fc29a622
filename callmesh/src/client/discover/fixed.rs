// Modifications Copyright Andeya Lee 2024
// Based on original source code from Volo Contributors licensed under MIT OR Apache-2.0
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! Fixed instance list discover.

use super::{Discover, Discovery, Instance};
use crate::client::ClientError;
use crate::net::Address;
use crate::target::Target;
use async_broadcast::Receiver;
use faststr::FastStr;
use std::future::Future;
use std::net::{AddrParseError, SocketAddr};
use std::sync::Arc;

/// [`FixedDiscover`] is a simple implementation of [`Discover`] that returns a fixed list of instances.
#[derive(Debug, Clone)]
pub struct FixedDiscover {
    instances: Vec<Arc<Instance>>,
}

impl FixedDiscover {
    /// Creates a new [`FixedDiscover`].
    pub fn new(instances: Vec<Arc<Instance>>) -> Self {
        Self { instances }
    }

    /// Creates a new [`FixedDiscover`] from `ip:port` or `unix://<path>` strings.
    pub fn from_address_str<'a>(addrs: impl IntoIterator<Item = &'a str>) -> Result<Self, AddrParseError> {
        let instances = addrs
            .into_iter()
            .map(|addr| addr.parse::<Address>().map(|address| Arc::new(Instance::new(address))))
            .collect::<Result<_, _>>()?;
        Ok(Self { instances })
    }
}

impl From<Vec<SocketAddr>> for FixedDiscover {
    fn from(addrs: Vec<SocketAddr>) -> Self {
        Self {
            instances: addrs.into_iter().map(|addr| Arc::new(Instance::new(addr))).collect(),
        }
    }
}

impl Discover for FixedDiscover {
    fn discover<'s>(&'s self, _: &'s Target) -> impl Future<Output = Result<Vec<Arc<Instance>>, ClientError>> + Send {
        async move { Ok(self.instances.clone()) }
    }

    fn watch(&self, _keys: Option<&[FastStr]>) -> Option<Receiver<Discovery>> {
        None
    }
}
