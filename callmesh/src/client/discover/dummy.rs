// Modifications Copyright Andeya Lee 2024
// Based on original source code from Volo Contributors licensed under MIT OR Apache-2.0
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! Dummy discover.

use super::{Discover, Discovery, Instance};
use crate::client::ClientError;
use crate::target::Target;
use async_broadcast::Receiver;
use faststr::FastStr;
use std::future::Future;
use std::sync::Arc;

/// [`DummyDiscover`] always returns an empty list.
///
/// Users that don't specify the address directly need to use their own [`Discover`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DummyDiscover;

impl Discover for DummyDiscover {
    fn discover<'s>(&'s self, _: &'s Target) -> impl Future<Output = Result<Vec<Arc<Instance>>, ClientError>> + Send {
        async move { Ok(vec![]) }
    }

    fn watch(&self, _: Option<&[FastStr]>) -> Option<Receiver<Discovery>> {
        None
    }
}
