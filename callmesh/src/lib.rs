// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! callmesh is a Rust RPC invocation pipeline.
//!
//! The client side resolves a logical service name to a live set of instances through a pluggable
//! [`client::discover::Discover`], picks one with a [`client::balance::LoadBalance`] policy and runs a
//! bounded-retry, per-attempt-timeout call through a [`client::Caller`].
//!
//! The server side runs every inbound call through a fixed-order [`server::Pipeline`]:
//! metadata extraction, before-hooks, decode, middleware-wrapped endpoint, after-hooks, encode and
//! metadata emission, with [`server::recovery::Recovery`] turning panics into structured replies.
#![deny(missing_docs)]
#![allow(clippy::type_complexity)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod client;
pub mod net;
pub mod resource;
pub mod server;
pub mod target;
pub mod transport;

/// A type-erased, thread-safe error.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// re-public `tarpc` crate something.
pub use crate::tarpc::*;

mod tarpc {
    #[doc(hidden)]
    pub use ::tarpc::serde;

    pub use ::tarpc::{context, tokio_serde};

    pub use ::tarpc::ServerError;
}

pub use ::tracing;
