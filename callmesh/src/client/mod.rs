// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! Provides a client that resolves a service through discovery and invokes it with
//! a bounded retry and per-attempt timeout budget.

pub mod balance;
pub mod caller;
pub mod channel;
pub mod config;
pub mod context;
pub mod discover;
pub mod instancer;
pub mod invoker;
pub mod stub;

pub use balance::{LoadBalance, RandomBalance, RoundRobinBalance};
pub use caller::{Caller, LocalCaller};
pub use channel::{RpcCaller, RpcChannelConfig};
pub use config::{ClientConfig, ConfigBuilder};
pub use context::{CallAttempt, CallContext};
pub use discover::{Discover, FixedDiscover, Instance, InstanceSnapshot, MemoryDiscover};
pub use instancer::Instancer;
pub use invoker::Invoker;
pub use stub::RpcClient;

use crate::BoxError;
use faststr::FastStr;

/// Judges whether a failed attempt may be retried on another attempt.
pub trait Retryable {
    /// Returns true if the failure is transient.
    fn retryable(&self) -> bool {
        false
    }
}

/// The failure of one call attempt against one instance.
#[derive(thiserror::Error, Debug)]
pub enum CallError {
    /// The network or transport failed.
    #[error("transport error: {0}")]
    Transport(BoxError),
    /// The attempt did not finish before its deadline.
    #[error("deadline exceeded")]
    DeadlineExceeded,
    /// The request was rejected as malformed.
    #[error("malformed request: {0}")]
    Malformed(FastStr),
    /// The call credential was rejected.
    #[error("unauthenticated: {0}")]
    Unauthenticated(FastStr),
    /// The remote business logic failed.
    #[error("endpoint error: {0}")]
    Endpoint(FastStr),
}

impl Retryable for CallError {
    fn retryable(&self) -> bool {
        matches!(self, CallError::Transport(_) | CallError::DeadlineExceeded)
    }
}

/// Errors returned by [`RpcClient::invoke`] and [`Invoker::invoke`].
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    /// The discovery target currently has no instances.
    #[error("no instance available for `{0}`")]
    NoInstanceAvailable(FastStr),
    /// Every attempt failed with a retryable error.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// How many attempts were made.
        attempts: u32,
        /// The error observed on the last attempt.
        #[source]
        last: CallError,
    },
    /// An attempt failed with an error that is not retried.
    #[error(transparent)]
    Call(CallError),
    /// Service discovery failed.
    #[error("service discovery failed: {0}")]
    Discover(FastStr),
    /// The parent context was cancelled.
    #[error("call canceled")]
    Canceled,
    /// The client configuration is invalid.
    #[error("invalid client config: {0}")]
    Config(FastStr),
}

impl ClientError {
    /// Returns the attempt error carried by this error, if any.
    pub fn call_error(&self) -> Option<&CallError> {
        match self {
            ClientError::RetriesExhausted { last, .. } => Some(last),
            ClientError::Call(e) => Some(e),
            _ => None,
        }
    }
}
