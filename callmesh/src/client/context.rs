// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//! Per-call client context and per-attempt bookkeeping.

use crate::client::discover::Instance;
use crate::server::Metadata;
use faststr::FastStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Metadata key that carries the call credential.
pub const AUTHORIZATION: &str = "authorization";

/// The context of one logical call made through an [`crate::client::Invoker`].
///
/// Cancellation propagates downward: cancelling a context cancels every context derived from it
/// with [`CallContext::child`], never the other way around.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    metadata: Metadata,
    cancel: CancellationToken,
}

impl CallContext {
    /// Returns a fresh root context.
    pub fn current() -> Self {
        Self::default()
    }

    /// Derives a context that is cancelled whenever `self` is.
    pub fn child(&self) -> Self {
        Self {
            metadata: self.metadata.clone(),
            cancel: self.cancel.child_token(),
        }
    }

    /// Outbound call metadata.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Mutable outbound call metadata.
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// Adds an outbound metadata entry.
    pub fn with_metadata(mut self, key: impl Into<FastStr>, value: impl Into<FastStr>) -> Self {
        self.metadata.append(key, value);
        self
    }

    /// Cancels this context and all of its children.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns true once the context is cancelled.
    pub fn is_canceled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Completes when the context is cancelled.
    pub async fn canceled(&self) {
        self.cancel.cancelled().await
    }
}

/// One attempt of a logical call, created per retry.
#[derive(Debug, Clone)]
pub struct CallAttempt {
    /// The instance picked for this attempt.
    pub instance: Arc<Instance>,
    /// When this attempt gives up.
    pub deadline: Instant,
    /// Zero-based attempt index.
    pub index: u32,
}

impl CallAttempt {
    /// Creates an attempt whose deadline is `timeout` from now.
    pub fn new(instance: Arc<Instance>, timeout: Duration, index: u32) -> Self {
        Self {
            instance,
            deadline: Instant::now() + timeout,
            index,
        }
    }

    /// Time left before the deadline.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::CallContext;

    #[test]
    fn cancellation_flows_downward() {
        let parent = CallContext::current();
        let child = parent.child();
        child.cancel();
        assert!(child.is_canceled());
        assert!(!parent.is_canceled());

        let child = parent.child();
        parent.cancel();
        assert!(child.is_canceled());
    }

    #[test]
    fn child_inherits_metadata() {
        let parent = CallContext::current().with_metadata("x-trace-id", "abc");
        let child = parent.child();
        assert_eq!(child.metadata().get("x-trace-id").map(|v| v.as_str()), Some("abc"));
    }
}
