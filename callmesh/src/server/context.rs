// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//! The per-call server context.

use super::metadata::{Metadata, MetadataSink, NoopSink};
use faststr::FastStr;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// The context of one inbound call. Created at call entry and never shared across calls.
#[derive(Clone)]
pub struct ServerContext {
    incoming: Option<Metadata>,
    values: Metadata,
    deadline: Option<Instant>,
    sink: Arc<dyn MetadataSink>,
}

impl Default for ServerContext {
    fn default() -> Self {
        Self {
            incoming: None,
            values: Metadata::new(),
            deadline: None,
            sink: Arc::new(NoopSink),
        }
    }
}

impl fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerContext")
            .field("incoming", &self.incoming)
            .field("values", &self.values)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl ServerContext {
    /// A context with no inbound metadata that drops emitted metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches the inbound metadata received by the transport.
    pub fn with_incoming(mut self, incoming: Metadata) -> Self {
        self.incoming = Some(incoming);
        self
    }

    /// Attaches the transport side channel.
    pub fn with_sink(mut self, sink: Arc<dyn MetadataSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Attaches the deadline the caller gave the call.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// When the caller stops waiting, if the transport carries deadlines.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The inbound metadata, if the transport supplied any.
    pub fn incoming(&self) -> Option<&Metadata> {
        self.incoming.as_ref()
    }

    /// Derives a context carrying an extra value, e.g. a trace identifier.
    pub fn with_value(mut self, key: impl Into<FastStr>, value: impl Into<FastStr>) -> Self {
        self.values.insert(key, value);
        self
    }

    /// A value previously set by a hook.
    pub fn value(&self, key: &str) -> Option<&FastStr> {
        self.values.get(key)
    }

    pub(crate) fn sink(&self) -> &dyn MetadataSink {
        self.sink.as_ref()
    }
}
