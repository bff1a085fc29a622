// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! Serving a [`Pipeline`] over tarpc.

use super::{MetadataSink, NoopSink, Pipeline, PipelineError, ServerContext};
use crate::client::CallError;
use crate::transport::Envelope;
use std::io;
use std::sync::Arc;
use tarpc::server::Serve;
use tarpc::{context, RequestName, ServerError};

/// A tarpc [`Serve`] running every request through a [`Pipeline`].
///
/// The envelope metadata becomes the inbound metadata of the call and the tarpc deadline becomes
/// its [`ServerContext::deadline`]. Pipeline errors travel back as [`ServerError`]s whose kind
/// tells the client which [`CallError`] to raise.
pub struct PipelineService<Raw, Req, Resp, Out> {
    pipeline: Arc<Pipeline<Raw, Req, Resp, Out>>,
    sink: Arc<dyn MetadataSink>,
}

impl<Raw, Req, Resp, Out> Clone for PipelineService<Raw, Req, Resp, Out> {
    fn clone(&self) -> Self {
        Self {
            pipeline: self.pipeline.clone(),
            sink: self.sink.clone(),
        }
    }
}

impl<Raw, Req, Resp, Out> PipelineService<Raw, Req, Resp, Out> {
    /// Serves `pipeline`. tarpc has no side channel, so response metadata is dropped.
    pub fn new(pipeline: Arc<Pipeline<Raw, Req, Resp, Out>>) -> Self {
        Self {
            pipeline,
            sink: Arc::new(NoopSink),
        }
    }

    /// Emits response metadata on `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn MetadataSink>) -> Self {
        self.sink = sink;
        self
    }
}

impl<Raw, Req, Resp, Out> Serve for PipelineService<Raw, Req, Resp, Out>
where
    Raw: RequestName + Send + 'static,
    Req: Send + 'static,
    Resp: Send + 'static,
    Out: Send + 'static,
{
    type Req = Envelope<Raw>;
    type Resp = Out;

    async fn serve(self, ctx: context::Context, req: Envelope<Raw>) -> Result<Out, ServerError> {
        let server_ctx = ServerContext::new().with_incoming(req.metadata).with_deadline(ctx.deadline).with_sink(self.sink);
        self.pipeline.serve(server_ctx, req.payload).await.map_err(server_error)
    }
}

/// Encodes a pipeline error for the wire; [`CallError::from`] on [`ServerError`] reverses it.
pub fn server_error(err: PipelineError) -> ServerError {
    let err = CallError::from(err);
    let kind = match &err {
        CallError::Malformed(_) => io::ErrorKind::InvalidInput,
        CallError::Unauthenticated(_) => io::ErrorKind::PermissionDenied,
        CallError::DeadlineExceeded => io::ErrorKind::TimedOut,
        CallError::Transport(_) => io::ErrorKind::BrokenPipe,
        CallError::Endpoint(_) => io::ErrorKind::Other,
    };
    let detail = match err {
        CallError::Malformed(m) | CallError::Unauthenticated(m) | CallError::Endpoint(m) => m.to_string(),
        err => err.to_string(),
    };
    ServerError::new(kind, detail)
}

#[cfg(test)]
mod tests {
    use super::server_error;
    use crate::client::CallError;
    use crate::server::PipelineError;
    use assert_matches::assert_matches;

    #[test]
    fn wire_errors_keep_their_kind() {
        let wire = |err| CallError::from(server_error(err));
        assert_matches!(wire(PipelineError::Decode("bad json".into())), CallError::Malformed(m) if m.as_str() == "bad json");
        assert_matches!(
            wire(PipelineError::Endpoint(Box::new(CallError::Unauthenticated("no token".into())))),
            CallError::Unauthenticated(m) if m.as_str() == "no token"
        );
        assert_matches!(wire(PipelineError::Endpoint("db down".into())), CallError::Endpoint(m) if m.as_str() == "db down");
        assert_matches!(wire(PipelineError::Metadata("closed".into())), CallError::Transport(_));
    }
}
