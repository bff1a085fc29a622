// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! The underlying call of one attempt against one instance.

use super::context::{CallAttempt, CallContext};
use super::CallError;
use crate::server::{MetadataSink, NoopSink, Pipeline, PipelineError, ServerContext};
use faststr::FastStr;
use std::future::Future;
use std::sync::Arc;

/// Performs one call attempt against the instance picked for it.
///
/// Deadlines are enforced by the invoker around the returned future; implementations only have to
/// stop once it is dropped.
pub trait Caller<Req, Resp>: Send + Sync + 'static {
    /// Calls `attempt.instance` with `req`.
    fn call(&self, attempt: &CallAttempt, ctx: &CallContext, req: Req) -> impl Future<Output = Result<Resp, CallError>> + Send;
}

impl<Req, Resp, C: Caller<Req, Resp>> Caller<Req, Resp> for Arc<C> {
    fn call(&self, attempt: &CallAttempt, ctx: &CallContext, req: Req) -> impl Future<Output = Result<Resp, CallError>> + Send {
        (**self).call(attempt, ctx, req)
    }
}

impl From<PipelineError> for CallError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Decode(e) => CallError::Malformed(FastStr::new(e.to_string())),
            PipelineError::Endpoint(e) => match e.downcast::<CallError>() {
                Ok(e) => *e,
                Err(e) => CallError::Endpoint(FastStr::new(e.to_string())),
            },
            PipelineError::Encode(e) => CallError::Endpoint(FastStr::new(e.to_string())),
            PipelineError::Metadata(e) => CallError::Transport(e),
        }
    }
}

/// Local procedure call: runs the request through an in-process server [`Pipeline`].
///
/// The call metadata becomes the inbound metadata of the pipeline, so an `authorization` entry
/// reaches the before-hooks exactly as it would over the wire.
pub struct LocalCaller<Raw, Req, Resp, Out> {
    pipeline: Arc<Pipeline<Raw, Req, Resp, Out>>,
    sink: Arc<dyn MetadataSink>,
}

impl<Raw, Req, Resp, Out> Clone for LocalCaller<Raw, Req, Resp, Out> {
    fn clone(&self) -> Self {
        Self {
            pipeline: self.pipeline.clone(),
            sink: self.sink.clone(),
        }
    }
}

impl<Raw, Req, Resp, Out> LocalCaller<Raw, Req, Resp, Out> {
    /// Calls into `pipeline`, dropping response metadata.
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

impl<Raw, Req, Resp, Out> Caller<Raw, Out> for LocalCaller<Raw, Req, Resp, Out>
where
    Raw: Send + 'static,
    Req: Send + 'static,
    Resp: Send + 'static,
    Out: Send + 'static,
{
    fn call(&self, _: &CallAttempt, ctx: &CallContext, req: Raw) -> impl Future<Output = Result<Out, CallError>> + Send {
        let server_ctx = ServerContext::new().with_incoming(ctx.metadata().clone()).with_sink(self.sink.clone());
        let pipeline = self.pipeline.clone();
        async move { pipeline.serve(server_ctx, req).await.map_err(CallError::from) }
    }
}

#[cfg(test)]
mod tests {
    use crate::client::CallError;
    use crate::server::PipelineError;
    use assert_matches::assert_matches;

    #[test]
    fn pipeline_errors_map_to_call_errors() {
        assert_matches!(CallError::from(PipelineError::Decode("bad json".into())), CallError::Malformed(m) if m.as_str() == "bad json");
        assert_matches!(CallError::from(PipelineError::Endpoint("db down".into())), CallError::Endpoint(_));
        assert_matches!(
            CallError::from(PipelineError::Endpoint(Box::new(CallError::Unauthenticated("no token".into())))),
            CallError::Unauthenticated(_)
        );
        assert_matches!(CallError::from(PipelineError::Metadata("closed".into())), CallError::Transport(_));
    }
}
