// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//! Server component: the fixed-order request pipeline.
//!
//! Every inbound call runs these stages, none skippable:
//!
//! 1. extract the inbound metadata, an empty map if the transport supplied none;
//! 2. before-hooks, in registration order, each deriving a new context;
//! 3. decode the raw request;
//! 4. call the endpoint wrapped by the middleware chain;
//! 5. after-hooks, in registration order, accumulating response headers and trailers;
//! 6. encode the response;
//! 7. emit the accumulated headers and trailers, if any, on the transport side channel.
//!
//! A failing stage stops the pipeline; the error handler is invoked exactly once with the error,
//! which is then returned.

pub mod context;
pub mod endpoint;
pub mod metadata;
pub mod recovery;
pub mod reply;
pub mod service;

pub use context::ServerContext;
pub use endpoint::{endpoint_fn, middleware_fn, BoxEndpoint, BoxMiddleware, Chain, Endpoint, Middleware};
pub use metadata::{Emitted, Metadata, MetadataSink, NoopSink, RecordingSink};
pub use recovery::{Fault, Recovery};
pub use reply::Reply;
pub use service::PipelineService;

use crate::BoxError;
use std::sync::Arc;
use tracing::warn;

/// Errors that stop a pipeline run.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// The raw request could not be decoded.
    #[error("decode request failed: {0}")]
    Decode(#[source] BoxError),
    /// The endpoint, or a middleware around it, failed.
    #[error("endpoint failed: {0}")]
    Endpoint(#[source] BoxError),
    /// The response could not be encoded.
    #[error("encode response failed: {0}")]
    Encode(#[source] BoxError),
    /// Response metadata could not be emitted.
    #[error("emit response metadata failed: {0}")]
    Metadata(#[source] BoxError),
}

/// Derives a new context from the previous one and the inbound metadata.
pub type BeforeHook = Arc<dyn Fn(ServerContext, &Metadata) -> ServerContext + Send + Sync>;
/// Derives a new context and may add response headers (first map) and trailers (second map).
pub type AfterHook = Arc<dyn Fn(ServerContext, &mut Metadata, &mut Metadata) -> ServerContext + Send + Sync>;
/// Runs after every call, with the error if the call failed.
pub type Finalizer = Arc<dyn Fn(&ServerContext, Option<&PipelineError>) + Send + Sync>;
/// Observes the error of a failing call. Side-effecting only.
pub type ErrorHandler = Arc<dyn Fn(&ServerContext, &PipelineError) + Send + Sync>;

type DecodeFn<Raw, Req> = Arc<dyn Fn(&ServerContext, Raw) -> Result<Req, BoxError> + Send + Sync>;
type EncodeFn<Resp, Out> = Arc<dyn Fn(&ServerContext, Resp) -> Result<Out, BoxError> + Send + Sync>;

/// The default error handler, which logs the error.
pub fn log_error(_: &ServerContext, err: &PipelineError) {
    warn!("[CALLMESH] pipeline error: {err}");
}

/// A server-side request pipeline turning `Raw` requests into `Out` responses
/// through an endpoint taking `Req` and producing `Resp`.
pub struct Pipeline<Raw, Req, Resp, Out> {
    endpoint: BoxEndpoint<Req, Resp>,
    decode: DecodeFn<Raw, Req>,
    encode: EncodeFn<Resp, Out>,
    before: Vec<BeforeHook>,
    after: Vec<AfterHook>,
    finalizers: Vec<Finalizer>,
    error_handler: ErrorHandler,
}

impl<Raw, Req, Resp, Out> Pipeline<Raw, Req, Resp, Out>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    /// Starts building a pipeline around `endpoint`.
    pub fn builder<E, D, C>(endpoint: E, decode: D, encode: C) -> Builder<Raw, Req, Resp, Out>
    where
        E: Endpoint<Req, Resp>,
        D: Fn(&ServerContext, Raw) -> Result<Req, BoxError> + Send + Sync + 'static,
        C: Fn(&ServerContext, Resp) -> Result<Out, BoxError> + Send + Sync + 'static,
    {
        Builder {
            endpoint: Arc::new(endpoint),
            decode: Arc::new(decode),
            encode: Arc::new(encode),
            before: Vec::new(),
            after: Vec::new(),
            chain: Chain::new(),
            finalizers: Vec::new(),
            error_handler: Arc::new(log_error),
        }
    }

    /// Runs one call through every stage.
    pub async fn serve(&self, ctx: ServerContext, raw: Raw) -> Result<Out, PipelineError> {
        let (ctx, result) = self.run(ctx, raw).await;
        for finalizer in &self.finalizers {
            finalizer(&ctx, result.as_ref().err());
        }
        result
    }

    async fn run(&self, mut ctx: ServerContext, raw: Raw) -> (ServerContext, Result<Out, PipelineError>) {
        let incoming = ctx.incoming().cloned().unwrap_or_default();
        for before in &self.before {
            ctx = before(ctx, &incoming);
        }

        let req = match (self.decode)(&ctx, raw) {
            Ok(req) => req,
            Err(e) => return self.fail(ctx, PipelineError::Decode(e)),
        };

        let resp = match self.endpoint.call(ctx.clone(), req).await {
            Ok(resp) => resp,
            Err(e) => return self.fail(ctx, PipelineError::Endpoint(e)),
        };

        let mut header = Metadata::new();
        let mut trailer = Metadata::new();
        for after in &self.after {
            ctx = after(ctx, &mut header, &mut trailer);
        }

        let out = match (self.encode)(&ctx, resp) {
            Ok(out) => out,
            Err(e) => return self.fail(ctx, PipelineError::Encode(e)),
        };

        if !header.is_empty() {
            if let Err(e) = ctx.sink().send_header(header) {
                return self.fail(ctx, PipelineError::Metadata(e));
            }
        }
        if !trailer.is_empty() {
            if let Err(e) = ctx.sink().set_trailer(trailer) {
                return self.fail(ctx, PipelineError::Metadata(e));
            }
        }

        (ctx, Ok(out))
    }

    fn fail(&self, ctx: ServerContext, err: PipelineError) -> (ServerContext, Result<Out, PipelineError>) {
        (self.error_handler)(&ctx, &err);
        (ctx, Err(err))
    }
}

/// Builds a [`Pipeline`]. The middleware chain is folded once, in [`Builder::build`].
pub struct Builder<Raw, Req, Resp, Out> {
    endpoint: BoxEndpoint<Req, Resp>,
    decode: DecodeFn<Raw, Req>,
    encode: EncodeFn<Resp, Out>,
    before: Vec<BeforeHook>,
    after: Vec<AfterHook>,
    chain: Chain<Req, Resp>,
    finalizers: Vec<Finalizer>,
    error_handler: ErrorHandler,
}

impl<Raw, Req, Resp, Out> Builder<Raw, Req, Resp, Out>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    /// Appends a before-hook.
    pub fn before<F>(mut self, hook: F) -> Self
    where
        F: Fn(ServerContext, &Metadata) -> ServerContext + Send + Sync + 'static,
    {
        self.before.push(Arc::new(hook));
        self
    }

    /// Appends an after-hook.
    pub fn after<F>(mut self, hook: F) -> Self
    where
        F: Fn(ServerContext, &mut Metadata, &mut Metadata) -> ServerContext + Send + Sync + 'static,
    {
        self.after.push(Arc::new(hook));
        self
    }

    /// Registers a middleware outside of every middleware registered so far.
    pub fn middleware<M>(mut self, middleware: M) -> Self
    where
        M: Middleware<Req, Resp>,
    {
        self.chain.push(Arc::new(middleware));
        self
    }

    /// Appends a finalizer.
    pub fn finalizer<F>(mut self, finalizer: F) -> Self
    where
        F: Fn(&ServerContext, Option<&PipelineError>) + Send + Sync + 'static,
    {
        self.finalizers.push(Arc::new(finalizer));
        self
    }

    /// Replaces the error handler, [`log_error`] by default.
    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ServerContext, &PipelineError) + Send + Sync + 'static,
    {
        self.error_handler = Arc::new(handler);
        self
    }

    /// Folds the middleware chain around the endpoint and freezes the pipeline.
    pub fn build(self) -> Pipeline<Raw, Req, Resp, Out> {
        Pipeline {
            endpoint: self.chain.apply(self.endpoint),
            decode: self.decode,
            encode: self.encode,
            before: self.before,
            after: self.after,
            finalizers: self.finalizers,
            error_handler: self.error_handler,
        }
    }
}
