// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! Business endpoints and the middleware that wraps them.

use super::ServerContext;
use crate::BoxError;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;

/// The business logic of a service, independent of transport concerns.
pub trait Endpoint<Req, Resp>: Send + Sync + 'static {
    /// Handles one decoded request.
    fn call(&self, ctx: ServerContext, req: Req) -> BoxFuture<'static, Result<Resp, BoxError>>;
}

/// A shared, type-erased endpoint.
pub type BoxEndpoint<Req, Resp> = Arc<dyn Endpoint<Req, Resp>>;

/// An [`Endpoint`] built from a closure, see [`endpoint_fn`].
#[derive(Clone)]
pub struct EndpointFn<F>(F);

/// Wraps `f` into an [`Endpoint`].
pub fn endpoint_fn<Req, Resp, F, Fut>(f: F) -> EndpointFn<F>
where
    F: Fn(ServerContext, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp, BoxError>> + Send + 'static,
{
    EndpointFn(f)
}

impl<Req, Resp, F, Fut> Endpoint<Req, Resp> for EndpointFn<F>
where
    F: Fn(ServerContext, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp, BoxError>> + Send + 'static,
{
    fn call(&self, ctx: ServerContext, req: Req) -> BoxFuture<'static, Result<Resp, BoxError>> {
        (self.0)(ctx, req).boxed()
    }
}

/// A transform wrapping an endpoint. It may rewrite the request, the response or the error,
/// log, authorize, or short-circuit.
pub trait Middleware<Req, Resp>: Send + Sync + 'static {
    /// Wraps `next` and returns the wrapped endpoint.
    fn wrap(&self, next: BoxEndpoint<Req, Resp>) -> BoxEndpoint<Req, Resp>;
}

/// A shared, type-erased middleware.
pub type BoxMiddleware<Req, Resp> = Arc<dyn Middleware<Req, Resp>>;

/// A [`Middleware`] built from a closure, see [`middleware_fn`].
#[derive(Clone)]
pub struct MiddlewareFn<F>(F);

/// Wraps `f` into a [`Middleware`].
pub fn middleware_fn<Req, Resp, F>(f: F) -> MiddlewareFn<F>
where
    F: Fn(BoxEndpoint<Req, Resp>) -> BoxEndpoint<Req, Resp> + Send + Sync + 'static,
{
    MiddlewareFn(f)
}

impl<Req, Resp, F> Middleware<Req, Resp> for MiddlewareFn<F>
where
    F: Fn(BoxEndpoint<Req, Resp>) -> BoxEndpoint<Req, Resp> + Send + Sync + 'static,
{
    fn wrap(&self, next: BoxEndpoint<Req, Resp>) -> BoxEndpoint<Req, Resp> {
        (self.0)(next)
    }
}

/// An ordered list of middleware, folded around an endpoint once at pipeline construction.
///
/// The first registered middleware wraps the raw endpoint, so it is the innermost; the last
/// registered one is the outermost and sees the request first.
pub struct Chain<Req, Resp> {
    layers: Vec<BoxMiddleware<Req, Resp>>,
}

impl<Req, Resp> Default for Chain<Req, Resp> {
    fn default() -> Self {
        Self { layers: Vec::new() }
    }
}

impl<Req: 'static, Resp: 'static> Chain<Req, Resp> {
    /// Returns an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `middleware` outside of every middleware registered so far.
    pub fn push(&mut self, middleware: BoxMiddleware<Req, Resp>) {
        self.layers.push(middleware);
    }

    /// Number of registered middleware.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Folds the chain around `endpoint`.
    pub fn apply(&self, endpoint: BoxEndpoint<Req, Resp>) -> BoxEndpoint<Req, Resp> {
        self.layers.iter().fold(endpoint, |next, layer| layer.wrap(next))
    }
}

#[cfg(test)]
mod tests {
    use super::{endpoint_fn, middleware_fn, BoxEndpoint, BoxMiddleware, Chain};
    use crate::server::ServerContext;
    use crate::BoxError;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<String>>>;

    fn tag(name: &'static str, log: Log) -> BoxMiddleware<String, String> {
        Arc::new(middleware_fn(move |next: BoxEndpoint<String, String>| {
            let log = log.clone();
            let wrapped: BoxEndpoint<String, String> = Arc::new(endpoint_fn(move |ctx: ServerContext, req: String| {
                let next = next.clone();
                let log = log.clone();
                async move {
                    log.lock().unwrap().push(format!("{name}>"));
                    let resp = next.call(ctx, format!("{req}|{name}")).await;
                    log.lock().unwrap().push(format!("<{name}"));
                    resp
                }
            }));
            wrapped
        }))
    }

    #[tokio::test]
    async fn first_registered_is_innermost() {
        let log: Log = Default::default();
        let mut chain = Chain::new();
        chain.push(tag("a", log.clone()));
        chain.push(tag("b", log.clone()));
        assert_eq!(chain.len(), 2);

        let raw: BoxEndpoint<String, String> = Arc::new(endpoint_fn(|_: ServerContext, req: String| async move { Ok::<_, BoxError>(req) }));
        let endpoint = chain.apply(raw);
        let resp = endpoint.call(ServerContext::new(), "req".to_string()).await.unwrap();

        assert_eq!(resp, "req|b|a");
        assert_eq!(*log.lock().unwrap(), vec!["b>", "a>", "<a", "<b"]);
    }

    #[tokio::test]
    async fn empty_chain_is_identity() {
        let chain: Chain<u32, u32> = Chain::new();
        assert!(chain.is_empty());
        let raw: BoxEndpoint<u32, u32> = Arc::new(endpoint_fn(|_: ServerContext, n: u32| async move { Ok::<_, BoxError>(n + 1) }));
        assert_eq!(chain.apply(raw).call(ServerContext::new(), 1).await.unwrap(), 2);
    }
}
