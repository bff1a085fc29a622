// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//! A greeter service assembled from callmesh parts, shared by the demo binary.

use callmesh::client::context::AUTHORIZATION;
use callmesh::client::CallError;
use callmesh::server::{endpoint_fn, log_error, middleware_fn, BoxEndpoint, Pipeline, Recovery, Reply, ServerContext};
use callmesh::BoxError;
use faststr::FastStr;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Inbound metadata key carrying the caller's trace id.
pub const TRACE_ID: &str = "x-trace-id";

/// A greeting request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Greet {
    /// Who to greet. An empty name makes the endpoint panic.
    pub name: String,
}

/// The pipeline type of the greeter.
pub type GreeterPipeline = Pipeline<Greet, Greet, Reply<String>, Reply<String>>;

/// Installs a `fmt` subscriber filtered by [`env_filter`].
pub fn init_tracing(service_name: &str) -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(env_filter(service_name)?).try_init().map_err(|e| anyhow::anyhow!(e))?;
    Ok(())
}

/// `RUST_LOG` plus `info` for the binary, this library and callmesh.
pub fn env_filter(service_name: &str) -> anyhow::Result<EnvFilter> {
    let binary = service_name.replace('-', "_");
    let mut filter = EnvFilter::from_default_env();
    for target in [binary.as_str(), "service", "callmesh"] {
        filter = filter.add_directive(format!("{target}=info").parse()?);
    }
    Ok(filter)
}

/// Builds the greeter: panics are recovered into replies and calls without `token` are rejected.
pub fn greeter(token: impl Into<FastStr>) -> Arc<GreeterPipeline> {
    let token = token.into();
    let endpoint = endpoint_fn(|ctx: ServerContext, req: Greet| async move {
        if req.name.is_empty() {
            panic!("nobody to greet");
        }
        let trace = ctx.value("trace").cloned().unwrap_or_default();
        tracing::info!("[CALLMESH] greeting {} (trace {trace})", req.name);
        Ok::<_, BoxError>(Reply::success(format!("hello, {}", req.name)))
    });
    let auth = middleware_fn(move |next: BoxEndpoint<Greet, Reply<String>>| {
        let token = token.clone();
        let guarded: BoxEndpoint<Greet, Reply<String>> = Arc::new(endpoint_fn(move |ctx: ServerContext, req: Greet| {
            let next = next.clone();
            let token = token.clone();
            async move {
                let presented = ctx.incoming().and_then(|md| md.get(AUTHORIZATION)).map(|v| *v == token);
                if presented != Some(true) {
                    return Err(Box::new(CallError::Unauthenticated("invalid token".into())) as BoxError);
                }
                next.call(ctx, req).await
            }
        }));
        guarded
    });
    let pipeline = Pipeline::builder(endpoint, |_: &ServerContext, raw: Greet| Ok(raw), |_: &ServerContext, reply: Reply<String>| Ok(reply))
        .before(|ctx, md| match md.get(TRACE_ID) {
            Some(trace) => ctx.with_value("trace", trace.clone()),
            None => ctx,
        })
        .after(|ctx, header, _| {
            header.insert("x-served-by", "greeter");
            ctx
        })
        .middleware(Recovery::<String>::new())
        .middleware(auth)
        .error_handler(log_error)
        .build();
    Arc::new(pipeline)
}

#[cfg(test)]
mod tests {
    use super::env_filter;

    #[test]
    fn filter_covers_binary_and_libraries() {
        let filter = env_filter("greeter-demo").unwrap().to_string();
        for directive in ["greeter_demo=info", "service=info", "callmesh=info"] {
            assert!(filter.contains(directive), "{directive} missing from {filter}");
        }
    }
}
