// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use callmesh::client::{CallContext, Instance, LocalCaller, MemoryDiscover, RandomBalance, RpcClient};
use callmesh::net::Address;
use callmesh::server::{RecordingSink, Reply};
use clap::Parser;
use service::{greeter, init_tracing, Greet, TRACE_ID};
use std::sync::Arc;

const SERVICE: &str = "greeter";

#[derive(Parser)]
struct Flags {
    /// Who to greet. Leave empty to exercise panic recovery.
    #[clap(long, default_value = "world")]
    name: String,
    /// Token presented by the client.
    #[clap(long, default_value = "secret")]
    token: String,
    /// Token the server accepts.
    #[clap(long, default_value = "secret")]
    server_token: String,
    /// Retries after the first attempt.
    #[clap(long, default_value_t = 2)]
    retries: u32,
    /// Per-attempt timeout in milliseconds.
    #[clap(long, default_value_t = 1000)]
    timeout_millis: u64,
    /// Instances registered under the service name.
    #[clap(long, default_value_t = 3)]
    instances: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let flags = Flags::parse();
    init_tracing("demo")?;

    let discover = Arc::new(MemoryDiscover::new());
    for i in 0..flags.instances {
        let address: Address = format!("127.0.0.1:{}", 7000 + i).parse()?;
        discover.register(SERVICE, Instance::new(address));
    }

    let sink = RecordingSink::new();
    let caller = LocalCaller::new(greeter(flags.server_token)).with_sink(Arc::new(sink.clone()));
    let client = RpcClient::builder(SERVICE)
        .retries(flags.retries)
        .timeout_millis(flags.timeout_millis)
        .auth_token(flags.token)
        .client(discover.clone(), RandomBalance::new(), caller)?;

    tracing::info!("[CALLMESH] {} instances of {SERVICE}", client.instances().await?.len());

    let ctx = CallContext::current().with_metadata(TRACE_ID, "demo-1");
    let result: Result<Reply<String>, _> = client.invoke(&ctx, Greet { name: flags.name }).await;
    match result {
        Ok(reply) => tracing::info!("[CALLMESH] reply: code={} message={} data={:?}", reply.code, reply.message, reply.data),
        Err(e) => tracing::warn!("[CALLMESH] call failed: {e}"),
    }
    tracing::info!("[CALLMESH] response header: {:?}", sink.header());
    Ok(())
}
