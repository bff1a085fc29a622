use assert_matches::assert_matches;
use callmesh::client::context::AUTHORIZATION;
use callmesh::client::{CallAttempt, CallContext, CallError, Caller, ClientError, FixedDiscover, Instance, LocalCaller, MemoryDiscover, RoundRobinBalance, RpcClient};
use callmesh::net::Address;
use callmesh::server::{endpoint_fn, middleware_fn, BoxEndpoint, Pipeline, Recovery, Reply, ServerContext};
use callmesh::BoxError;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
struct Greet {
    name: String,
}

type GreetPipeline = Pipeline<Greet, Greet, Reply<String>, Reply<String>>;

/// A greeter guarded by a token check, with panics recovered.
fn greeter(token: &'static str, calls: Arc<AtomicU32>) -> Arc<GreetPipeline> {
    let endpoint = endpoint_fn(move |_: ServerContext, req: Greet| {
        calls.fetch_add(1, Ordering::SeqCst);
        async move {
            if req.name.is_empty() {
                panic!("empty name");
            }
            Ok::<_, BoxError>(Reply::success(format!("hello, {}", req.name)))
        }
    });
    let auth = middleware_fn(move |next: BoxEndpoint<Greet, Reply<String>>| {
        let guarded: BoxEndpoint<Greet, Reply<String>> = Arc::new(endpoint_fn(move |ctx: ServerContext, req: Greet| {
            let next = next.clone();
            async move {
                let authorized = ctx.incoming().and_then(|md| md.get(AUTHORIZATION)).map(|v| v.as_str() == token).unwrap_or(false);
                if !authorized {
                    return Err(Box::new(CallError::Unauthenticated("bad token".into())) as BoxError);
                }
                next.call(ctx, req).await
            }
        }));
        guarded
    });
    let pipeline = Pipeline::builder(endpoint, |_: &ServerContext, raw: Greet| Ok(raw), |_: &ServerContext, reply: Reply<String>| Ok(reply))
        .middleware(Recovery::<String>::new())
        .middleware(auth)
        .build();
    Arc::new(pipeline)
}

fn registry() -> Arc<MemoryDiscover> {
    let discover = Arc::new(MemoryDiscover::new());
    discover.register("greeter", Instance::new("127.0.0.1:7000".parse::<Address>().unwrap()));
    discover
}

#[tokio::test]
async fn invoke_through_local_pipeline() -> anyhow::Result<()> {
    let calls = Arc::new(AtomicU32::new(0));
    let client = RpcClient::builder("greeter").auth_token("secret").retries(2).client(registry(), RoundRobinBalance::new(), LocalCaller::new(greeter("secret", calls.clone())))?;

    let reply: Reply<String> = client.invoke(&CallContext::current(), Greet { name: "bob".into() }).await?;
    assert_eq!(reply, Reply::success("hello, bob".to_string()));

    let reply: Reply<String> = client.invoke(&CallContext::current(), Greet { name: String::new() }).await?;
    assert_eq!(reply, Reply::failure("empty name"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn rejected_credential_is_not_retried() -> anyhow::Result<()> {
    let calls = Arc::new(AtomicU32::new(0));
    let client = RpcClient::builder("greeter").auth_token("wrong").retries(5).client(registry(), RoundRobinBalance::new(), LocalCaller::new(greeter("secret", calls.clone())))?;

    let result: Result<Reply<String>, _> = client.invoke(&CallContext::current(), Greet { name: "bob".into() }).await;
    assert_matches!(result, Err(ClientError::Call(CallError::Unauthenticated(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn unknown_target_fails_at_first_invoke() -> anyhow::Result<()> {
    let client = RpcClient::builder("nobody").client(registry(), RoundRobinBalance::new(), LocalCaller::new(greeter("secret", Default::default())))?;
    let result: Result<Reply<String>, _> = client.invoke(&CallContext::current(), Greet { name: "bob".into() }).await;
    assert_matches!(result, Err(ClientError::NoInstanceAvailable(key)) if key.as_str() == "nobody");
    Ok(())
}

#[tokio::test]
async fn zero_timeout_is_rejected_at_construction() {
    let result = RpcClient::builder("greeter").timeout(Duration::ZERO).client(registry(), RoundRobinBalance::new(), LocalCaller::new(greeter("secret", Default::default())));
    assert_matches!(result.err(), Some(ClientError::Config(_)));
}

#[tokio::test]
async fn new_members_become_visible() -> anyhow::Result<()> {
    let discover = registry();
    let client = RpcClient::builder("greeter").auth_token("secret").client(discover.clone(), RoundRobinBalance::new(), LocalCaller::new(greeter("secret", Default::default())))?;
    assert_eq!(client.instances().await?.len(), 1);

    discover.register("greeter", Instance::new("127.0.0.1:7001".parse::<Address>().unwrap()));
    let mut len = 0;
    for _ in 0..100 {
        len = client.instances().await?.len();
        if len == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(len, 2);
    Ok(())
}

/// Never answers.
struct Hanging {
    calls: Arc<AtomicU32>,
}

impl Caller<u32, u32> for Hanging {
    fn call(&self, _: &CallAttempt, _: &CallContext, _: u32) -> impl Future<Output = Result<u32, CallError>> + Send {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending()
    }
}

fn hanging_client(retries: u32, timeout: Duration) -> (RpcClient<FixedDiscover, RoundRobinBalance, Hanging>, Arc<AtomicU32>) {
    let calls = Arc::new(AtomicU32::new(0));
    let client = RpcClient::builder("svc")
        .retries(retries)
        .timeout(timeout)
        .client(
            FixedDiscover::from_address_str(["127.0.0.1:8000"]).unwrap(),
            RoundRobinBalance::new(),
            Hanging { calls: calls.clone() },
        )
        .unwrap();
    (client, calls)
}

#[tokio::test(start_paused = true)]
async fn each_attempt_gets_its_own_deadline() -> anyhow::Result<()> {
    let (client, calls) = hanging_client(2, Duration::from_millis(100));
    let started = tokio::time::Instant::now();
    let result: Result<u32, _> = client.invoke(&CallContext::current(), 1).await;
    assert_matches!(result, Err(ClientError::RetriesExhausted { attempts: 3, last: CallError::DeadlineExceeded }));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(started.elapsed() >= Duration::from_millis(300));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cancellation_aborts_the_current_attempt() -> anyhow::Result<()> {
    let (client, calls) = hanging_client(5, Duration::from_secs(10));
    let ctx = CallContext::current();
    let canceler = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceler.cancel();
    });

    let started = tokio::time::Instant::now();
    let result: Result<u32, _> = client.invoke(&ctx, 1).await;
    assert_matches!(result, Err(ClientError::Canceled));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(started.elapsed() < Duration::from_secs(10));
    Ok(())
}
