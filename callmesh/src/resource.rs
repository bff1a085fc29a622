// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! Narrow capability traits for cache and database collaborators.
//!
//! A collaborator implements only the capabilities it has; code that needs a capability asks for
//! that trait alone instead of one client type bundling everything.

use crate::net::Address;
use crate::BoxError;
use std::future::Future;
use tracing::warn;

/// Verifies that a resource is reachable.
pub trait Ping: Send + Sync {
    /// Returns once the resource answered.
    fn ping(&self) -> impl Future<Output = Result<(), BoxError>> + Send;
}

/// Releases the connections held by a resource.
pub trait Close: Send + Sync {
    /// Releases the resource. Further use of it is an error.
    fn close(&self) -> impl Future<Output = Result<(), BoxError>> + Send;
}

/// Executes commands of type `Cmd`.
pub trait Execute<Cmd>: Send + Sync {
    /// The result of one command.
    type Output;
    /// Executes `cmd`.
    fn execute(&self, cmd: Cmd) -> impl Future<Output = Result<Self::Output, BoxError>> + Send;
}

/// Exposes the node layout of a clustered resource.
pub trait Topology: Send + Sync {
    /// The addresses of all nodes.
    fn nodes(&self) -> Vec<Address>;

    /// Returns true if more than one node serves the resource.
    fn is_cluster(&self) -> bool {
        self.nodes().len() > 1
    }
}

/// Errors of [`open_checked`].
#[derive(thiserror::Error, Debug)]
pub enum ResourceError {
    /// The liveness check failed at construction.
    #[error("resource is unreachable: {0}")]
    Unreachable(#[source] BoxError),
}

/// Pings a freshly constructed resource and hands it back if it answered.
///
/// On failure the resource is closed before the ping error is returned.
pub async fn open_checked<R>(resource: R) -> Result<R, ResourceError>
where
    R: Ping + Close,
{
    match resource.ping().await {
        Ok(()) => Ok(resource),
        Err(e) => {
            if let Err(close_err) = resource.close().await {
                warn!("[CALLMESH] closing unreachable resource failed: {close_err}");
            }
            Err(ResourceError::Unreachable(e))
        },
    }
}

#[cfg(test)]
mod tests {
    use super::{open_checked, Close, Execute, Ping, ResourceError, Topology};
    use crate::net::Address;
    use crate::BoxError;
    use assert_matches::assert_matches;
    use std::collections::HashMap;
    use std::future::Future;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct Kv {
        down: bool,
        closed: Arc<AtomicBool>,
        data: Mutex<HashMap<String, String>>,
    }

    enum Cmd {
        Set(String, String),
        Get(String),
    }

    impl Ping for Kv {
        fn ping(&self) -> impl Future<Output = Result<(), BoxError>> + Send {
            let down = self.down;
            async move {
                if down {
                    Err("connection refused".into())
                } else {
                    Ok(())
                }
            }
        }
    }

    impl Close for Kv {
        fn close(&self) -> impl Future<Output = Result<(), BoxError>> + Send {
            self.closed.store(true, Ordering::SeqCst);
            async { Ok(()) }
        }
    }

    impl Execute<Cmd> for Kv {
        type Output = Option<String>;

        fn execute(&self, cmd: Cmd) -> impl Future<Output = Result<Self::Output, BoxError>> + Send {
            let result = self
                .data
                .lock()
                .map_err(|_| BoxError::from("poisoned"))
                .map(|mut data| match cmd {
                    Cmd::Set(k, v) => data.insert(k, v),
                    Cmd::Get(k) => data.get(&k).cloned(),
                });
            async move { result }
        }
    }

    impl Topology for Kv {
        fn nodes(&self) -> Vec<Address> {
            vec!["127.0.0.1:6379".parse().unwrap()]
        }
    }

    #[tokio::test]
    async fn reachable_resource_is_returned_open() {
        let kv = open_checked(Kv::default()).await.unwrap();
        assert!(!kv.closed.load(Ordering::SeqCst));
        kv.execute(Cmd::Set("k".into(), "v".into())).await.unwrap();
        assert_eq!(kv.execute(Cmd::Get("k".into())).await.unwrap().as_deref(), Some("v"));
        assert!(!kv.is_cluster());
    }

    #[tokio::test]
    async fn unreachable_resource_is_closed() {
        let closed = Arc::new(AtomicBool::new(false));
        let kv = Kv {
            down: true,
            closed: closed.clone(),
            ..Default::default()
        };
        assert_matches!(open_checked(kv).await, Err(ResourceError::Unreachable(_)));
        assert!(closed.load(Ordering::SeqCst));
    }
}
