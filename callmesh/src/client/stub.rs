// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//! The client stub application code calls.

use super::balance::LoadBalance;
use super::caller::Caller;
use super::config::{ClientConfig, ConfigBuilder};
use super::context::{CallContext, AUTHORIZATION};
use super::discover::{Discover, InstanceSnapshot};
use super::instancer::Instancer;
use super::invoker::Invoker;
use super::ClientError;
use crate::target::Target;
use faststr::FastStr;

/// A client bound to one discovery target, safe to share between concurrent callers.
///
/// Construction never contacts the discoverer; an empty or unresolvable target surfaces at the
/// first [`RpcClient::invoke`].
pub struct RpcClient<D, B, C> {
    config: ClientConfig,
    auth_token: Option<FastStr>,
    instancer: Instancer<D>,
    invoker: Invoker<B>,
    caller: C,
}

impl RpcClient<(), (), ()> {
    /// Starts an option-by-option configuration for `target`; finish it with [`ConfigBuilder::client`].
    pub fn builder(target: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder::new(target)
    }
}

impl<D, B, C> RpcClient<D, B, C>
where
    D: Discover,
    B: LoadBalance,
{
    /// Builds a client from a complete config.
    pub fn new(config: ClientConfig, discover: D, balance: B, caller: C) -> Result<Self, ClientError> {
        let target = Target::new(config.target.clone());
        Self::with_target(config, target, discover, balance, caller)
    }

    /// Builds a client resolving an explicit [`Target`], e.g. one carrying tags or a fixed address.
    /// The target replaces `config.target` for discovery.
    pub fn with_target(config: ClientConfig, target: Target, discover: D, balance: B, caller: C) -> Result<Self, ClientError> {
        config.validate()?;
        let auth_token = (!config.auth_token.is_empty()).then(|| FastStr::new(&config.auth_token));
        Ok(Self {
            invoker: Invoker::new(balance, config.retries, config.timeout()),
            instancer: Instancer::new(discover, target),
            auth_token,
            config,
            caller,
        })
    }

    /// The configuration the client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The underlying caller.
    pub fn caller(&self) -> &C {
        &self.caller
    }

    /// The current membership of the target.
    pub async fn instances(&self) -> Result<InstanceSnapshot, ClientError> {
        self.instancer.snapshot().await
    }

    /// Calls the service with the configured retry budget and per-attempt timeout.
    ///
    /// The call runs in a child of `ctx`, so cancelling `ctx` aborts it.
    pub async fn invoke<Req, Resp>(&self, ctx: &CallContext, req: Req) -> Result<Resp, ClientError>
    where
        C: Caller<Req, Resp>,
        Req: Clone + Send,
    {
        let mut ctx = ctx.child();
        if let Some(token) = &self.auth_token {
            ctx.metadata_mut().insert(AUTHORIZATION, token.clone());
        }
        self.invoker.invoke(&ctx, &self.instancer, &self.caller, req).await
    }
}
