// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//! RPC Channel
//!
//! A [`Caller`] backed by tarpc: one multiplexed channel per instance address, dialed on first use.
//! Requests travel as [`Envelope`]s, so the call metadata reaches the server; serve them with
//! [`crate::server::PipelineService`].

use super::caller::Caller;
use super::context::{CallAttempt, CallContext};
use super::CallError;
use crate::net::Address;
pub use crate::transport::codec::*;
use crate::transport::{tcp, Envelope};
use dashmap::DashMap;
use faststr::FastStr;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use tarpc::client::{Channel, RpcError};
use tarpc::server::Serve;
use tarpc::{context, RequestName, ServerError};
use tracing::{debug, trace};

/// Settings that control the behavior of the RPC channels.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RpcChannelConfig {
    /// transport codec type.
    pub codec: Codec,
    /// The number of requests that can be in flight at once.
    /// `max_in_flight_requests` controls the size of the map used by the client
    /// for storing pending requests.
    /// Default is 1000.
    pub max_in_flight_requests: usize,
    /// The number of requests that can be buffered client-side before being sent.
    /// `pending_requests_buffer` controls the size of the channel clients use
    /// to communicate with the request dispatch task.
    /// Default is 100.
    pub pending_request_buffer: usize,
    /// Maximum frame length accepted by the transport.
    pub max_frame_len: usize,
}

impl Default for RpcChannelConfig {
    fn default() -> Self {
        let core = tarpc::client::Config::default();
        Self {
            codec: Codec::default(),
            max_in_flight_requests: core.max_in_flight_requests,
            pending_request_buffer: core.pending_request_buffer,
            max_frame_len: usize::MAX,
        }
    }
}

impl RpcChannelConfig {
    /// Set transport serde codec
    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }
    /// Set the number of requests that can be in flight at once.
    pub fn with_max_in_flight_requests(mut self, max_in_flight_requests: usize) -> Self {
        self.max_in_flight_requests = max_in_flight_requests;
        self
    }
    /// Set the number of requests that can be buffered client-side before being sent.
    pub fn with_pending_request_buffer(mut self, pending_request_buffer: usize) -> Self {
        self.pending_request_buffer = pending_request_buffer;
        self
    }
    /// Set the maximum frame length.
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    fn core_config(&self) -> tarpc::client::Config {
        let mut core = tarpc::client::Config::default();
        core.max_in_flight_requests = self.max_in_flight_requests;
        core.pending_request_buffer = self.pending_request_buffer;
        core
    }
}

/// Remote procedure call through tarpc channels, shared by every attempt of a client.
///
/// A channel that reports [`RpcError::Shutdown`] or a channel failure is evicted, so the next
/// attempt on that address dials again. Each call carries the attempt deadline as its tarpc
/// deadline.
pub struct RpcCaller<S: Serve> {
    config: RpcChannelConfig,
    channels: DashMap<Address, Channel<S::Req, S::Resp>>,
}

impl<S: Serve> fmt::Debug for RpcCaller<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcCaller").field("config", &self.config).field("channels", &self.channels.len()).finish()
    }
}

impl<S> RpcCaller<S>
where
    S: Serve,
    S::Req: Serialize + Send + 'static,
    S::Resp: for<'de> Deserialize<'de> + Send + 'static,
{
    /// Returns a caller with no open channel.
    pub fn new(config: RpcChannelConfig) -> Self {
        Self {
            config,
            channels: DashMap::new(),
        }
    }

    /// Number of cached channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    async fn channel(&self, address: &Address) -> Result<Channel<S::Req, S::Resp>, CallError> {
        let cached = self.channels.get(address).map(|channel| channel.clone());
        if let Some(channel) = cached {
            return Ok(channel);
        }
        let socket = address
            .as_ip()
            .copied()
            .ok_or_else(|| CallError::Transport(format!("tcp transport cannot dial {address}").into()))?;
        let channel = self.dial(socket).await.map_err(|e| CallError::Transport(e.into()))?;
        debug!("[CALLMESH] RpcCaller: dialed {address}");
        Ok(self.channels.entry(address.clone()).or_insert(channel).clone())
    }

    async fn dial(&self, address: SocketAddr) -> std::io::Result<Channel<S::Req, S::Resp>> {
        let core = self.config.core_config();
        let max_frame_len = self.config.max_frame_len;
        match self.config.codec {
            Codec::Bincode => {
                let mut conn = tcp::connect(address, Bincode::default);
                conn.config_mut().max_frame_length(max_frame_len);
                Ok(tarpc::client::new(core, conn.await?).spawn())
            },
            Codec::Json => {
                let mut conn = tcp::connect(address, Json::default);
                conn.config_mut().max_frame_length(max_frame_len);
                Ok(tarpc::client::new(core, conn.await?).spawn())
            },
            #[cfg(feature = "serde-transport-messagepack")]
            Codec::MessagePack => {
                let mut conn = tcp::connect(address, MessagePack::default);
                conn.config_mut().max_frame_length(max_frame_len);
                Ok(tarpc::client::new(core, conn.await?).spawn())
            },
            #[cfg(feature = "serde-transport-cbor")]
            Codec::Cbor => {
                let mut conn = tcp::connect(address, Cbor::default);
                conn.config_mut().max_frame_length(max_frame_len);
                Ok(tarpc::client::new(core, conn.await?).spawn())
            },
        }
    }
}

impl<S, Req> Caller<Req, S::Resp> for RpcCaller<S>
where
    S: Serve<Req = Envelope<Req>> + Send + Sync + 'static,
    Req: RequestName + Serialize + Send + Sync + 'static,
    S::Resp: for<'de> Deserialize<'de> + Send + Sync + 'static,
{
    fn call(&self, attempt: &CallAttempt, ctx: &CallContext, req: Req) -> impl Future<Output = Result<S::Resp, CallError>> + Send {
        let address = attempt.instance.address.clone();
        let mut rpc_ctx = context::current();
        rpc_ctx.deadline = attempt.deadline.into_std();
        let envelope = Envelope::new(ctx.metadata().clone(), req);
        async move {
            let channel = self.channel(&address).await?;
            match channel.call(rpc_ctx, envelope).await {
                Ok(resp) => Ok(resp),
                Err(e @ (RpcError::Shutdown | RpcError::Channel(_))) => {
                    trace!("[CALLMESH] RpcCaller: channel to {address} is down, evicting, err: {e}");
                    self.channels.remove(&address);
                    Err(CallError::Transport(e.to_string().into()))
                },
                Err(RpcError::DeadlineExceeded) => Err(CallError::DeadlineExceeded),
                Err(RpcError::Server(e)) => Err(CallError::from(e)),
                Err(e) => Err(CallError::Transport(e.to_string().into())),
            }
        }
    }
}

impl From<ServerError> for CallError {
    fn from(e: ServerError) -> Self {
        match e.kind {
            io::ErrorKind::InvalidInput => CallError::Malformed(FastStr::new(e.detail)),
            io::ErrorKind::PermissionDenied => CallError::Unauthenticated(FastStr::new(e.detail)),
            io::ErrorKind::TimedOut => CallError::DeadlineExceeded,
            io::ErrorKind::BrokenPipe => CallError::Transport(e.detail.into()),
            _ => CallError::Endpoint(FastStr::new(e.detail)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Codec, RpcChannelConfig};

    #[test]
    fn config_defaults_follow_tarpc() {
        let core = tarpc::client::Config::default();
        let config = RpcChannelConfig::default().with_codec(Codec::Json);
        assert_eq!(config.codec, Codec::Json);
        assert_eq!(config.max_in_flight_requests, core.max_in_flight_requests);
        assert_eq!(config.pending_request_buffer, core.pending_request_buffer);
        assert_eq!(config.max_frame_len, usize::MAX);
    }
}
