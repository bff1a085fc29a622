// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//! A client config.

use super::balance::LoadBalance;
use super::discover::Discover;
use super::stub::RpcClient;
use super::ClientError;
use faststr::FastStr;
use serde::Deserialize;
use std::time::Duration;

/// Default retry budget.
pub const DEFAULT_RETRIES: u32 = 3;
/// Default per-attempt timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MILLIS: u64 = 3000;

/// The call configuration of an [`RpcClient`]. Immutable once the client is built.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// discovery target, the logical service name to resolve.
    pub target: String,
    /// number of retries after the first attempt.
    pub retries: u32,
    /// per-attempt timeout in milliseconds, must be positive.
    pub timeout_millis: u64,
    /// opaque credential forwarded as the `authorization` metadata; empty means none.
    pub auth_token: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            target: String::new(),
            retries: DEFAULT_RETRIES,
            timeout_millis: DEFAULT_TIMEOUT_MILLIS,
            auth_token: String::new(),
        }
    }
}

impl ClientConfig {
    /// Returns the default config for `target`.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Default::default()
        }
    }

    /// The per-attempt timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_millis)
    }

    /// Checks the invariants of the config.
    ///
    /// An empty or unresolvable target is accepted: it surfaces at the first invoke.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.timeout_millis == 0 {
            return Err(ClientError::Config(FastStr::from_static_str("timeout_millis must be positive")));
        }
        Ok(())
    }
}

/// Assembles a [`ClientConfig`] option by option and validates it once, at the end.
#[derive(Debug, Clone)]
#[must_use]
pub struct ConfigBuilder {
    config: ClientConfig,
}

impl ConfigBuilder {
    /// Starts from the defaults for `target`.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            config: ClientConfig::new(target),
        }
    }

    /// Set the number of retries after the first attempt.
    pub fn retries(mut self, retries: u32) -> Self {
        self.config.retries = retries;
        self
    }

    /// Set the per-attempt timeout. Saturates at `u64::MAX` milliseconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout_millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the per-attempt timeout in milliseconds.
    pub fn timeout_millis(mut self, timeout_millis: u64) -> Self {
        self.config.timeout_millis = timeout_millis;
        self
    }

    /// Set the call credential.
    pub fn auth_token(mut self, auth_token: impl Into<String>) -> Self {
        self.config.auth_token = auth_token.into();
        self
    }

    /// Validates and returns the config.
    pub fn build(self) -> Result<ClientConfig, ClientError> {
        self.config.validate()?;
        Ok(self.config)
    }

    /// Validates the config and builds a client from it.
    pub fn client<D, B, C>(self, discover: D, balance: B, caller: C) -> Result<RpcClient<D, B, C>, ClientError>
    where
        D: Discover,
        B: LoadBalance,
    {
        RpcClient::new(self.config, discover, balance, caller)
    }
}

#[cfg(test)]
mod tests {
    use super::{ClientConfig, ConfigBuilder, DEFAULT_RETRIES, DEFAULT_TIMEOUT_MILLIS};
    use crate::client::ClientError;
    use assert_matches::assert_matches;
    use std::time::Duration;

    #[test]
    fn defaults() {
        let config = ClientConfig::new("svc");
        assert_eq!(config.retries, DEFAULT_RETRIES);
        assert_eq!(config.timeout(), Duration::from_millis(DEFAULT_TIMEOUT_MILLIS));
        assert!(config.auth_token.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_validates_once_at_the_end() {
        let config = ConfigBuilder::new("svc").timeout_millis(0).timeout(Duration::from_millis(250)).retries(1).auth_token("t").build().unwrap();
        assert_eq!(config.timeout_millis, 250);
        assert_eq!(config.retries, 1);
        assert_eq!(config.auth_token, "t");

        assert_matches!(ConfigBuilder::new("svc").timeout(Duration::ZERO).build(), Err(ClientError::Config(_)));
    }

    #[test]
    fn empty_target_is_not_a_config_error() {
        assert!(ConfigBuilder::new("").build().is_ok());
    }
}
