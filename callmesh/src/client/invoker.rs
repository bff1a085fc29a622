// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! Instance selection with a bounded retry budget and a per-attempt deadline.

use super::balance::LoadBalance;
use super::caller::Caller;
use super::context::{CallAttempt, CallContext};
use super::discover::Discover;
use super::instancer::Instancer;
use super::{CallError, ClientError, Retryable};
use std::time::Duration;
use tracing::trace;

/// Picks an instance per attempt and retries retryable failures.
///
/// The invoker itself is stateless between calls; the only shared mutable state is whatever cursor
/// the [`LoadBalance`] keeps.
pub struct Invoker<B> {
    balance: B,
    retries: u32,
    timeout: Duration,
}

impl<B: LoadBalance> Invoker<B> {
    /// Creates an invoker making at most `retries + 1` attempts of `timeout` each.
    pub fn new(balance: B, retries: u32, timeout: Duration) -> Self {
        Self { balance, retries, timeout }
    }

    /// The retry budget.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// The per-attempt timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs one logical call.
    ///
    /// Each attempt takes a fresh snapshot, picks one instance and gets a fresh deadline of
    /// `timeout`. A retryable failure moves on to the next attempt; any other failure is returned
    /// as is. Cancelling `ctx` aborts the current attempt and skips the remaining ones.
    pub async fn invoke<D, C, Req, Resp>(&self, ctx: &CallContext, instancer: &Instancer<D>, caller: &C, req: Req) -> Result<Resp, ClientError>
    where
        D: Discover,
        C: Caller<Req, Resp>,
        Req: Clone + Send,
    {
        let mut last = None;
        for index in 0..=self.retries {
            if ctx.is_canceled() {
                return Err(ClientError::Canceled);
            }
            let snapshot = instancer.snapshot().await?;
            let instance = self
                .balance
                .pick(&snapshot)
                .ok_or_else(|| ClientError::NoInstanceAvailable(instancer.target().key()))?;
            let attempt = CallAttempt::new(instance, self.timeout, index);

            let result = tokio::select! {
                biased;
                _ = ctx.canceled() => return Err(ClientError::Canceled),
                result = tokio::time::timeout_at(attempt.deadline, caller.call(&attempt, ctx, req.clone())) => result,
            };
            let err = match result {
                Ok(Ok(resp)) => return Ok(resp),
                Ok(Err(err)) => err,
                Err(_) => CallError::DeadlineExceeded,
            };
            if !err.retryable() {
                return Err(ClientError::Call(err));
            }
            trace!(
                "[CALLMESH] attempt {}/{} to {} failed, err: {}",
                index + 1,
                self.retries + 1,
                attempt.instance.address,
                err
            );
            last = Some(err);
        }
        Err(ClientError::RetriesExhausted {
            attempts: self.retries + 1,
            last: last.unwrap_or(CallError::DeadlineExceeded),
        })
    }
}
