// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! Panic recovery around a business endpoint.
//!
//! [`Recovery`] captures a panic raised while the wrapped endpoint runs and classifies its payload
//! into a [`Fault`]. Every fault but [`Fault::Unknown`] becomes an ordinary [`Reply`]; an unknown
//! payload is logged with a backtrace and the unwind is resumed, so defects are never masked as
//! business failures.
//!
//! Register it first so that it is the innermost middleware.

use super::endpoint::{BoxEndpoint, Endpoint, Middleware};
use super::reply::Reply;
use super::ServerContext;
use crate::BoxError;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::backtrace::Backtrace;
use std::marker::PhantomData;
use std::panic::{resume_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::error;

/// The classified payload of a captured panic.
#[derive(Debug)]
pub enum Fault<T> {
    /// A pre-built reply, passed through unchanged.
    Reply(Reply<T>),
    /// An error value, carried by its message.
    Error(String),
    /// A string message.
    Message(String),
    /// A bare status code.
    Code(i32),
    /// Anything else. Not convertible into a reply.
    Unknown(Box<dyn Any + Send>),
}

macro_rules! downcast_or {
    ($payload:ident, $ty:ty, $v:ident => $fault:expr) => {
        let $payload = match $payload.downcast::<$ty>() {
            Ok($v) => return $fault,
            Err(other) => other,
        };
    };
}

impl<T: 'static> Fault<T> {
    /// Classifies a panic payload.
    ///
    /// A panic payload is only an `Any`, so errors are recognized by concrete type: [`BoxError`],
    /// [`anyhow::Error`] and [`std::io::Error`]. Any other error type, even one implementing
    /// [`std::error::Error`], is [`Fault::Unknown`]; box it into a [`BoxError`] before panicking to
    /// have it recovered.
    pub fn classify(payload: Box<dyn Any + Send>) -> Self {
        downcast_or!(payload, Reply<T>, v => Fault::Reply(*v));
        downcast_or!(payload, BoxError, v => Fault::Error(v.to_string()));
        downcast_or!(payload, anyhow::Error, v => Fault::Error(v.to_string()));
        downcast_or!(payload, std::io::Error, v => Fault::Error(v.to_string()));
        downcast_or!(payload, String, v => Fault::Message(*v));
        downcast_or!(payload, &'static str, v => Fault::Message((*v).to_owned()));
        downcast_or!(payload, i32, v => Fault::Code(*v));
        downcast_or!(payload, i64, v => i32::try_from(*v).map_or(Fault::Unknown(v), Fault::Code));
        downcast_or!(payload, u16, v => Fault::Code(i32::from(*v)));
        downcast_or!(payload, u32, v => i32::try_from(*v).map_or(Fault::Unknown(v), Fault::Code));
        downcast_or!(payload, usize, v => i32::try_from(*v).map_or(Fault::Unknown(v), Fault::Code));
        downcast_or!(payload, isize, v => i32::try_from(*v).map_or(Fault::Unknown(v), Fault::Code));
        Fault::Unknown(payload)
    }

    /// Converts the fault into a reply, or hands the payload back if it is unknown.
    pub fn into_reply(self) -> Result<Reply<T>, Box<dyn Any + Send>> {
        match self {
            Fault::Reply(reply) => Ok(reply),
            Fault::Error(message) | Fault::Message(message) => Ok(Reply::failure(message)),
            Fault::Code(code) => Ok(Reply::code(code)),
            Fault::Unknown(payload) => Err(payload),
        }
    }
}

/// Middleware that converts panics of the wrapped endpoint into replies.
pub struct Recovery<T> {
    _reply: PhantomData<fn() -> T>,
}

impl<T> Recovery<T> {
    /// Creates the middleware.
    pub fn new() -> Self {
        Self { _reply: PhantomData }
    }
}

impl<T> Default for Recovery<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Req, T> Middleware<Req, Reply<T>> for Recovery<T>
where
    Req: Send + 'static,
    T: Send + 'static,
{
    fn wrap(&self, next: BoxEndpoint<Req, Reply<T>>) -> BoxEndpoint<Req, Reply<T>> {
        Arc::new(Recovered { next })
    }
}

struct Recovered<Req, T> {
    next: BoxEndpoint<Req, Reply<T>>,
}

impl<Req, T> Endpoint<Req, Reply<T>> for Recovered<Req, T>
where
    Req: Send + 'static,
    T: Send + 'static,
{
    fn call(&self, ctx: ServerContext, req: Req) -> BoxFuture<'static, Result<Reply<T>, BoxError>> {
        let next = self.next.clone();
        // The endpoint is entered inside the guarded future, so a panic raised before its first
        // suspension point is captured too.
        let guarded = AssertUnwindSafe(async move { next.call(ctx, req).await }).catch_unwind();
        async move {
            match guarded.await {
                Ok(result) => result,
                Err(payload) => match Fault::<T>::classify(payload).into_reply() {
                    Ok(reply) => Ok(reply),
                    Err(payload) => {
                        let backtrace = Backtrace::force_capture();
                        error!("[CALLMESH] Recovery panic: unrecoverable payload of type {:?}, propagating\n{backtrace}", (*payload).type_id());
                        resume_unwind(payload)
                    },
                },
            }
        }
        .boxed()
    }
}
