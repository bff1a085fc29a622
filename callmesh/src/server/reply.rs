// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//! The structured response shape shared by ordinary replies and recovered faults.

use serde::{Deserialize, Serialize};

/// Status code of a successful reply.
pub const SUCCESS: i32 = 200;
/// Status code of a failed reply.
pub const FAILURE: i32 = 500;
/// Message of a reply built from a bare status code.
pub const NO_RESPONSE: &str = "no response";

/// A structured response: a status code, a message and optional data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply<T> {
    /// Status code, [`SUCCESS`] on success.
    pub code: i32,
    /// Human readable message.
    pub message: String,
    /// Payload, absent for failures.
    pub data: Option<T>,
}

impl<T> Reply<T> {
    /// Builds a reply from its parts.
    pub fn new(code: i32, message: impl Into<String>, data: Option<T>) -> Self {
        Self {
            code,
            message: message.into(),
            data,
        }
    }

    /// A successful reply carrying `data`.
    pub fn success(data: T) -> Self {
        Self::new(SUCCESS, "success", Some(data))
    }

    /// A failed reply carrying `message`.
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(FAILURE, message, None)
    }

    /// A reply carrying only a status code.
    pub fn code(code: i32) -> Self {
        Self::new(code, NO_RESPONSE, None)
    }

    /// Returns true if the code is [`SUCCESS`].
    pub fn is_success(&self) -> bool {
        self.code == SUCCESS
    }
}
