// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//! The wire request: call metadata travelling next to the payload.

use crate::server::Metadata;
use serde::{Deserialize, Serialize};
use tarpc::RequestName;

/// A request as sent over a tarpc channel.
///
/// tarpc's context has no room for user metadata, so the caller's metadata, including the
/// `authorization` credential, rides in the request itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<Req> {
    /// Outbound call metadata, the inbound metadata of the server pipeline.
    pub metadata: Metadata,
    /// The request proper.
    pub payload: Req,
}

impl<Req> Envelope<Req> {
    /// Wraps `payload` with `metadata`.
    pub fn new(metadata: Metadata, payload: Req) -> Self {
        Self { metadata, payload }
    }
}

impl<Req: RequestName> RequestName for Envelope<Req> {
    fn name(&self) -> &'static str {
        self.payload.name()
    }
}
