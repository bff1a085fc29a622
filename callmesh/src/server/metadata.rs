// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//! Out-of-band key/value metadata attached to a call, and the transport side channel it is emitted on.

use crate::BoxError;
use faststr::FastStr;
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Multi-valued header map. Keys are normalized to lowercase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata {
    entries: FnvHashMap<FastStr, Vec<FastStr>>,
}

impl Metadata {
    /// Returns an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    fn normalize(key: impl Into<FastStr>) -> FastStr {
        let key = key.into();
        if key.as_str().bytes().any(|b| b.is_ascii_uppercase()) {
            FastStr::new(key.as_str().to_ascii_lowercase())
        } else {
            key
        }
    }

    /// Appends a value for `key`, keeping previous values.
    pub fn append(&mut self, key: impl Into<FastStr>, value: impl Into<FastStr>) {
        self.entries.entry(Self::normalize(key)).or_default().push(value.into());
    }

    /// Replaces every value of `key` with `value`.
    pub fn insert(&mut self, key: impl Into<FastStr>, value: impl Into<FastStr>) {
        self.entries.insert(Self::normalize(key), vec![value.into()]);
    }

    /// First value of `key`.
    pub fn get(&self, key: &str) -> Option<&FastStr> {
        self.get_all(key).first()
    }

    /// All values of `key`, in insertion order.
    pub fn get_all(&self, key: &str) -> &[FastStr] {
        match self.entries.get(&FastStr::new(key.to_ascii_lowercase())) {
            Some(values) => values.as_slice(),
            None => &[],
        }
    }

    /// Removes `key` and returns its values.
    pub fn remove(&mut self, key: &str) -> Option<Vec<FastStr>> {
        self.entries.remove(&FastStr::new(key.to_ascii_lowercase()))
    }

    /// Returns true if `key` has at least one value.
    pub fn contains_key(&self, key: &str) -> bool {
        !self.get_all(key).is_empty()
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over keys and their values.
    pub fn iter(&self) -> impl Iterator<Item = (&FastStr, &[FastStr])> {
        self.entries.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Appends every entry of `other`.
    pub fn merge(&mut self, other: Metadata) {
        for (key, values) in other.entries {
            self.entries.entry(key).or_default().extend(values);
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Metadata
where
    K: Into<FastStr>,
    V: Into<FastStr>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut md = Metadata::new();
        for (k, v) in iter {
            md.append(k, v);
        }
        md
    }
}

/// The transport side channel over which response headers and trailers are emitted.
pub trait MetadataSink: Send + Sync {
    /// Sends response headers.
    fn send_header(&self, header: Metadata) -> Result<(), BoxError>;
    /// Sets response trailers.
    fn set_trailer(&self, trailer: Metadata) -> Result<(), BoxError>;
}

/// A sink that drops all metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl MetadataSink for NoopSink {
    fn send_header(&self, _: Metadata) -> Result<(), BoxError> {
        Ok(())
    }

    fn set_trailer(&self, _: Metadata) -> Result<(), BoxError> {
        Ok(())
    }
}

/// What a [`RecordingSink`] observed, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emitted {
    /// Headers were sent.
    Header(Metadata),
    /// Trailers were set.
    Trailer(Metadata),
}

/// A sink that records everything emitted on it.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    emitted: Arc<Mutex<Vec<Emitted>>>,
}

impl RecordingSink {
    /// Returns an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything emitted so far.
    pub fn emitted(&self) -> Vec<Emitted> {
        self.emitted.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Merged headers emitted so far.
    pub fn header(&self) -> Metadata {
        self.collect(|e| match e {
            Emitted::Header(md) => Some(md),
            Emitted::Trailer(_) => None,
        })
    }

    /// Merged trailers emitted so far.
    pub fn trailer(&self) -> Metadata {
        self.collect(|e| match e {
            Emitted::Trailer(md) => Some(md),
            Emitted::Header(_) => None,
        })
    }

    fn collect(&self, f: impl Fn(Emitted) -> Option<Metadata>) -> Metadata {
        let mut out = Metadata::new();
        for md in self.emitted().into_iter().filter_map(f) {
            out.merge(md);
        }
        out
    }

    fn push(&self, e: Emitted) -> Result<(), BoxError> {
        self.emitted.lock().map_err(|_| "metadata recorder poisoned")?.push(e);
        Ok(())
    }
}

impl MetadataSink for RecordingSink {
    fn send_header(&self, header: Metadata) -> Result<(), BoxError> {
        self.push(Emitted::Header(header))
    }

    fn set_trailer(&self, trailer: Metadata) -> Result<(), BoxError> {
        self.push(Emitted::Trailer(trailer))
    }
}

#[cfg(test)]
mod tests {
    use super::{Emitted, Metadata, MetadataSink, RecordingSink};

    #[test]
    fn keys_are_case_insensitive() {
        let mut md = Metadata::new();
        md.append("X-Trace-Id", "a");
        md.append("x-trace-id", "b");
        assert_eq!(md.len(), 1);
        assert_eq!(md.get("X-TRACE-ID").map(|v| v.as_str()), Some("a"));
        assert_eq!(md.get_all("x-trace-id").len(), 2);

        md.insert("x-trace-id", "c");
        assert_eq!(md.get_all("x-trace-id").len(), 1);
        assert!(md.remove("x-trace-id").is_some());
        assert!(md.is_empty());
    }

    #[test]
    fn recorder_keeps_order() {
        let sink = RecordingSink::new();
        let header: Metadata = [("k", "h")].into_iter().collect();
        let trailer: Metadata = [("k", "t")].into_iter().collect();
        sink.send_header(header.clone()).unwrap();
        sink.set_trailer(trailer.clone()).unwrap();
        assert_eq!(sink.emitted(), vec![Emitted::Header(header.clone()), Emitted::Trailer(trailer.clone())]);
        assert_eq!(sink.header(), header);
        assert_eq!(sink.trailer(), trailer);
    }
}
