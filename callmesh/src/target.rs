// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! The discovery target: the logical service name a client resolves into instances.

use crate::net::Address;
use faststr::FastStr;
use metainfo::FastStrMap;

/// What a [`crate::client::discover::Discover`] resolves.
///
/// Tags are typed: a discoverer looks a tag up by a marker type, e.g. `target.tag::<Region>()`,
/// so unrelated collaborators cannot collide on string keys.
#[derive(Debug, Default)]
pub struct Target {
    name: FastStr,
    /// Explicit address. When set, discovery is skipped and every attempt goes there.
    pub address: Option<Address>,
    tags: FastStrMap,
    key_maker: Option<fn(&Target) -> FastStr>,
}

impl Target {
    /// A target resolving `name`.
    pub fn new(name: impl Into<FastStr>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// The logical service name.
    pub fn name(&self) -> &FastStr {
        &self.name
    }

    /// The key identifying this target in discovery events: the name, unless a key maker is set.
    pub fn key(&self) -> FastStr {
        match self.key_maker {
            Some(make) => make(self),
            None => self.name.clone(),
        }
    }

    /// True if there is nothing to resolve: no name and no explicit address.
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.address.is_none()
    }

    /// The tag stored under marker `T`.
    pub fn tag<T: 'static>(&self) -> Option<&FastStr> {
        self.tags.get::<T>()
    }

    /// True if a tag is stored under marker `T`.
    pub fn has_tag<T: 'static>(&self) -> bool {
        self.tags.contains::<T>()
    }

    /// Stores `value` under marker `T`, replacing any previous value.
    pub fn set_tag<T: Send + Sync + 'static>(&mut self, value: impl Into<FastStr>) {
        self.tags.insert::<T>(value.into());
    }

    /// Builder form of [`Target::set_tag`].
    pub fn with_tag<T: Send + Sync + 'static>(mut self, value: impl Into<FastStr>) -> Self {
        self.set_tag::<T>(value);
        self
    }

    /// Pins the target to `address`.
    pub fn with_address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }

    /// Derives discovery keys with `key_maker` instead of the bare name.
    pub fn with_key_maker(mut self, key_maker: fn(&Target) -> FastStr) -> Self {
        self.key_maker = Some(key_maker);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::Target;
    use faststr::FastStr;

    struct Region;

    fn region_key(target: &Target) -> FastStr {
        let region = target.tag::<Region>().map(|r| r.as_str()).unwrap_or("default");
        FastStr::new(format!("{}@{}", target.name(), region))
    }

    #[test]
    fn key_defaults_to_name() {
        let target = Target::new("greeter");
        assert_eq!(target.key().as_str(), "greeter");
        assert!(!target.is_empty());
        assert!(Target::new("").is_empty());
    }

    #[test]
    fn key_maker_sees_tags() {
        let mut target = Target::new("greeter").with_key_maker(region_key);
        assert_eq!(target.key().as_str(), "greeter@default");
        target.set_tag::<Region>("eu");
        assert!(target.has_tag::<Region>());
        assert_eq!(target.key().as_str(), "greeter@eu");
    }
}
