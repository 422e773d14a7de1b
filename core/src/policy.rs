// Copyright 2019 Parity Technologies (UK) Ltd.
//
// Permission is hereby granted, free of charge, to any person obtaining a
// copy of this software and associated documentation files (the "Software"),
// to deal in the Software without restriction, including without limitation
// the rights to use, copy, modify, merge, publish, distribute, sublicense,
// and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS
// OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

//! Access policy over multiaddresses.
//!
//! A [`Policy`] combines a subtractive deny-list with an allow-list. An
//! address is admitted iff the deny-list does not match it *and* the
//! allow-list admits it (an empty allow-list admits everything). Evaluation
//! is pure: no I/O, no resolution.

use ipfs_engine_multiaddr::Multiaddr;
use std::collections::HashSet;

/// An unordered set of multiaddress patterns.
///
/// A pattern matches an address when it is equal to it or a segment-wise
/// prefix of it: `/ip4/10.0.0.1` matches `/ip4/10.0.0.1/tcp/4001/p2p/QmX…`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MultiaddrSet {
    patterns: HashSet<Multiaddr>,
}

impl MultiaddrSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pattern; returns whether the set grew.
    pub fn add(&mut self, pattern: Multiaddr) -> bool {
        self.patterns.insert(pattern)
    }

    /// Removes a pattern; returns whether it was present.
    pub fn remove(&mut self, pattern: &Multiaddr) -> bool {
        self.patterns.remove(pattern)
    }

    pub fn clear(&mut self) {
        self.patterns.clear()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Multiaddr> {
        self.patterns.iter()
    }

    /// Whether any pattern is an equality or prefix match of `addr`.
    pub fn matches(&self, addr: &Multiaddr) -> bool {
        self.patterns.iter().any(|p| addr.starts_with(p))
    }
}

/// The conjunction of a deny-list and an allow-list.
#[derive(Clone, Debug, Default)]
pub struct Policy {
    allow: MultiaddrSet,
    deny: MultiaddrSet,
}

impl Policy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_list(&self) -> &MultiaddrSet {
        &self.allow
    }

    pub fn allow_list_mut(&mut self) -> &mut MultiaddrSet {
        &mut self.allow
    }

    pub fn deny_list(&self) -> &MultiaddrSet {
        &self.deny
    }

    pub fn deny_list_mut(&mut self) -> &mut MultiaddrSet {
        &mut self.deny
    }

    /// Empties both lists.
    pub fn reset(&mut self) {
        self.allow.clear();
        self.deny.clear();
    }

    /// Whether `addr` passes both filters.
    pub fn is_allowed(&self, addr: &Multiaddr) -> bool {
        !self.deny.matches(addr) && (self.allow.is_empty() || self.allow.matches(addr))
    }

    pub fn is_not_allowed(&self, addr: &Multiaddr) -> bool {
        !self.is_allowed(addr)
    }
}
