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

//! Peer identity and peer descriptors.

use ipfs_engine_multiaddr::Multiaddr;
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

/// Identity of a peer of the network.
///
/// Peer ids are opaque: two ids are equal iff their base58 textual forms
/// match. The local node's id is immutable for its lifetime.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(String);

impl PeerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for PeerId {
    type Err = ParsePeerIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || bs58::decode(s).into_vec().is_err() {
            return Err(ParsePeerIdError(s.to_owned()));
        }
        Ok(PeerId(s.to_owned()))
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PeerId").field(&self.0).finish()
    }
}

/// Error when parsing a [`PeerId`] from text.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("`{0}` is not a base58 peer id")]
pub struct ParsePeerIdError(String);

/// A node of the network: an identity plus the addresses it is known under.
///
/// `Peer` is a snapshot value. The swarm owns the authoritative peer table
/// and is the only place peers are mutated; a `Peer` obtained from a query
/// may therefore go stale while held.
#[derive(Clone, Debug)]
pub struct Peer {
    id: PeerId,
    addresses: SmallVec<[Multiaddr; 4]>,
    connected_address: Option<Multiaddr>,
}

impl Peer {
    pub fn new(id: PeerId) -> Self {
        Peer {
            id,
            addresses: SmallVec::new(),
            connected_address: None,
        }
    }

    pub fn id(&self) -> &PeerId {
        &self.id
    }

    /// Every address this peer has been registered under.
    pub fn addresses(&self) -> &[Multiaddr] {
        &self.addresses
    }

    /// The address a live stream exists for, if any.
    pub fn connected_address(&self) -> Option<&Multiaddr> {
        self.connected_address.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.connected_address.is_some()
    }

    /// Adds `addr` to the known addresses. Idempotent; returns whether the
    /// set grew. Called by the swarm, which serializes peer mutation.
    pub fn add_address(&mut self, addr: Multiaddr) -> bool {
        if self.addresses.contains(&addr) {
            return false;
        }
        self.addresses.push(addr);
        true
    }

    /// Removes `addr` from the known addresses.
    pub fn remove_address(&mut self, addr: &Multiaddr) {
        self.addresses.retain(|a| a != addr);
    }

    /// Records (or clears) the address of the live stream. Called by the
    /// swarm together with the corresponding connection-table update.
    pub fn set_connected_address(&mut self, addr: Option<Multiaddr>) {
        self.connected_address = addr;
    }
}
