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

//! A live stream to a remote peer, with its endpoint metadata.

use crate::cancellation::CancelToken;
use crate::peer::{Peer, PeerId};
use crate::transport::BoxStream;
use futures::future::{self, BoxFuture, FutureExt};
use futures::io::AsyncWriteExt;
use ipfs_engine_multiaddr::Multiaddr;
use std::fmt;
use std::io;

/// A duplex stream to a remote peer plus the endpoint metadata of both
/// sides.
///
/// The remote peer is referenced by id only; the swarm's peer table is the
/// single source of truth for peer state, and the swarm's connection table
/// is the single source of truth for "connected?".
pub struct Connection {
    local_peer: Peer,
    remote_peer: Option<PeerId>,
    local_address: Option<Multiaddr>,
    remote_address: Multiaddr,
    stream: Option<BoxStream>,
}

impl Connection {
    /// A new connection around a freshly dialed or accepted stream.
    /// `local_address` is unknown for outbound streams.
    pub fn new(
        local_peer: Peer,
        local_address: Option<Multiaddr>,
        remote_address: Multiaddr,
        stream: BoxStream,
    ) -> Self {
        Connection {
            local_peer,
            remote_peer: None,
            local_address,
            remote_address,
            stream: Some(stream),
        }
    }

    pub fn local_peer(&self) -> &Peer {
        &self.local_peer
    }

    pub fn remote_peer(&self) -> Option<&PeerId> {
        self.remote_peer.as_ref()
    }

    /// Records which peer the stream belongs to, once known.
    pub fn set_remote_peer(&mut self, id: PeerId) {
        self.remote_peer = Some(id);
    }

    pub fn local_address(&self) -> Option<&Multiaddr> {
        self.local_address.as_ref()
    }

    pub fn remote_address(&self) -> &Multiaddr {
        &self.remote_address
    }

    /// The underlying stream, for the handshake. `None` once disposed.
    pub fn stream_mut(&mut self) -> Option<&mut BoxStream> {
        self.stream.as_mut()
    }

    pub fn is_disposed(&self) -> bool {
        self.stream.is_none()
    }

    /// Closes the stream. Idempotent; the stream is closed exactly once.
    pub async fn dispose(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.close().await {
                log::trace!("closing stream to {}: {}", self.remote_address, e);
            }
            log::debug!("disposed connection to {}", self.remote_address);
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("local_peer", &self.local_peer.id())
            .field("remote_peer", &self.remote_peer)
            .field("local_address", &self.local_address)
            .field("remote_address", &self.remote_address)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// The handshake run over every new connection.
///
/// This is an extension point: the engine core treats both directions as
/// opaque futures that either succeed, leaving the stream usable, or fail,
/// in which case the connection is disposed. Security and multiplexing
/// negotiation would plug in here.
pub trait Handshake: Send + Sync {
    /// Outbound handshake, run by the dialer after `connect` succeeds.
    fn initiate<'a>(
        &'a self,
        conn: &'a mut Connection,
        cancel: CancelToken,
    ) -> BoxFuture<'a, io::Result<()>>;

    /// Inbound handshake, run by the listener for every accepted stream.
    fn respond<'a>(&'a self, conn: &'a mut Connection) -> BoxFuture<'a, io::Result<()>>;
}

/// Handshake that accepts every stream as-is.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainHandshake;

impl Handshake for PlainHandshake {
    fn initiate<'a>(
        &'a self,
        _conn: &'a mut Connection,
        _cancel: CancelToken,
    ) -> BoxFuture<'a, io::Result<()>> {
        future::ready(Ok(())).boxed()
    }

    fn respond<'a>(&'a self, _conn: &'a mut Connection) -> BoxFuture<'a, io::Result<()>> {
        future::ready(Ok(())).boxed()
    }
}
