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

//! The transport contract and the transport registry.
//!
//! A transport translates one protocol segment of a [`Multiaddr`] into a
//! duplex byte stream: `connect` dials, `listen` binds and produces an
//! accept loop. Implementations register under their protocol name in a
//! [`TransportRegistry`], which the swarm receives at construction; there is
//! no process-wide registry.

pub mod memory;

use crate::cancellation::{CancelToken, Cancelled};
use futures::future::BoxFuture;
use futures::io::{AsyncRead, AsyncWrite};
use ipfs_engine_multiaddr::Multiaddr;
use std::fmt;
use std::io;
use std::sync::Arc;

/// A duplex byte stream between two peers.
pub trait Duplex: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> Duplex for T {}

/// Boxed duplex stream, the output of every transport.
pub type BoxStream = Box<dyn Duplex>;

/// Callback a listener invokes for every inbound stream, with the stream,
/// the local listening address and the remote address.
pub type AcceptCallback = Arc<dyn Fn(BoxStream, Multiaddr, Multiaddr) + Send + Sync>;

/// A successfully bound listener: the effective local address (wildcard
/// ports resolved) and the accept loop, which the caller is expected to
/// spawn and which runs until the cancellation signal fires.
pub type Listening = (Multiaddr, BoxFuture<'static, ()>);

/// Error produced by a [`Transport`].
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The transport cannot service the given address.
    #[error("multiaddress `{0}` is not supported by this transport")]
    MultiaddrNotSupported(Multiaddr),
    /// The cancellation signal fired while the operation was in flight.
    #[error("the operation was cancelled")]
    Cancelled,
    /// The attempt itself failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<Cancelled> for TransportError {
    fn from(_: Cancelled) -> Self {
        TransportError::Cancelled
    }
}

/// A mechanism for opening and accepting streams under one protocol name.
///
/// Implementations must surface cancellation promptly and must not retain
/// the accept callback past cancellation of the listener.
pub trait Transport: Send + Sync {
    /// The protocol name this transport services (`tcp`, `memory`, …).
    fn protocol(&self) -> &'static str;

    /// Opens an outbound stream towards `addr`.
    ///
    /// Fails with [`TransportError::MultiaddrNotSupported`] when `addr` has
    /// no usable segment for this transport, [`TransportError::Cancelled`]
    /// when the signal fires mid-dial.
    fn connect(
        &self,
        addr: &Multiaddr,
        cancel: CancelToken,
    ) -> BoxFuture<'static, Result<BoxStream, TransportError>>;

    /// Binds a listener on `addr`.
    fn listen(
        &self,
        addr: &Multiaddr,
        on_accept: AcceptCallback,
        cancel: CancelToken,
    ) -> BoxFuture<'static, Result<Listening, TransportError>>;
}

/// The set of transports a swarm dials and listens with, keyed by protocol
/// name.
#[derive(Clone, Default)]
pub struct TransportRegistry {
    transports: fnv::FnvHashMap<&'static str, Arc<dyn Transport>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a transport under its protocol name, replacing any
    /// previous registration for that name.
    pub fn register(&mut self, transport: Arc<dyn Transport>) -> &mut Self {
        self.transports.insert(transport.protocol(), transport);
        self
    }

    pub fn lookup(&self, protocol: &str) -> Option<Arc<dyn Transport>> {
        self.transports.get(protocol).cloned()
    }

    /// Selects the transport for `addr`: the first protocol segment, in
    /// order, whose name is registered. `None` when no segment matches.
    pub fn select(&self, addr: &Multiaddr) -> Option<Arc<dyn Transport>> {
        addr.iter().find_map(|seg| self.lookup(seg.name()))
    }

    pub fn is_empty(&self) -> bool {
        self.transports.is_empty()
    }
}

impl fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.transports.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::MemoryTransport;

    #[test]
    fn select_scans_segments_in_order() {
        let mut registry = TransportRegistry::new();
        registry.register(Arc::new(MemoryTransport::default()));

        let addr: Multiaddr = "/memory/7".parse().unwrap();
        assert!(registry.select(&addr).is_some());

        let addr: Multiaddr = "/ip4/1.2.3.4/tcp/4001".parse().unwrap();
        assert!(registry.select(&addr).is_none());

        // The memory segment is found even when it is not the first one.
        let addr: Multiaddr = "/ip4/1.2.3.4/memory/7".parse().unwrap();
        assert!(registry.select(&addr).is_some());
    }

    #[test]
    fn register_replaces_by_name() {
        let mut registry = TransportRegistry::new();
        registry
            .register(Arc::new(MemoryTransport::default()))
            .register(Arc::new(MemoryTransport::default()));
        assert!(registry.lookup("memory").is_some());
        assert!(registry.lookup("tcp").is_none());
    }
}
