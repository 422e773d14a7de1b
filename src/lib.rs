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

//! Embedded peer-to-peer engine compatible with the IPFS ecosystem.
//!
//! This facade re-exports the workspace members:
//!
//! - [`multiaddr`]: the textual multiaddress model.
//! - [`core`]: transports, connections, policy, peers, cancellation.
//! - [`swarm`]: the [`Swarm`] coordinating peers, connections and
//!   listeners.
//! - [`tcp`] and [`dns`] (feature-gated): the built-in TCP transport and
//!   DNS resolver.
//!
//! # Example
//!
//! ```no_run
//! use ipfs_engine::{CancelToken, Swarm};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let local_id = "QmYyQSo1c1Ym7orWxLYvCrM2EmxFTANf8wXmmE7DWjhx5N".parse()?;
//! let swarm = Swarm::builder(local_id)
//!     .registry(ipfs_engine::default_registry())
//!     .build()?;
//! swarm.start();
//!
//! let listen = "/ip4/0.0.0.0/tcp/4001".parse()?;
//! let advertised = swarm.start_listening(&listen).await?;
//! println!("reachable at {}", advertised);
//!
//! let bootstrap = "/ip4/104.131.131.82/tcp/4001/p2p/QmaCpDMGvV2BGHeYERUEnRQAwe3N8SzbUtfsmvsqQLuvuJ".parse()?;
//! swarm.connect(&bootstrap, CancelToken::none()).await?;
//! # Ok(())
//! # }
//! ```

pub use ipfs_engine_core as core;
#[cfg(feature = "dns")]
pub use ipfs_engine_dns as dns;
pub use ipfs_engine_multiaddr as multiaddr;
pub use ipfs_engine_swarm as swarm;
#[cfg(feature = "tcp")]
pub use ipfs_engine_tcp as tcp;

pub use ipfs_engine_core::{
    CancelToken, Cancelled, Canceller, Connection, Handshake, Multiaddr, Peer, PeerId,
    Protocol, Resolver, Transport, TransportRegistry,
};
pub use ipfs_engine_swarm::{Error, Swarm, SwarmBuilder, SwarmEvent};

use ipfs_engine_core::transport::memory::MemoryTransport;
use std::sync::Arc;

/// A registry with every built-in transport: the in-memory transport and,
/// when the `tcp` feature is enabled, TCP.
pub fn default_registry() -> TransportRegistry {
    let mut registry = TransportRegistry::new();
    #[cfg(feature = "tcp")]
    registry.register(Arc::new(ipfs_engine_tcp::TcpTransport::new()));
    registry.register(Arc::new(MemoryTransport::default()));
    registry
}
