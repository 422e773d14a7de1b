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

//! Core traits and structs of the IPFS engine.
//!
//! The engine's networking is organized around a small number of contracts:
//!
//! - [`Transport`](transport::Transport) turns a protocol segment of a
//!   [`Multiaddr`] into a duplex byte stream, both for dialing and for
//!   listening. Implementations register themselves in a
//!   [`TransportRegistry`](transport::TransportRegistry) that is handed to
//!   the swarm at construction.
//! - [`Resolver`](resolver::Resolver) expands DNS segments of an address
//!   into concrete `ip4`/`ip6` addresses.
//! - [`Handshake`](connection::Handshake) is run over every new
//!   [`Connection`](connection::Connection), outbound and inbound.
//! - [`Executor`](executor::Executor) runs the detached background tasks
//!   (accept loops, inbound handshakes).
//!
//! All long-running operations take a [`CancelToken`](cancellation::CancelToken)
//! and observe it at every await point.

pub mod cancellation;
pub mod connection;
pub mod executor;
pub mod peer;
pub mod policy;
pub mod resolver;
pub mod transport;

pub use cancellation::{cancellation, CancelToken, Cancelled, Canceller};
pub use connection::{Connection, Handshake, PlainHandshake};
pub use executor::Executor;
pub use ipfs_engine_multiaddr::{Multiaddr, Protocol};
pub use peer::{Peer, PeerId};
pub use policy::{MultiaddrSet, Policy};
pub use resolver::{IdentityResolver, Resolver};
pub use transport::{AcceptCallback, BoxStream, Transport, TransportError, TransportRegistry};
