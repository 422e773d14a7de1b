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

use ipfs_engine_core::peer::PeerId;
use ipfs_engine_core::transport::TransportError;
use ipfs_engine_multiaddr::Multiaddr;
use std::fmt;
use std::io;

/// Error produced by swarm operations.
///
/// Validation errors surface immediately; per-address dial errors are
/// recovered and aggregated into [`Error::Unreachable`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A mutating operation was invoked before `start()`.
    #[error("the swarm is not started")]
    NotStarted,
    /// The address does not end with a `/p2p/<peer-id>` segment.
    #[error("`{0}` does not end with an identity segment")]
    MissingIdentity(Multiaddr),
    /// The address identifies the local peer.
    #[error("`{0}` is the local peer")]
    SelfRegistration(PeerId),
    /// The allow/deny evaluation rejected the address.
    #[error("`{0}` is blocked by policy")]
    PolicyDenied(Multiaddr),
    /// No registered transport services any protocol segment.
    #[error("no registered transport for any protocol segment of `{0}`")]
    MissingTransport(Multiaddr),
    /// A listener is already bound under this address.
    #[error("already listening on `{0}`")]
    AlreadyListening(Multiaddr),
    /// The transport failed to bind the listener.
    #[error("failed to listen on `{address}`")]
    Listen {
        address: Multiaddr,
        #[source]
        source: TransportError,
    },
    /// Every dial attempt failed; the per-address failures are attached.
    #[error("peer `{peer}` is unreachable")]
    Unreachable {
        peer: PeerId,
        attempts: Vec<DialAttempt>,
    },
    /// The cancellation signal fired before the operation began.
    #[error("the operation was cancelled")]
    Cancelled,
}

/// One failed attempt at dialing a concrete address.
#[derive(Debug)]
pub struct DialAttempt {
    pub address: Multiaddr,
    pub error: DialError,
}

impl fmt::Display for DialAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.address, self.error)
    }
}

/// Why a single dial attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum DialError {
    /// Resolution produced no concrete address to dial.
    #[error("no known address to dial")]
    NoKnownAddress,
    /// No registered transport for any protocol segment of the address.
    #[error("no registered transport for any protocol segment")]
    MissingTransport,
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The stream opened but the outbound handshake failed.
    #[error("handshake failed: {0}")]
    Handshake(io::Error),
}
