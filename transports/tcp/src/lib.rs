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

//! TCP transport.
//!
//! Services addresses of the form `/ip4/…/tcp/…` and `/ip6/…/tcp/…`. DNS
//! names must be resolved before dialing; this transport refuses them.

use async_io::Async;
use futures::future::{self, BoxFuture, FutureExt};
use ipfs_engine_core::cancellation::{CancelToken, Cancelled};
use ipfs_engine_core::transport::{
    AcceptCallback, BoxStream, Listening, Transport, TransportError,
};
use ipfs_engine_multiaddr::{Multiaddr, Protocol};
use socket2::{Domain, Socket, Type};
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};

/// Transport for `/ip4|ip6/…/tcp/…` addresses.
#[derive(Clone, Debug)]
pub struct TcpTransport {
    /// TCP_NODELAY for dialed and accepted sockets.
    nodelay: Option<bool>,
    /// IP_TTL for dialed sockets.
    ttl: Option<u32>,
    backlog: i32,
}

impl Default for TcpTransport {
    fn default() -> Self {
        TcpTransport { nodelay: None, ttl: None, backlog: 1024 }
    }
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodelay(mut self, value: bool) -> Self {
        self.nodelay = Some(value);
        self
    }

    pub fn ttl(mut self, value: u32) -> Self {
        self.ttl = Some(value);
        self
    }
}

/// The socket address of `addr`: its leading `ip4`/`ip6` segment followed
/// by a `tcp` segment. Any trailing segments (`p2p` in particular) are
/// ignored.
fn multiaddr_to_socketaddr(addr: &Multiaddr) -> Option<SocketAddr> {
    let mut iter = addr.iter();
    let ip: IpAddr = match iter.next()? {
        Protocol::Ip4(ip) => (*ip).into(),
        Protocol::Ip6(ip) => (*ip).into(),
        _ => return None,
    };
    let port = match iter.next()? {
        Protocol::Tcp(port) => *port,
        _ => return None,
    };
    Some(SocketAddr::new(ip, port))
}

fn socketaddr_to_multiaddr(addr: SocketAddr) -> Multiaddr {
    let ip = match addr.ip() {
        IpAddr::V4(ip) => Protocol::Ip4(ip),
        IpAddr::V6(ip) => Protocol::Ip6(ip),
    };
    vec![ip, Protocol::Tcp(addr.port())].into_iter().collect()
}

impl Transport for TcpTransport {
    fn protocol(&self) -> &'static str {
        "tcp"
    }

    fn connect(
        &self,
        addr: &Multiaddr,
        cancel: CancelToken,
    ) -> BoxFuture<'static, Result<BoxStream, TransportError>> {
        let socket_addr = match multiaddr_to_socketaddr(addr) {
            // Refuse unroutable targets before touching the kernel.
            Some(sa) if sa.port() != 0 && !sa.ip().is_unspecified() => sa,
            _ => return future::ready(Err(TransportError::MultiaddrNotSupported(addr.clone()))).boxed(),
        };
        let addr = addr.clone();
        let nodelay = self.nodelay;
        let ttl = self.ttl;
        async move {
            log::debug!("dialing {}", addr);
            let stream = cancel.guard(Async::<TcpStream>::connect(socket_addr)).await??;
            if let Some(nodelay) = nodelay {
                stream.get_ref().set_nodelay(nodelay)?;
            }
            if let Some(ttl) = ttl {
                stream.get_ref().set_ttl(ttl)?;
            }
            Ok(Box::new(stream) as BoxStream)
        }
        .boxed()
    }

    fn listen(
        &self,
        addr: &Multiaddr,
        on_accept: AcceptCallback,
        cancel: CancelToken,
    ) -> BoxFuture<'static, Result<Listening, TransportError>> {
        let socket_addr = match multiaddr_to_socketaddr(addr) {
            Some(sa) => sa,
            None => {
                return future::ready(Err(TransportError::MultiaddrNotSupported(addr.clone())))
                    .boxed()
            }
        };
        let nodelay = self.nodelay;
        let backlog = self.backlog;
        async move {
            let socket = Socket::new(Domain::for_address(socket_addr), Type::STREAM, None)?;
            if socket_addr.is_ipv6() {
                socket.set_only_v6(true)?;
            }
            socket.set_reuse_address(true)?;
            socket.set_nonblocking(true)?;
            socket.bind(&socket_addr.into())?;
            socket.listen(backlog)?;
            let listener: TcpListener = socket.into();
            let listener = Async::new(listener)?;

            let bound = socketaddr_to_multiaddr(listener.get_ref().local_addr()?);
            log::info!("listening on {}", bound);

            let local = bound.clone();
            let accept_loop = async move {
                loop {
                    let accept = listener.accept();
                    futures::pin_mut!(accept);
                    match cancel.guard(accept).await {
                        Err(Cancelled) => break,
                        Ok(Ok((stream, remote))) => {
                            if let Some(nodelay) = nodelay {
                                let _ = stream.get_ref().set_nodelay(nodelay);
                            }
                            log::trace!("incoming connection from {}", remote);
                            on_accept(
                                Box::new(stream) as BoxStream,
                                local.clone(),
                                socketaddr_to_multiaddr(remote),
                            );
                        }
                        Ok(Err(e)) => {
                            log::error!("accept on {} failed: {}", local, e);
                            break;
                        }
                    }
                }
                log::debug!("listener on {} shut down", local);
            }
            .boxed();

            Ok((bound, accept_loop))
        }
        .boxed()
    }
}
