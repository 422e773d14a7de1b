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

//! In-memory transport.
//!
//! Streams under `/memory/<port>` only connect endpoints within the same
//! process. Listeners register in a process-local hub; dialing a port with
//! no listener fails like a refused connection.

use crate::cancellation::CancelToken;
use crate::transport::{AcceptCallback, BoxStream, Listening, Transport, TransportError};
use futures::channel::mpsc;
use futures::future::BoxFuture;
use futures::prelude::*;
use ipfs_engine_multiaddr::{Multiaddr, Protocol};
use lazy_static::lazy_static;
use parking_lot::Mutex;
use rw_stream_sink::RwStreamSink;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

lazy_static! {
    /// Listeners currently bound, keyed by memory port.
    static ref HUB: Mutex<fnv::FnvHashMap<u64, mpsc::UnboundedSender<(Chan, u64)>>> =
        Mutex::new(Default::default());
}

/// Transport for `/memory/<port>` addresses.
#[derive(Clone, Debug, Default)]
pub struct MemoryTransport;

/// The memory port of `addr`: the value of its first `memory` segment.
fn memory_port(addr: &Multiaddr) -> Option<u64> {
    addr.iter().find_map(|seg| match seg {
        Protocol::Memory(port) => Some(*port),
        _ => None,
    })
}

impl Transport for MemoryTransport {
    fn protocol(&self) -> &'static str {
        "memory"
    }

    fn connect(
        &self,
        addr: &Multiaddr,
        cancel: CancelToken,
    ) -> BoxFuture<'static, Result<BoxStream, TransportError>> {
        let addr = addr.clone();
        async move {
            let port = match memory_port(&addr) {
                Some(port) if port != 0 => port,
                _ => return Err(TransportError::MultiaddrNotSupported(addr)),
            };
            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }
            let listener = HUB.lock().get(&port).cloned();
            let listener = listener.ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    format!("no memory listener on port {}", port),
                )
            })?;
            let (local, remote) = Chan::pair();
            // The ephemeral port identifies the dialer in the listener's
            // accept callback, like a TCP source port.
            let dial_port = rand::random::<u64>() | 1;
            listener.unbounded_send((remote, dial_port)).map_err(|_| {
                io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    format!("memory listener on port {} is gone", port),
                )
            })?;
            log::trace!("memory dial to port {} established", port);
            Ok(Box::new(RwStreamSink::new(local)) as BoxStream)
        }
        .boxed()
    }

    fn listen(
        &self,
        addr: &Multiaddr,
        on_accept: AcceptCallback,
        cancel: CancelToken,
    ) -> BoxFuture<'static, Result<Listening, TransportError>> {
        let addr = addr.clone();
        async move {
            let requested = match memory_port(&addr) {
                Some(port) => port,
                None => return Err(TransportError::MultiaddrNotSupported(addr)),
            };

            let (tx, rx) = mpsc::unbounded();
            let port = {
                let mut hub = HUB.lock();
                let port = if requested == 0 {
                    loop {
                        let candidate = rand::random::<u64>() | 1;
                        if !hub.contains_key(&candidate) {
                            break candidate;
                        }
                    }
                } else if hub.contains_key(&requested) {
                    return Err(TransportError::Io(io::Error::new(
                        io::ErrorKind::AddrInUse,
                        format!("memory port {} is already bound", requested),
                    )));
                } else {
                    requested
                };
                hub.insert(port, tx);
                port
            };

            let bound: Multiaddr = [Protocol::Memory(port)].iter().cloned().collect();
            log::debug!("memory listener bound on {}", bound);

            let local = bound.clone();
            let accept_loop = async move {
                let mut rx = rx.fuse();
                let cancelled = cancel.cancelled().fuse();
                futures::pin_mut!(cancelled);
                loop {
                    futures::select! {
                        _ = cancelled => break,
                        inbound = rx.next() => match inbound {
                            Some((chan, dial_port)) => {
                                let remote: Multiaddr =
                                    [Protocol::Memory(dial_port)].iter().cloned().collect();
                                log::trace!("memory listener {} accepted {}", local, remote);
                                let stream = Box::new(RwStreamSink::new(chan)) as BoxStream;
                                on_accept(stream, local.clone(), remote);
                            }
                            None => break,
                        },
                    }
                }
                HUB.lock().remove(&port);
                log::debug!("memory listener on {} shut down", local);
            }
            .boxed();

            Ok((bound, accept_loop))
        }
        .boxed()
    }
}

/// One half of an in-memory connection: a pair of unbounded byte-chunk
/// channels, adapted to `AsyncRead`/`AsyncWrite` by `RwStreamSink`.
pub struct Chan {
    incoming: mpsc::UnboundedReceiver<Vec<u8>>,
    outgoing: mpsc::UnboundedSender<Vec<u8>>,
}

impl Chan {
    fn pair() -> (Chan, Chan) {
        let (a_tx, a_rx) = mpsc::unbounded();
        let (b_tx, b_rx) = mpsc::unbounded();
        let a = Chan { incoming: a_rx, outgoing: b_tx };
        let b = Chan { incoming: b_rx, outgoing: a_tx };
        (a, b)
    }
}

impl Stream for Chan {
    type Item = Result<Vec<u8>, io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.incoming).poll_next(cx).map(|item| item.map(Ok))
    }
}

impl Sink<Vec<u8>> for Chan {
    type Error = io::Error;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        Pin::new(&mut self.outgoing)
            .poll_ready(cx)
            .map_err(|_| io::ErrorKind::BrokenPipe.into())
    }

    fn start_send(mut self: Pin<&mut Self>, item: Vec<u8>) -> Result<(), io::Error> {
        Pin::new(&mut self.outgoing)
            .start_send(item)
            .map_err(|_| io::ErrorKind::BrokenPipe.into())
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        Pin::new(&mut self.outgoing)
            .poll_flush(cx)
            .map_err(|_| io::ErrorKind::BrokenPipe.into())
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        Pin::new(&mut self.outgoing)
            .poll_close(cx)
            .map_err(|_| io::ErrorKind::BrokenPipe.into())
    }
}
