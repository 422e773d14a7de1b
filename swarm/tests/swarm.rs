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

//! End-to-end swarm tests over the in-memory transport.

use futures::channel::mpsc;
use futures::future::{self, BoxFuture, FutureExt};
use futures::StreamExt;
use ipfs_engine_core::cancellation::CancelToken;
use ipfs_engine_core::connection::{Connection, Handshake};
use ipfs_engine_core::resolver::Resolver;
use ipfs_engine_core::transport::memory::MemoryTransport;
use ipfs_engine_core::transport::{
    AcceptCallback, BoxStream, Listening, Transport, TransportError,
};
use ipfs_engine_multiaddr::Multiaddr;
use ipfs_engine_swarm::{DialError, Error, Swarm, SwarmEvent};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const DIALER_ID: &str = "QmYyQSo1c1Ym7orWxLYvCrM2EmxFTANf8wXmmE7DWjhx5N";
const LISTENER_ID: &str = "QmSoLV4Bbm51jM9C4gDYZQ9Cy3U6aXMJDAbzgu2fzaDs64";

fn init() {
    let _ = env_logger::try_init();
}

fn ma(s: &str) -> Multiaddr {
    s.parse().unwrap()
}

fn memory_swarm(id: &str) -> Swarm {
    let swarm = Swarm::builder(id.parse().unwrap())
        .transport(Arc::new(MemoryTransport::default()))
        .build()
        .unwrap();
    swarm.start();
    swarm
}

/// Resolver producing a fixed address list, whatever the input.
struct StubResolver(Vec<Multiaddr>);

impl Resolver for StubResolver {
    fn resolve(
        &self,
        _addr: &Multiaddr,
        _cancel: CancelToken,
    ) -> BoxFuture<'static, io::Result<Vec<Multiaddr>>> {
        future::ready(Ok(self.0.clone())).boxed()
    }
}

/// Memory transport that counts outbound dials.
struct CountingTransport {
    inner: MemoryTransport,
    dials: Arc<AtomicUsize>,
}

impl Transport for CountingTransport {
    fn protocol(&self) -> &'static str {
        "memory"
    }

    fn connect(
        &self,
        addr: &Multiaddr,
        cancel: CancelToken,
    ) -> BoxFuture<'static, Result<BoxStream, TransportError>> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        self.inner.connect(addr, cancel)
    }

    fn listen(
        &self,
        addr: &Multiaddr,
        on_accept: AcceptCallback,
        cancel: CancelToken,
    ) -> BoxFuture<'static, Result<Listening, TransportError>> {
        self.inner.listen(addr, on_accept, cancel)
    }
}

/// Outbound handshake that fails the first `failures_left` times.
struct FailingHandshake {
    failures_left: AtomicUsize,
}

impl Handshake for FailingHandshake {
    fn initiate<'a>(
        &'a self,
        _conn: &'a mut Connection,
        _cancel: CancelToken,
    ) -> BoxFuture<'a, io::Result<()>> {
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let result = if failed {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "handshake refused"))
        } else {
            Ok(())
        };
        future::ready(result).boxed()
    }

    fn respond<'a>(&'a self, _conn: &'a mut Connection) -> BoxFuture<'a, io::Result<()>> {
        future::ready(Ok(())).boxed()
    }
}

#[async_std::test]
async fn connect_and_disconnect_round_trip() {
    init();
    let listener = memory_swarm(LISTENER_ID);
    let advertised = listener.start_listening(&ma("/memory/0")).await.unwrap();
    assert_eq!(advertised.peer_id(), Some(LISTENER_ID));

    let dialer = memory_swarm(DIALER_ID);
    let peer = dialer
        .connect(&advertised, CancelToken::none())
        .await
        .unwrap()
        .expect("connect was not cancelled");

    assert_eq!(peer.id().as_str(), LISTENER_ID);
    assert_eq!(peer.connected_address(), Some(&advertised));
    assert!(dialer.is_connected(peer.id()));
    assert_eq!(dialer.known_peers().len(), 1);

    // Connecting again must not dial; the connected peer comes back as-is.
    let again = dialer
        .connect(&advertised, CancelToken::none())
        .await
        .unwrap()
        .unwrap();
    assert!(again.is_connected());

    dialer.disconnect(&advertised, CancelToken::none()).await;
    let peers = dialer.known_peers();
    assert_eq!(peers.len(), 1);
    assert!(!peers[0].is_connected());
    assert!(!dialer.is_connected(peers[0].id()));
    // Known addresses survive the disconnect.
    assert!(!peers[0].addresses().is_empty());

    // Disconnect twice has the same observable effect as once.
    dialer.disconnect(&advertised, CancelToken::none()).await;
    assert_eq!(dialer.known_peers().len(), 1);

    // Addresses without identity and unknown peers are silently ignored.
    dialer.disconnect(&ma("/ip4/1.2.3.4/tcp/4001"), CancelToken::none()).await;
    dialer
        .disconnect(
            &ma("/memory/1/p2p/QmQCU2EcMqAqQPR2i9bChDtGNJchTbq5TbXJJ16u19uLTa"),
            CancelToken::none(),
        )
        .await;
}

#[async_std::test]
async fn second_connect_performs_no_second_dial() {
    init();
    let listener = memory_swarm(LISTENER_ID);
    let advertised = listener.start_listening(&ma("/memory/0")).await.unwrap();

    let dials = Arc::new(AtomicUsize::new(0));
    let dialer = Swarm::builder(DIALER_ID.parse().unwrap())
        .transport(Arc::new(CountingTransport {
            inner: MemoryTransport::default(),
            dials: dials.clone(),
        }))
        .build()
        .unwrap();
    dialer.start();

    dialer.connect(&advertised, CancelToken::none()).await.unwrap();
    dialer.connect(&advertised, CancelToken::none()).await.unwrap();
    assert_eq!(dials.load(Ordering::SeqCst), 1);
}

#[async_std::test]
async fn connect_walks_resolved_addresses_in_order() {
    init();
    let listener = memory_swarm(LISTENER_ID);
    let advertised = listener.start_listening(&ma("/memory/0")).await.unwrap();

    // Two dead addresses ahead of the live one.
    let dead_a = ma(&format!("/memory/{}/p2p/{}", rand::random::<u64>() | 1, LISTENER_ID));
    let dead_b = ma(&format!("/memory/{}/p2p/{}", rand::random::<u64>() | 1, LISTENER_ID));
    let resolver = StubResolver(vec![dead_a, dead_b, advertised.clone()]);

    let dialer = Swarm::builder(DIALER_ID.parse().unwrap())
        .transport(Arc::new(MemoryTransport::default()))
        .resolver(resolver)
        .build()
        .unwrap();
    dialer.start();

    let target = ma(&format!("/dns4/node.example/tcp/4001/p2p/{}", LISTENER_ID));
    let peer = dialer
        .connect(&target, CancelToken::none())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(peer.connected_address(), Some(&advertised));
    assert!(dialer.is_connected(peer.id()));
}

#[async_std::test]
async fn connect_aggregates_every_failed_attempt() {
    init();
    let unreachable = ma(&format!("/memory/{}/p2p/{}", rand::random::<u64>() | 1, LISTENER_ID));
    let unserviceable = ma(&format!("/ip4/1.2.3.4/tcp/4001/p2p/{}", LISTENER_ID));
    let resolver = StubResolver(vec![unserviceable, unreachable]);

    let dialer = Swarm::builder(DIALER_ID.parse().unwrap())
        .transport(Arc::new(MemoryTransport::default()))
        .resolver(resolver)
        .build()
        .unwrap();
    dialer.start();

    let target = ma(&format!("/dns4/node.example/tcp/4001/p2p/{}", LISTENER_ID));
    let err = dialer.connect(&target, CancelToken::none()).await.unwrap_err();
    match err {
        Error::Unreachable { peer, attempts } => {
            assert_eq!(peer.as_str(), LISTENER_ID);
            assert_eq!(attempts.len(), 2);
            assert!(matches!(attempts[0].error, DialError::MissingTransport));
            assert!(matches!(attempts[1].error, DialError::Transport(_)));
        }
        other => panic!("unexpected error: {}", other),
    }
    // The peer stays registered despite the failed dial.
    assert_eq!(dialer.known_peers().len(), 1);
    assert!(!dialer.known_peers()[0].is_connected());
}

#[async_std::test]
async fn connect_records_handshake_failure_and_tries_next_address() {
    init();
    let listener = memory_swarm(LISTENER_ID);
    let first = listener
        .start_listening(&ma(&format!("/memory/{}", rand::random::<u64>() | 1)))
        .await
        .unwrap();
    let second = listener
        .start_listening(&ma(&format!("/memory/{}", rand::random::<u64>() | 1)))
        .await
        .unwrap();
    let target = ma(&format!("/dns4/node.example/tcp/4001/p2p/{}", LISTENER_ID));

    // Every handshake fails: the stream opens on each address, but the
    // dial must surface the per-address handshake errors.
    let dialer = Swarm::builder(DIALER_ID.parse().unwrap())
        .transport(Arc::new(MemoryTransport::default()))
        .resolver(StubResolver(vec![first.clone(), second.clone()]))
        .handshake(FailingHandshake { failures_left: AtomicUsize::new(usize::MAX) })
        .build()
        .unwrap();
    dialer.start();

    let err = dialer.connect(&target, CancelToken::none()).await.unwrap_err();
    match err {
        Error::Unreachable { attempts, .. } => {
            assert_eq!(attempts.len(), 2);
            assert!(matches!(attempts[0].error, DialError::Handshake(_)));
            assert!(matches!(attempts[1].error, DialError::Handshake(_)));
        }
        other => panic!("unexpected error: {}", other),
    }
    // A failed handshake leaves nothing behind: the peer is registered but
    // has no connected address and no stream.
    let peers = dialer.known_peers();
    assert_eq!(peers.len(), 1);
    assert!(!peers[0].is_connected());
    assert!(!dialer.is_connected(peers[0].id()));

    // One failure only: the dial moves on and connects via the second
    // address.
    let dialer = Swarm::builder(DIALER_ID.parse().unwrap())
        .transport(Arc::new(MemoryTransport::default()))
        .resolver(StubResolver(vec![first.clone(), second.clone()]))
        .handshake(FailingHandshake { failures_left: AtomicUsize::new(1) })
        .build()
        .unwrap();
    dialer.start();

    let peer = dialer
        .connect(&target, CancelToken::none())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(peer.connected_address(), Some(&second));
    assert!(dialer.is_connected(peer.id()));
}

#[async_std::test]
async fn connect_without_any_address_is_unreachable() {
    init();
    let dialer = Swarm::builder(DIALER_ID.parse().unwrap())
        .transport(Arc::new(MemoryTransport::default()))
        .resolver(StubResolver(Vec::new()))
        .build()
        .unwrap();
    dialer.start();

    let target = ma(&format!("/dns4/node.example/tcp/4001/p2p/{}", LISTENER_ID));
    let err = dialer.connect(&target, CancelToken::none()).await.unwrap_err();
    match err {
        Error::Unreachable { attempts, .. } => {
            assert_eq!(attempts.len(), 1);
            assert!(matches!(attempts[0].error, DialError::NoKnownAddress));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[async_std::test]
async fn listener_lifecycle() {
    init();
    let swarm = memory_swarm(LISTENER_ID);

    let advertised = swarm.start_listening(&ma("/memory/0")).await.unwrap();
    assert_eq!(advertised.peer_id(), Some(LISTENER_ID));
    let bound = advertised.without_p2p();
    assert!(swarm.local_peer().addresses().contains(&bound));

    // Same input address, second listener: refused.
    let err = swarm.start_listening(&ma("/memory/0")).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyListening(_)));

    // Stopping fires the cancellation signal: the port no longer accepts.
    swarm.stop_listening(&ma("/memory/0")).await;
    assert!(swarm.local_peer().addresses().is_empty());

    let dialer = memory_swarm(DIALER_ID);
    // The accept loop shuts down asynchronously; poll until the port is
    // released.
    let mut refused = false;
    for _ in 0..50u32 {
        match dialer.connect(&advertised, CancelToken::none()).await {
            Err(Error::Unreachable { .. }) => {
                refused = true;
                break;
            }
            Ok(_) => {
                dialer.disconnect(&advertised, CancelToken::none()).await;
                async_std::task::sleep(Duration::from_millis(20)).await;
            }
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert!(refused, "listener kept accepting after stop_listening");

    // The input address is free again.
    swarm.start_listening(&ma("/memory/0")).await.unwrap();
}

#[async_std::test]
async fn listening_without_transport_fails() {
    init();
    let swarm = memory_swarm(LISTENER_ID);
    let addr = ma("/ip4/127.0.0.1/tcp/0");
    let err = swarm.start_listening(&addr).await.unwrap_err();
    assert!(matches!(err, Error::MissingTransport(_)));
    // The failed attempt must not leave a listener entry behind.
    let err = swarm.start_listening(&addr).await.unwrap_err();
    assert!(matches!(err, Error::MissingTransport(_)));
}

#[async_std::test]
async fn events_reach_the_layer_above() {
    init();
    let (listener_events, mut listener_rx) = mpsc::unbounded();
    let listener = Swarm::builder(LISTENER_ID.parse().unwrap())
        .transport(Arc::new(MemoryTransport::default()))
        .on_event(move |event| {
            let _ = listener_events.unbounded_send(event);
        })
        .build()
        .unwrap();
    listener.start();
    let advertised = listener.start_listening(&ma("/memory/0")).await.unwrap();

    let (dialer_events, mut dialer_rx) = mpsc::unbounded();
    let dialer = Swarm::builder(DIALER_ID.parse().unwrap())
        .transport(Arc::new(MemoryTransport::default()))
        .on_event(move |event| {
            let _ = dialer_events.unbounded_send(event);
        })
        .build()
        .unwrap();
    dialer.start();

    dialer.connect(&advertised, CancelToken::none()).await.unwrap().unwrap();

    let event = async_std::future::timeout(Duration::from_secs(5), dialer_rx.next())
        .await
        .unwrap()
        .unwrap();
    match event {
        SwarmEvent::Connected(id) => assert_eq!(id.as_str(), LISTENER_ID),
        other => panic!("unexpected event: {:?}", other),
    }

    let event = async_std::future::timeout(Duration::from_secs(5), listener_rx.next())
        .await
        .unwrap()
        .unwrap();
    match event {
        SwarmEvent::ConnectionAccepted { local_address, peer, .. } => {
            assert_eq!(local_address, advertised.without_p2p());
            // The in-memory remote address carries no identity segment.
            assert!(peer.is_none());
        }
        other => panic!("unexpected event: {:?}", other),
    }

    dialer.disconnect(&advertised, CancelToken::none()).await;
    let event = async_std::future::timeout(Duration::from_secs(5), dialer_rx.next())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(event, SwarmEvent::Disconnected(_)));
}

#[async_std::test]
async fn stop_disconnects_and_releases_listeners() {
    init();
    let listener = memory_swarm(LISTENER_ID);
    let advertised = listener.start_listening(&ma("/memory/0")).await.unwrap();

    let dialer = memory_swarm(DIALER_ID);
    let peer = dialer
        .connect(&advertised, CancelToken::none())
        .await
        .unwrap()
        .unwrap();
    assert!(dialer.is_connected(peer.id()));

    dialer.stop().await;
    assert!(dialer.known_peers().is_empty());
    assert!(!dialer.is_connected(peer.id()));

    listener.stop().await;
    assert!(listener.local_peer().addresses().is_empty());
}
