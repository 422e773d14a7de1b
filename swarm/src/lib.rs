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

//! High level manager of the peer-to-peer network.
//!
//! A [`Swarm`] owns the set of known and connected peers, the listeners,
//! and the access policy. It dials peers by multiaddress across the
//! registered transports, accepts inbound streams, and drives every
//! connection lifecycle: dial, handshake, listen, accept, disconnect.
//!
//! # Building a swarm
//!
//! A swarm needs the local peer id and at least one transport:
//!
//! ```no_run
//! use ipfs_engine_core::transport::memory::MemoryTransport;
//! use ipfs_engine_swarm::Swarm;
//! use std::sync::Arc;
//!
//! let local_id = "QmYyQSo1c1Ym7orWxLYvCrM2EmxFTANf8wXmmE7DWjhx5N".parse().unwrap();
//! let swarm = Swarm::builder(local_id)
//!     .transport(Arc::new(MemoryTransport::default()))
//!     .build()
//!     .unwrap();
//! swarm.start();
//! ```
//!
//! Resolver, handshake, executor and event handler are further extension
//! points of the builder. All mutating operations require the swarm to be
//! started; `stop()` tears every listener and connection down and clears
//! all state.
//!
//! # Peers are snapshots
//!
//! Every [`Peer`] returned by this API is a snapshot. The swarm's internal
//! tables are the single source of truth, and a snapshot may go stale while
//! held; query again rather than caching peers.

mod error;

pub use error::{DialAttempt, DialError, Error};

use fnv::FnvHashMap;
use futures::executor::ThreadPoolBuilder;
use ipfs_engine_core::cancellation::{cancellation, CancelToken, Cancelled, Canceller};
use ipfs_engine_core::connection::{Connection, Handshake, PlainHandshake};
use ipfs_engine_core::executor::Executor;
use ipfs_engine_core::peer::{Peer, PeerId};
use ipfs_engine_core::policy::Policy;
use ipfs_engine_core::resolver::{IdentityResolver, Resolver};
use ipfs_engine_core::transport::{
    AcceptCallback, BoxStream, Transport, TransportError, TransportRegistry,
};
use ipfs_engine_multiaddr::Multiaddr;
use parking_lot::Mutex;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;

/// Lifecycle phase of a [`Swarm`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Stopped,
    Started,
    Stopping,
}

/// A listener bound by [`Swarm::start_listening`].
///
/// Keeps the cancellation signal of the accept loop and the effective bound
/// address, which may differ from the table key when a wildcard port was
/// requested.
struct Listener {
    canceller: Canceller,
    bound: Multiaddr,
}

/// Event delivered to the layer above the swarm.
#[derive(Debug)]
pub enum SwarmEvent {
    /// An outbound connection completed its handshake.
    Connected(PeerId),
    /// A connected peer was disconnected.
    Disconnected(PeerId),
    /// An inbound connection completed its handshake. `peer` is set when
    /// the remote address carried an identity segment and registration
    /// succeeded.
    ConnectionAccepted {
        local_address: Multiaddr,
        remote_address: Multiaddr,
        peer: Option<PeerId>,
    },
}

type EventHandler = Arc<dyn Fn(SwarmEvent) + Send + Sync>;

struct Inner {
    local_peer: Mutex<Peer>,
    peers: Mutex<FnvHashMap<PeerId, Peer>>,
    connections: Mutex<FnvHashMap<PeerId, Connection>>,
    listeners: Mutex<FnvHashMap<Multiaddr, Listener>>,
    policy: Mutex<Policy>,
    phase: Mutex<Phase>,
    registry: TransportRegistry,
    resolver: Arc<dyn Resolver>,
    handshake: Arc<dyn Handshake>,
    executor: Arc<dyn Executor>,
    events: Option<EventHandler>,
}

/// Manager of the peers, connections, listeners and access policy of a
/// node. Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct Swarm {
    inner: Arc<Inner>,
}

impl Swarm {
    /// Starts building a swarm for the given local peer id.
    pub fn builder(local_id: PeerId) -> SwarmBuilder {
        SwarmBuilder::new(local_id)
    }

    /// Transitions to `Started`. Idempotent; all mutating operations other
    /// than `stop` require a started swarm.
    pub fn start(&self) {
        let mut phase = self.inner.phase.lock();
        if *phase != Phase::Started {
            *phase = Phase::Started;
            log::info!("swarm started (local peer {})", self.inner.local_peer.lock().id());
        }
    }

    /// Shuts the swarm down: fires every listener's cancellation signal,
    /// disconnects every connected peer, clears all tables and resets the
    /// policy lists. Idempotent; returns only once every owned stream has
    /// been disposed. The swarm can be started again afterwards.
    pub async fn stop(&self) {
        {
            let mut phase = self.inner.phase.lock();
            if *phase == Phase::Stopped {
                return;
            }
            *phase = Phase::Stopping;
        }
        log::info!("swarm stopping");

        let listeners: Vec<Listener> = {
            let mut table = self.inner.listeners.lock();
            table.drain().map(|(_, listener)| listener).collect()
        };
        {
            let mut local = self.inner.local_peer.lock();
            for listener in &listeners {
                local.remove_address(&listener.bound);
            }
        }
        for listener in listeners {
            listener.canceller.cancel();
        }

        let connections: Vec<(PeerId, Connection)> = {
            let mut table = self.inner.connections.lock();
            table.drain().collect()
        };
        for (id, mut conn) in connections {
            conn.dispose().await;
            self.notify(SwarmEvent::Disconnected(id));
        }

        self.inner.peers.lock().clear();
        self.inner.policy.lock().reset();
        *self.inner.phase.lock() = Phase::Stopped;
        log::info!("swarm stopped");
    }

    /// Registers the peer identified by the trailing `/p2p/<id>` segment of
    /// `addr`, adding `addr` to its known addresses.
    ///
    /// Idempotent: registering the same address twice leaves the peer table
    /// unchanged, and further addresses of an already known peer are merged
    /// into the existing entry.
    pub fn register_peer(&self, addr: &Multiaddr, cancel: CancelToken) -> Result<Peer, Error> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.register_peer_inner(addr)
    }

    fn register_peer_inner(&self, addr: &Multiaddr) -> Result<Peer, Error> {
        self.require_started()?;
        let id: PeerId = match addr.peer_id() {
            Some(id) => id.parse().map_err(|_| Error::MissingIdentity(addr.clone()))?,
            None => return Err(Error::MissingIdentity(addr.clone())),
        };
        if id == *self.inner.local_peer.lock().id() {
            return Err(Error::SelfRegistration(id));
        }
        if self.inner.policy.lock().is_not_allowed(addr) {
            return Err(Error::PolicyDenied(addr.clone()));
        }
        let mut peers = self.inner.peers.lock();
        let peer = peers.entry(id.clone()).or_insert_with(|| {
            log::debug!("registered new peer {}", id);
            Peer::new(id.clone())
        });
        peer.add_address(addr.clone());
        Ok(peer.clone())
    }

    /// Connects to the peer identified by `addr`.
    ///
    /// Registers the peer, resolves the address, and dials every resolved
    /// address in order with the first registered transport of each until
    /// one stream opens and completes the outbound handshake. Already
    /// connected peers are returned without any dialing.
    ///
    /// Returns `Ok(None)` iff the cancellation signal fired: the peer stays
    /// registered, no stream is kept. When every attempt fails, the
    /// per-address failures are aggregated into [`Error::Unreachable`].
    pub async fn connect(
        &self,
        addr: &Multiaddr,
        cancel: CancelToken,
    ) -> Result<Option<Peer>, Error> {
        let peer = self.register_peer_inner(addr)?;
        if cancel.is_cancelled() {
            return Ok(None);
        }
        if peer.is_connected() {
            log::trace!("already connected to {}", peer.id());
            return Ok(Some(peer));
        }
        let peer_id = peer.id().clone();

        let mut attempts: Vec<DialAttempt> = Vec::new();
        let resolved = match cancel
            .guard(self.inner.resolver.resolve(addr, cancel.clone()))
            .await
        {
            Err(Cancelled) => return Ok(None),
            Ok(Ok(addrs)) => addrs,
            Ok(Err(e)) => {
                attempts.push(DialAttempt {
                    address: addr.clone(),
                    error: DialError::Transport(TransportError::Io(e)),
                });
                Vec::new()
            }
        };
        if resolved.is_empty() && attempts.is_empty() {
            attempts.push(DialAttempt {
                address: addr.clone(),
                error: DialError::NoKnownAddress,
            });
        }

        for concrete in resolved {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            let transport = match self.inner.registry.select(&concrete) {
                Some(transport) => transport,
                None => {
                    attempts.push(DialAttempt {
                        address: concrete,
                        error: DialError::MissingTransport,
                    });
                    continue;
                }
            };
            log::debug!("dialing {} via {}", concrete, transport.protocol());
            let stream = match transport.connect(&concrete, cancel.clone()).await {
                Ok(stream) => stream,
                Err(TransportError::Cancelled) => return Ok(None),
                Err(e) => {
                    log::debug!("dial attempt {} failed: {}", concrete, e);
                    attempts.push(DialAttempt {
                        address: concrete,
                        error: DialError::Transport(e),
                    });
                    continue;
                }
            };

            let local_snapshot = self.inner.local_peer.lock().clone();
            let mut conn = Connection::new(local_snapshot, None, concrete.clone(), stream);
            conn.set_remote_peer(peer_id.clone());
            if let Err(e) = self.inner.handshake.initiate(&mut conn, cancel.clone()).await {
                conn.dispose().await;
                if cancel.is_cancelled() {
                    return Ok(None);
                }
                log::debug!("outbound handshake with {} failed: {}", concrete, e);
                attempts.push(DialAttempt {
                    address: concrete,
                    error: DialError::Handshake(e),
                });
                continue;
            }
            if cancel.is_cancelled() {
                conn.dispose().await;
                return Ok(None);
            }

            let connected = {
                let mut peers = self.inner.peers.lock();
                peers.get_mut(&peer_id).map(|p| {
                    p.add_address(concrete.clone());
                    p.set_connected_address(Some(concrete.clone()));
                    p.clone()
                })
            };
            let connected = match connected {
                Some(peer) => peer,
                None => {
                    // The peer table was cleared while the dial was in
                    // flight; do not repopulate it.
                    conn.dispose().await;
                    return Err(Error::NotStarted);
                }
            };
            let previous = self.inner.connections.lock().insert(peer_id.clone(), conn);
            if let Some(mut orphaned) = previous {
                // A concurrent dial to the same peer lost the race.
                orphaned.dispose().await;
            }
            log::debug!("connected to {} at {}", peer_id, concrete);
            self.notify(SwarmEvent::Connected(peer_id));
            return Ok(Some(connected));
        }

        Err(Error::Unreachable { peer: peer_id, attempts })
    }

    /// Disconnects the peer identified by `addr`, disposing its stream.
    ///
    /// Idempotent and infallible: an address without identity segment, an
    /// unknown peer, and a peer without live stream are all silently
    /// ignored. The peer itself stays registered with its known addresses.
    pub async fn disconnect(&self, addr: &Multiaddr, _cancel: CancelToken) {
        let id: PeerId = match addr.peer_id().and_then(|id| id.parse().ok()) {
            Some(id) => id,
            None => return,
        };
        {
            let mut peers = self.inner.peers.lock();
            match peers.get_mut(&id) {
                None => return,
                Some(peer) if !peer.is_connected() => return,
                Some(peer) => peer.set_connected_address(None),
            }
        }
        let conn = self.inner.connections.lock().remove(&id);
        if let Some(mut conn) = conn {
            conn.dispose().await;
        }
        log::debug!("disconnected from {}", id);
        self.notify(SwarmEvent::Disconnected(id));
    }

    /// Starts listening on `addr` with the first registered transport of
    /// its protocol segments.
    ///
    /// Returns the dial-me address: the effective bound address (wildcard
    /// ports resolved) extended with `/p2p/<local-id>`. The bound address
    /// is also recorded in the local peer's addresses. Fails with
    /// [`Error::AlreadyListening`] when a listener for `addr` exists and
    /// with [`Error::MissingTransport`] when no protocol segment is
    /// registered.
    pub async fn start_listening(&self, addr: &Multiaddr) -> Result<Multiaddr, Error> {
        self.require_started()?;
        let (canceller, token) = cancellation();
        {
            let mut listeners = self.inner.listeners.lock();
            if listeners.contains_key(addr) {
                return Err(Error::AlreadyListening(addr.clone()));
            }
            listeners.insert(addr.clone(), Listener { canceller, bound: addr.clone() });
        }
        let transport = match self.inner.registry.select(addr) {
            Some(transport) => transport,
            None => {
                self.inner.listeners.lock().remove(addr);
                return Err(Error::MissingTransport(addr.clone()));
            }
        };

        let swarm = self.clone();
        let on_accept: AcceptCallback = Arc::new(move |stream, local, remote| {
            swarm.accepted(stream, local, remote);
        });
        let (bound, accept_loop) = match transport.listen(addr, on_accept, token).await {
            Ok(listening) => listening,
            Err(e) => {
                self.inner.listeners.lock().remove(addr);
                return Err(Error::Listen { address: addr.clone(), source: e });
            }
        };

        if let Some(listener) = self.inner.listeners.lock().get_mut(addr) {
            listener.bound = bound.clone();
        }
        self.inner.local_peer.lock().add_address(bound.clone());
        self.inner.executor.exec(accept_loop);

        let advertised = bound.with_p2p(self.inner.local_peer.lock().id().as_str());
        log::info!("listening on {}", advertised);
        Ok(advertised)
    }

    /// Stops the listener bound under `addr` (the address passed to
    /// [`Swarm::start_listening`]), firing its cancellation signal and
    /// retracting the bound address from the local peer. Silent on unknown
    /// addresses; never fails.
    pub async fn stop_listening(&self, addr: &Multiaddr) {
        let listener = self.inner.listeners.lock().remove(addr);
        if let Some(listener) = listener {
            {
                let mut local = self.inner.local_peer.lock();
                local.remove_address(&listener.bound);
                local.remove_address(addr);
            }
            listener.canceller.cancel();
            log::info!("stopped listening on {}", listener.bound);
        }
    }

    /// Dispatches an inbound stream to a detached task that runs the
    /// responder handshake. Failures are logged, never propagated.
    fn accepted(&self, stream: BoxStream, local: Multiaddr, remote: Multiaddr) {
        let swarm = self.clone();
        self.inner.executor.exec(Box::pin(async move {
            swarm.handle_inbound(stream, local, remote).await;
        }));
    }

    async fn handle_inbound(&self, stream: BoxStream, local: Multiaddr, remote: Multiaddr) {
        let local_snapshot = self.inner.local_peer.lock().clone();
        let mut conn = Connection::new(local_snapshot, Some(local.clone()), remote.clone(), stream);
        if self.require_started().is_err() {
            conn.dispose().await;
            return;
        }
        if let Err(e) = self.inner.handshake.respond(&mut conn).await {
            log::warn!("inbound handshake with {} failed: {}", remote, e);
            conn.dispose().await;
            return;
        }

        // Most transports report a raw socket address for the remote, which
        // carries no identity segment; identifying such peers is up to the
        // layer above, notified below. An identity-bearing remote address
        // is registered like a dialed one, policy included.
        let peer = if remote.has_peer_id() {
            match self.register_peer_inner(&remote) {
                Ok(peer) => {
                    let id = peer.id().clone();
                    conn.set_remote_peer(id.clone());
                    {
                        let mut peers = self.inner.peers.lock();
                        if let Some(p) = peers.get_mut(&id) {
                            p.set_connected_address(Some(remote.clone()));
                        }
                    }
                    let previous = self.inner.connections.lock().insert(id.clone(), conn);
                    if let Some(mut orphaned) = previous {
                        orphaned.dispose().await;
                    }
                    log::debug!("accepted connection from {}", remote);
                    Some(id)
                }
                Err(e) => {
                    log::warn!("rejecting inbound connection from {}: {}", remote, e);
                    conn.dispose().await;
                    return;
                }
            }
        } else {
            log::debug!("accepted anonymous connection from {}", remote);
            // No identity, no table slot. The layer above learns about the
            // stream through the event; the swarm itself releases it.
            conn.dispose().await;
            None
        };
        self.notify(SwarmEvent::ConnectionAccepted {
            local_address: local,
            remote_address: remote,
            peer,
        });
    }

    /// Snapshot of every known peer.
    pub fn known_peers(&self) -> Vec<Peer> {
        self.inner.peers.lock().values().cloned().collect()
    }

    /// Every address of every known peer.
    pub fn known_peer_addresses(&self) -> Vec<Multiaddr> {
        self.inner
            .peers
            .lock()
            .values()
            .flat_map(|peer| peer.addresses().to_vec())
            .collect()
    }

    /// Snapshot of the local peer: its id plus the addresses currently
    /// being listened on.
    pub fn local_peer(&self) -> Peer {
        self.inner.local_peer.lock().clone()
    }

    /// Whether a live stream to `id` exists.
    pub fn is_connected(&self, id: &PeerId) -> bool {
        self.inner.connections.lock().contains_key(id)
    }

    pub fn is_allowed(&self, addr: &Multiaddr) -> bool {
        self.inner.policy.lock().is_allowed(addr)
    }

    pub fn is_not_allowed(&self, addr: &Multiaddr) -> bool {
        self.inner.policy.lock().is_not_allowed(addr)
    }

    /// Snapshot of the current policy.
    pub fn policy(&self) -> Policy {
        self.inner.policy.lock().clone()
    }

    /// Mutates the policy under the swarm's lock.
    pub fn update_policy(&self, f: impl FnOnce(&mut Policy)) {
        f(&mut self.inner.policy.lock())
    }

    /// Adds a pattern to the allow-list.
    pub fn allow(&self, pattern: Multiaddr) {
        self.update_policy(|policy| {
            policy.allow_list_mut().add(pattern);
        })
    }

    /// Adds a pattern to the deny-list.
    pub fn deny(&self, pattern: Multiaddr) {
        self.update_policy(|policy| {
            policy.deny_list_mut().add(pattern);
        })
    }

    fn require_started(&self) -> Result<(), Error> {
        if *self.inner.phase.lock() == Phase::Started {
            Ok(())
        } else {
            Err(Error::NotStarted)
        }
    }

    fn notify(&self, event: SwarmEvent) {
        if let Some(handler) = &self.inner.events {
            handler(event)
        }
    }
}

/// Builder for a [`Swarm`].
pub struct SwarmBuilder {
    local_id: PeerId,
    registry: TransportRegistry,
    resolver: Arc<dyn Resolver>,
    handshake: Arc<dyn Handshake>,
    executor: Option<Arc<dyn Executor>>,
    events: Option<EventHandler>,
}

impl SwarmBuilder {
    pub fn new(local_id: PeerId) -> Self {
        SwarmBuilder {
            local_id,
            registry: TransportRegistry::new(),
            resolver: Arc::new(IdentityResolver),
            handshake: Arc::new(PlainHandshake),
            executor: None,
            events: None,
        }
    }

    /// Registers a transport under its protocol name.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.registry.register(transport);
        self
    }

    /// Replaces the whole transport registry.
    pub fn registry(mut self, registry: TransportRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Sets the resolver consulted before dialing. Defaults to the
    /// pass-through [`IdentityResolver`].
    pub fn resolver(mut self, resolver: impl Resolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Sets the handshake run over every new connection. Defaults to
    /// [`PlainHandshake`].
    pub fn handshake(mut self, handshake: impl Handshake + 'static) -> Self {
        self.handshake = Arc::new(handshake);
        self
    }

    /// Sets the executor for the detached tasks (accept loops, inbound
    /// handshakes). Defaults to a dedicated thread pool.
    pub fn executor(mut self, executor: impl Executor + 'static) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    /// Sets the handler receiving [`SwarmEvent`]s.
    pub fn on_event(mut self, handler: impl Fn(SwarmEvent) + Send + Sync + 'static) -> Self {
        self.events = Some(Arc::new(handler));
        self
    }

    /// Builds the swarm, initially in the `Stopped` phase. Fails only when
    /// no executor was configured and the fallback thread pool cannot be
    /// created.
    pub fn build(self) -> io::Result<Swarm> {
        let executor = match self.executor {
            Some(executor) => executor,
            None => {
                struct PoolWrapper(futures::executor::ThreadPool);
                impl Executor for PoolWrapper {
                    fn exec(&self, f: Pin<Box<dyn Future<Output = ()> + Send>>) {
                        self.0.spawn_ok(f)
                    }
                }
                let pool = ThreadPoolBuilder::new()
                    .name_prefix("ipfs-engine-task-")
                    .create()?;
                Arc::new(PoolWrapper(pool))
            }
        };
        Ok(Swarm {
            inner: Arc::new(Inner {
                local_peer: Mutex::new(Peer::new(self.local_id)),
                peers: Mutex::new(Default::default()),
                connections: Mutex::new(Default::default()),
                listeners: Mutex::new(Default::default()),
                policy: Mutex::new(Policy::new()),
                phase: Mutex::new(Phase::Stopped),
                registry: self.registry,
                resolver: self.resolver,
                handshake: self.handshake,
                executor,
                events: self.events,
            }),
        })
    }
}
