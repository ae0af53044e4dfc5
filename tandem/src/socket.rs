//! Socket handle and the state it shares with the dispatcher.
//!
//! A [`Socket`] is a thin handle over a [`SocketCore`]. The core owns the
//! socket's connections (one [`Pipe`] each), its subscription state and the
//! bookkeeping needed to wake blocked callers. The dispatcher only ever
//! holds a `Weak` reference and upgrades it briefly to attach a connection,
//! so dropping the handle closes the socket.
//!
//! Locking order: subscriptions → pipes → index. No lock is held while a
//! caller is suspended.

use crate::context::ContextInner;
use crate::dispatcher::ListenerGuard;
use crate::pattern;
use bytes::Bytes;
use flume::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tandem_core::endpoint::{Endpoint, EndpointError};
use tandem_core::error::{Result, SocketError};
use tandem_core::index::SubscriptionIndex;
use tandem_core::message::Message;
use tandem_core::monitor::{create_monitor, SocketEvent, SocketEventSender, SocketMonitor};
use tandem_core::options::{Flags, SocketOption, SocketOptions};
use tandem_core::queue::{pipe_pair, queue_capacity, Pipe, PipeId};
use tandem_core::socket_type::SocketType;
use tandem_core::subscription::{SubscriptionEvent, SubscriptionSet};
use tracing::{debug, trace};

/// How a connection came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    /// We dialed it
    Connected,
    /// A listener (or inproc binder) accepted it
    Accepted,
}

pub(crate) struct SocketCore {
    socket_type: SocketType,
    options: RwLock<SocketOptions>,
    pub(crate) pipes: Mutex<Vec<Pipe>>,
    /// SUB only
    pub(crate) subscriptions: Mutex<SubscriptionSet>,
    /// PUB only
    pub(crate) index: Mutex<SubscriptionIndex>,
    /// Fair-queue rotation
    cursor: AtomicUsize,
    /// One entry per suspended caller
    wakers: Mutex<Vec<Sender<()>>>,
    closed: AtomicBool,
    monitor: Mutex<Option<SocketEventSender>>,
    last_endpoint: Mutex<Option<Endpoint>>,
    inproc_names: Mutex<Vec<String>>,
    listeners: Mutex<Vec<ListenerGuard>>,
}

impl SocketCore {
    pub(crate) fn new(socket_type: SocketType, options: SocketOptions) -> Self {
        Self {
            socket_type,
            options: RwLock::new(options),
            pipes: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(SubscriptionSet::new()),
            index: Mutex::new(SubscriptionIndex::new()),
            cursor: AtomicUsize::new(0),
            wakers: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            monitor: Mutex::new(None),
            last_endpoint: Mutex::new(None),
            inproc_names: Mutex::new(Vec::new()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    #[inline]
    pub(crate) fn socket_type(&self) -> SocketType {
        self.socket_type
    }

    pub(crate) fn options(&self) -> SocketOptions {
        self.options.read().clone()
    }

    /// Store a non-subscription option.
    pub(crate) fn apply_option(&self, option: &SocketOption) {
        self.options.write().apply(option);
    }

    #[inline]
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(SocketError::ConnectionClosed)
        } else {
            Ok(())
        }
    }

    /// Report `event` to the monitor, if one is installed.
    pub(crate) fn emit(&self, event: SocketEvent) {
        let mut monitor = self.monitor.lock();
        if let Some(tx) = monitor.as_ref() {
            if tx.send(event).is_err() {
                // Receiver dropped
                *monitor = None;
            }
        }
    }

    /// Register interest in the next attach or close.
    ///
    /// Callers must register *before* inspecting state, so a change made in
    /// between is not missed.
    pub(crate) fn register_waker(&self) -> Receiver<()> {
        let (tx, rx) = flume::bounded(1);
        let mut wakers = self.wakers.lock();
        wakers.retain(|w| !w.is_disconnected());
        wakers.push(tx);
        rx
    }

    fn wake_all(&self) {
        for waker in self.wakers.lock().drain(..) {
            let _ = waker.try_send(());
        }
    }

    /// Index into a list of `len` connections to start a fair-queued scan at.
    pub(crate) fn next_start(&self, len: usize) -> usize {
        if len == 0 {
            0
        } else {
            self.cursor.fetch_add(1, Ordering::Relaxed) % len
        }
    }

    /// Whether a connection with a live peer exists.
    pub(crate) fn has_live_peer(&self) -> bool {
        self.pipes.lock().iter().any(|p| !p.is_disconnected())
    }

    /// Remove connections whose peer is gone and whose inbound queue is empty.
    pub(crate) fn prune_locked(&self, pipes: &mut Vec<Pipe>) -> Vec<PipeId> {
        let mut removed = Vec::new();
        pipes.retain(|pipe| {
            if pipe.is_drained() {
                debug!("[{}] Connection {} lost", self.socket_type, pipe.endpoint());
                self.emit(SocketEvent::Disconnected(pipe.endpoint().clone()));
                removed.push(pipe.id());
                false
            } else {
                true
            }
        });
        removed
    }

    /// Drop one connection by id.
    pub(crate) fn remove_pipe(&self, id: PipeId) {
        let mut pipes = self.pipes.lock();
        if let Some(pos) = pipes.iter().position(|p| p.id() == id) {
            let pipe = pipes.remove(pos);
            debug!("[{}] Connection {} lost", self.socket_type, pipe.endpoint());
            self.emit(SocketEvent::Disconnected(pipe.endpoint().clone()));
        }
    }

    /// Adopt a new connection. Returns `false` if it was refused, in which
    /// case the pipe is dropped and the peer sees a disconnect.
    pub(crate) fn attach(&self, pipe: Pipe, origin: Origin) -> bool {
        let subscriptions =
            (self.socket_type == SocketType::Sub).then(|| self.subscriptions.lock());
        let mut pipes = self.pipes.lock();

        if self.is_closed() {
            return false;
        }

        let pruned = self.prune_locked(&mut pipes);
        if self.socket_type == SocketType::Pub && !pruned.is_empty() {
            let mut index = self.index.lock();
            for id in pruned {
                index.remove_peer(id);
            }
        }

        if self.socket_type.is_exclusive() && pipes.iter().any(|p| !p.is_disconnected()) {
            debug!("[PAIR] Refusing {}: peer already connected", pipe.endpoint());
            self.emit(SocketEvent::Rejected(pipe.endpoint().clone()));
            return false;
        }

        if let Some(subscriptions) = &subscriptions {
            for prefix in subscriptions.prefixes() {
                let _ = pipe.try_push(SubscriptionEvent::Subscribe(prefix.clone()).to_message());
            }
        }

        let endpoint = pipe.endpoint().clone();
        pipes.push(pipe);
        debug!(
            "[{}] Attached {} ({} connections)",
            self.socket_type,
            endpoint,
            pipes.len()
        );
        drop(pipes);
        drop(subscriptions);

        self.emit(match origin {
            Origin::Connected => SocketEvent::Connected(endpoint),
            Origin::Accepted => SocketEvent::Accepted(endpoint),
        });
        self.wake_all();
        true
    }

    fn add_listener(&self, guard: ListenerGuard) {
        let mut listeners = self.listeners.lock();
        if !self.is_closed() {
            listeners.push(guard);
        }
    }

    /// Tear everything down. Returns the inproc names to unregister, or
    /// `None` if the socket was already closed.
    pub(crate) fn close(&self) -> Option<Vec<String>> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return None;
        }

        self.listeners.lock().clear();
        let dropped = std::mem::take(&mut *self.pipes.lock());
        *self.index.lock() = SubscriptionIndex::new();
        self.wake_all();

        debug!(
            "[{}] Closed ({} connections dropped)",
            self.socket_type,
            dropped.len()
        );
        drop(dropped);
        self.emit(SocketEvent::Closed);

        Some(std::mem::take(&mut *self.inproc_names.lock()))
    }
}

/// A PAIR, PUB or SUB socket.
///
/// All operations take `&self`; a socket can be shared between threads
/// (for example behind an `Arc` or in a scoped thread) and one thread may
/// `close()` it while another is blocked in `recv()`.
///
/// # Example
///
/// ```rust,no_run
/// use tandem::prelude::*;
///
/// # fn main() -> tandem::Result<()> {
/// let ctx = Context::new();
/// let a = ctx.socket(SocketType::Pair)?;
/// let b = ctx.socket(SocketType::Pair)?;
/// a.bind("inproc://pipe")?;
/// b.connect("inproc://pipe")?;
///
/// a.send("ping", Flags::NONE)?;
/// assert_eq!(b.recv(Flags::NONE)?, "ping");
/// # Ok(())
/// # }
/// ```
pub struct Socket {
    core: Arc<SocketCore>,
    ctx: Arc<ContextInner>,
}

impl Socket {
    pub(crate) fn new(ctx: Arc<ContextInner>, socket_type: SocketType) -> Self {
        let core = Arc::new(SocketCore::new(socket_type, ctx.default_options()));
        debug!("[{}] Created", socket_type);
        Self { core, ctx }
    }

    #[inline]
    pub fn socket_type(&self) -> SocketType {
        self.core.socket_type()
    }

    /// Start accepting connections on `addr`.
    ///
    /// Returns the resolved endpoint, which differs from `addr` when a
    /// wildcard port (`tcp://127.0.0.1:*` or `:0`) was requested.
    pub fn bind(&self, addr: &str) -> Result<Endpoint> {
        self.ctx.check_alive()?;
        self.core.check_open()?;

        let endpoint = match Endpoint::parse(addr)? {
            Endpoint::Inproc(name) => {
                self.ctx.register_inproc(&name, Arc::downgrade(&self.core))?;
                self.core.inproc_names.lock().push(name.clone());
                Endpoint::Inproc(name)
            }
            Endpoint::Tcp(addr) => {
                let dispatcher = self.ctx.dispatcher()?;
                let (local, guard) = dispatcher.bind(addr, Arc::downgrade(&self.core))?;
                self.core.add_listener(guard);
                let endpoint = Endpoint::Tcp(local);
                self.core.emit(SocketEvent::Listening(endpoint.clone()));
                endpoint
            }
        };

        debug!("[{}] Bound to {}", self.socket_type(), endpoint);
        self.core.emit(SocketEvent::Bound(endpoint.clone()));
        *self.core.last_endpoint.lock() = Some(endpoint.clone());
        Ok(endpoint)
    }

    /// Connect to a bound peer.
    ///
    /// `inproc://` connections are attached before this returns. For
    /// `tcp://` this returns once the TCP connection is up; the handshake
    /// completes in the background and a blocking `send`/`recv` waits for it.
    pub fn connect(&self, addr: &str) -> Result<()> {
        self.ctx.check_alive()?;
        self.core.check_open()?;

        let endpoint = Endpoint::parse(addr)?;
        if endpoint.is_wildcard() {
            return Err(EndpointError::WildcardConnect(endpoint).into());
        }
        if self.socket_type().is_exclusive() && self.core.has_live_peer() {
            return Err(SocketError::PeerExists);
        }

        match &endpoint {
            Endpoint::Inproc(name) => self.connect_inproc(name)?,
            Endpoint::Tcp(addr) => {
                self.ctx
                    .dispatcher()?
                    .connect(*addr, Arc::downgrade(&self.core))?;
            }
        }

        debug!("[{}] Connecting to {}", self.socket_type(), endpoint);
        *self.core.last_endpoint.lock() = Some(endpoint);
        Ok(())
    }

    fn connect_inproc(&self, name: &str) -> Result<()> {
        let peer = self.ctx.lookup_inproc(name)?;
        let (local_type, peer_type) = (self.socket_type(), peer.socket_type());
        if !local_type.is_compatible(peer_type) {
            return Err(EndpointError::Incompatible {
                local: local_type.to_string(),
                peer: peer_type.to_string(),
            }
            .into());
        }

        let (ours, theirs) = (self.core.options(), peer.options());
        let (local, remote) = pipe_pair(
            Endpoint::Inproc(name.to_string()),
            queue_capacity(local_type, ours.send_hwm, theirs.recv_hwm),
            queue_capacity(peer_type, theirs.send_hwm, ours.recv_hwm),
        );

        if !peer.attach(remote, Origin::Accepted) {
            return Err(if peer.is_closed() {
                EndpointError::InprocNotBound(name.to_string()).into()
            } else {
                SocketError::PeerExists
            });
        }
        if !self.core.attach(local, Origin::Connected) {
            self.core.check_open()?;
            return Err(SocketError::PeerExists);
        }
        Ok(())
    }

    /// Send one message.
    ///
    /// - PAIR: blocks while the peer's queue is full or no peer is attached
    /// - PUB: never blocks; peers at their high-water mark miss the message
    /// - SUB: `NotSupported`
    pub fn send(&self, msg: impl Into<Message>, flags: Flags) -> Result<()> {
        pattern::send(&self.core, msg.into(), flags)
    }

    /// Receive one message.
    ///
    /// - PAIR: oldest message from the peer
    /// - SUB: next message matching the subscriptions, fair-queued across
    ///   connections
    /// - PUB: `NotSupported`
    pub fn recv(&self, flags: Flags) -> Result<Message> {
        pattern::recv(&self.core, flags)
    }

    /// Change a socket option.
    ///
    /// High-water marks and `MaxMsgSize` apply to connections made after the
    /// change.
    pub fn set_option(&self, option: SocketOption) -> Result<()> {
        self.core.check_open()?;
        let name = option.name();
        match option {
            SocketOption::Subscribe(prefix) => {
                self.require_sub(name)?;
                pattern::update_subscription(&self.core, SubscriptionEvent::Subscribe(prefix));
            }
            SocketOption::Unsubscribe(prefix) => {
                self.require_sub(name)?;
                pattern::update_subscription(&self.core, SubscriptionEvent::Unsubscribe(prefix));
            }
            other => {
                trace!("[{}] Setting {}", self.socket_type(), name);
                self.core.apply_option(&other);
            }
        }
        Ok(())
    }

    fn require_sub(&self, option: &'static str) -> Result<()> {
        if self.socket_type() == SocketType::Sub {
            Ok(())
        } else {
            Err(SocketError::InvalidOption {
                option,
                socket_type: self.socket_type(),
            })
        }
    }

    /// Shorthand for `set_option(SocketOption::subscribe(prefix))`.
    pub fn subscribe(&self, prefix: impl AsRef<[u8]>) -> Result<()> {
        self.set_option(SocketOption::subscribe(prefix))
    }

    /// Shorthand for `set_option(SocketOption::unsubscribe(prefix))`.
    pub fn unsubscribe(&self, prefix: impl AsRef<[u8]>) -> Result<()> {
        self.set_option(SocketOption::unsubscribe(prefix))
    }

    /// Close the socket: drop every connection, stop listeners, release
    /// inproc names and wake blocked callers with `ConnectionClosed`.
    ///
    /// Idempotent.
    pub fn close(&self) {
        if let Some(names) = self.core.close() {
            for name in names {
                self.ctx.unregister_inproc(&name, &self.core);
            }
        }
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    /// Install a monitor, replacing any previous one.
    pub fn monitor(&self) -> SocketMonitor {
        let (tx, rx) = create_monitor();
        *self.core.monitor.lock() = Some(tx);
        rx
    }

    /// Endpoint of the last successful `bind` or `connect`.
    pub fn last_endpoint(&self) -> Option<Endpoint> {
        self.core.last_endpoint.lock().clone()
    }

    /// Connections whose peer is still there.
    pub fn peer_count(&self) -> usize {
        self.core
            .pipes
            .lock()
            .iter()
            .filter(|p| !p.is_disconnected())
            .count()
    }

    /// Current options snapshot.
    pub fn options(&self) -> SocketOptions {
        self.core.options()
    }

    /// Distinct subscribed prefixes, sorted. Empty for PAIR and PUB.
    pub fn subscriptions(&self) -> Vec<Bytes> {
        self.core
            .subscriptions
            .lock()
            .prefixes()
            .cloned()
            .collect()
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("socket_type", &self.socket_type())
            .field("last_endpoint", &self.last_endpoint())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
