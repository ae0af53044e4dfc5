//! Per-pattern send/recv logic.
//!
//! | Pattern | send                         | recv                          |
//! |---------|------------------------------|-------------------------------|
//! | PAIR    | single peer, blocks at HWM   | single peer                   |
//! | PUB     | fan-out, drops at HWM        | `NotSupported`                |
//! | SUB     | `NotSupported`               | fair-queued, prefix filtered  |
//!
//! Blocking callers wait on a flume `Selector` over the relevant queues plus
//! the socket's waker (attach/close). Locks are released before waiting.

use crate::socket::SocketCore;
use flume::Selector;
use std::time::{Duration, Instant};
use tandem_core::error::{Result, SocketError};
use tandem_core::message::Message;
use tandem_core::monitor::SocketEvent;
use tandem_core::options::Flags;
use tandem_core::queue::{Overflow, Pipe, PushError};
use tandem_core::subscription::SubscriptionEvent;
use tracing::{debug, trace};

/// Why a blocked caller woke up.
enum Wake {
    Received(Message),
    Sent,
    Disconnected,
    Signalled,
    TimedOut,
}

/// How long a call may suspend.
#[derive(Debug, Clone, Copy)]
struct Blocking {
    nonblocking: bool,
    deadline: Option<Instant>,
}

impl Blocking {
    fn new(flags: Flags, timeout: Option<Duration>) -> Self {
        match timeout {
            _ if flags.is_nonblocking() => Self {
                nonblocking: true,
                deadline: None,
            },
            Some(t) if t.is_zero() => Self {
                nonblocking: true,
                deadline: None,
            },
            Some(t) => Self {
                nonblocking: false,
                deadline: Some(Instant::now() + t),
            },
            None => Self {
                nonblocking: false,
                deadline: None,
            },
        }
    }

    fn wait(&self, selector: Selector<'_, Wake>) -> Wake {
        match self.deadline {
            Some(deadline) => selector.wait_deadline(deadline).unwrap_or(Wake::TimedOut),
            None => selector.wait(),
        }
    }
}

pub(crate) fn send(core: &SocketCore, msg: Message, flags: Flags) -> Result<()> {
    let socket_type = core.socket_type();
    if !socket_type.can_send() {
        return Err(SocketError::not_supported("send", socket_type));
    }
    match Overflow::for_socket(socket_type) {
        Overflow::Block => pair_send(core, msg, flags),
        Overflow::Drop => pub_send(core, &msg),
    }
}

pub(crate) fn recv(core: &SocketCore, flags: Flags) -> Result<Message> {
    let socket_type = core.socket_type();
    if !socket_type.can_recv() {
        return Err(SocketError::not_supported("recv", socket_type));
    }
    if socket_type.filters() {
        sub_recv(core, flags)
    } else {
        pair_recv(core, flags)
    }
}

// ---------------------------------------------------------------------------
// PAIR
// ---------------------------------------------------------------------------

enum PairPeer {
    Live(Pipe),
    /// Every connection is gone
    Lost,
    /// Nothing attached yet
    Vacant,
}

fn pair_peer(core: &SocketCore) -> PairPeer {
    let pipes = core.pipes.lock();
    match pipes.iter().find(|p| !p.is_disconnected()) {
        Some(pipe) => PairPeer::Live(pipe.clone()),
        None if pipes.is_empty() => PairPeer::Vacant,
        None => PairPeer::Lost,
    }
}

/// Prune what can be pruned and report the loss.
fn pair_lost(core: &SocketCore) -> SocketError {
    let mut pipes = core.pipes.lock();
    core.prune_locked(&mut pipes);
    SocketError::ConnectionClosed
}

fn pair_send(core: &SocketCore, mut msg: Message, flags: Flags) -> Result<()> {
    let blocking = Blocking::new(flags, core.options().send_timeout);

    loop {
        let waker = core.register_waker();
        core.check_open()?;

        let len = msg.len();
        let woke = match pair_peer(core) {
            PairPeer::Live(pipe) => match pipe.try_push(msg) {
                Ok(()) => {
                    trace!("[PAIR] Queued {} bytes", len);
                    return Ok(());
                }
                Err(PushError::Disconnected(_)) => return Err(pair_lost(core)),
                Err(PushError::Full(returned)) => {
                    if blocking.nonblocking {
                        return Err(SocketError::WouldBlock);
                    }
                    msg = returned;
                    trace!("[PAIR] Peer queue full, waiting");
                    blocking.wait(
                        Selector::new()
                            .send(pipe.sender(), msg.clone(), |res| {
                                if res.is_ok() {
                                    Wake::Sent
                                } else {
                                    Wake::Disconnected
                                }
                            })
                            .recv(&waker, |_| Wake::Signalled),
                    )
                }
            },
            PairPeer::Lost => return Err(pair_lost(core)),
            PairPeer::Vacant => {
                if blocking.nonblocking {
                    return Err(SocketError::WouldBlock);
                }
                trace!("[PAIR] No peer yet, waiting");
                blocking.wait(Selector::new().recv(&waker, |_| Wake::Signalled))
            }
        };

        match woke {
            Wake::Sent => return Ok(()),
            Wake::TimedOut => return Err(SocketError::WouldBlock),
            _ => continue,
        }
    }
}

fn pair_recv(core: &SocketCore, flags: Flags) -> Result<Message> {
    let blocking = Blocking::new(flags, core.options().recv_timeout);

    loop {
        let waker = core.register_waker();
        core.check_open()?;

        // The oldest connection is drained before a replacement peer is read.
        let pipe = core.pipes.lock().first().cloned();
        let woke = match pipe {
            Some(pipe) => {
                if let Some(msg) = pipe.try_pop() {
                    return Ok(msg);
                }
                if pipe.is_disconnected() {
                    // Nothing can arrive after a disconnect; one last look.
                    if let Some(msg) = pipe.try_pop() {
                        return Ok(msg);
                    }
                    core.remove_pipe(pipe.id());
                    return Err(SocketError::ConnectionClosed);
                }
                if blocking.nonblocking {
                    return Err(SocketError::WouldBlock);
                }
                blocking.wait(
                    Selector::new()
                        .recv(pipe.receiver(), |res| {
                            res.map_or(Wake::Disconnected, Wake::Received)
                        })
                        .recv(&waker, |_| Wake::Signalled),
                )
            }
            None => {
                if blocking.nonblocking {
                    return Err(SocketError::WouldBlock);
                }
                blocking.wait(Selector::new().recv(&waker, |_| Wake::Signalled))
            }
        };

        match woke {
            Wake::Received(msg) => return Ok(msg),
            Wake::TimedOut => return Err(SocketError::WouldBlock),
            _ => continue,
        }
    }
}

// ---------------------------------------------------------------------------
// PUB
// ---------------------------------------------------------------------------

/// Fan `msg` out to every peer subscribed to it. Never blocks.
fn pub_send(core: &SocketCore, msg: &Message) -> Result<()> {
    core.check_open()?;

    let mut pipes = core.pipes.lock();
    let mut index = core.index.lock();

    // Subscription changes arrive as ordinary inbound messages.
    pipes.retain(|pipe| {
        while let Some(cmd) = pipe.try_pop() {
            match SubscriptionEvent::from_message(&cmd) {
                Some(event) => {
                    trace!("[PUB] Peer {} {:?}", pipe.id(), event);
                    index.apply(pipe.id(), event);
                }
                None => trace!("[PUB] Ignoring {} byte message from peer {}", cmd.len(), pipe.id()),
            }
        }

        if pipe.is_disconnected() {
            debug!("[PUB] Connection {} lost", pipe.endpoint());
            index.remove_peer(pipe.id());
            core.emit(SocketEvent::Disconnected(pipe.endpoint().clone()));
            false
        } else {
            true
        }
    });

    if index.is_empty() {
        trace!("[PUB] No subscriptions, dropping {} bytes", msg.len());
        return Ok(());
    }
    let matches = index.match_topic(msg.as_bytes());
    drop(index);

    let mut delivered = 0usize;
    for pipe in pipes.iter().filter(|p| matches.binary_search(&p.id()).is_ok()) {
        match pipe.try_push(msg.clone()) {
            Ok(()) => delivered += 1,
            Err(PushError::Full(_)) => {
                trace!("[PUB] Peer {} at high-water mark, dropping", pipe.id());
            }
            Err(PushError::Disconnected(_)) => {
                trace!("[PUB] Peer {} gone, dropping", pipe.id());
            }
        }
    }

    trace!("[PUB] Delivered to {}/{} peers", delivered, pipes.len());
    Ok(())
}

// ---------------------------------------------------------------------------
// SUB
// ---------------------------------------------------------------------------

/// Apply a local subscription change and forward it upstream if the set of
/// distinct prefixes changed.
pub(crate) fn update_subscription(core: &SocketCore, event: SubscriptionEvent) {
    let mut subscriptions = core.subscriptions.lock();
    let changed = match &event {
        SubscriptionEvent::Subscribe(prefix) => subscriptions.subscribe(prefix.clone()),
        SubscriptionEvent::Unsubscribe(prefix) => subscriptions.unsubscribe(prefix),
    };
    if !changed {
        trace!("[SUB] {:?} only changed a refcount", event);
        return;
    }

    let cmd = event.to_message();
    let pipes = core.pipes.lock();
    for pipe in pipes.iter() {
        // Upstream queues are unbounded; only a dead peer refuses.
        let _ = pipe.try_push(cmd.clone());
    }
    debug!(
        "[SUB] {:?} sent to {} connections, {} prefixes active",
        event,
        pipes.len(),
        subscriptions.len()
    );
}

/// Live connections, after pruning the dead ones.
fn sub_pipes(core: &SocketCore) -> Vec<Pipe> {
    let mut pipes = core.pipes.lock();
    core.prune_locked(&mut pipes);
    pipes.clone()
}

/// First queued message matching the subscriptions, scanning connections
/// round-robin. Non-matching messages are consumed and discarded.
fn pop_matching(core: &SocketCore, pipes: &[Pipe]) -> Option<Message> {
    if pipes.is_empty() {
        return None;
    }

    let subscriptions = core.subscriptions.lock();
    let start = core.next_start(pipes.len());
    for i in 0..pipes.len() {
        let pipe = &pipes[(start + i) % pipes.len()];
        while let Some(msg) = pipe.try_pop() {
            if subscriptions.matches(msg.as_bytes()) {
                return Some(msg);
            }
            trace!("[SUB] Discarding unsubscribed {} byte message", msg.len());
        }
    }
    None
}

fn sub_recv(core: &SocketCore, flags: Flags) -> Result<Message> {
    let blocking = Blocking::new(flags, core.options().recv_timeout);

    loop {
        let waker = core.register_waker();
        core.check_open()?;

        let pipes = sub_pipes(core);
        if let Some(msg) = pop_matching(core, &pipes) {
            return Ok(msg);
        }
        if blocking.nonblocking {
            return Err(SocketError::WouldBlock);
        }

        let woke = {
            let selector = pipes.iter().fold(Selector::new(), |selector, pipe| {
                selector.recv(pipe.receiver(), |res| {
                    res.map_or(Wake::Disconnected, Wake::Received)
                })
            });
            blocking.wait(selector.recv(&waker, |_| Wake::Signalled))
        };

        match woke {
            Wake::Received(msg) => {
                if core.subscriptions.lock().matches(msg.as_bytes()) {
                    return Ok(msg);
                }
                trace!("[SUB] Discarding unsubscribed {} byte message", msg.len());
            }
            Wake::TimedOut => return Err(SocketError::WouldBlock),
            _ => {}
        }
    }
}
