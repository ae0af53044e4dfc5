//! Per-connection queue pairs.
//!
//! A connection is represented on each side by a [`Pipe`]: an outbound
//! sender and an inbound receiver. [`pipe_pair`] creates two crossed ends,
//! so whatever one side sends the other receives, in order.
//!
//! Queues are flume channels. They give us three things the socket layer
//! relies on:
//! - FIFO delivery per direction
//! - a capacity bound (the high-water mark) with blocking *and* non-blocking
//!   access to it
//! - disconnect detection when the other end is dropped, which wakes any
//!   thread blocked on the channel

use crate::endpoint::Endpoint;
use crate::message::Message;
use crate::socket_type::SocketType;
use flume::{Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};

/// Compact connection identifier, unique within the process.
pub type PipeId = u64;

static NEXT_PIPE_ID: AtomicU64 = AtomicU64::new(1);

fn next_pipe_id() -> PipeId {
    NEXT_PIPE_ID.fetch_add(1, Ordering::Relaxed)
}

/// What happens when an outbound queue is at its high-water mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overflow {
    /// Suspend the sender until space frees (back-pressure)
    Block,
    /// Silently drop the message for that peer
    Drop,
}

impl Overflow {
    /// Overflow policy for a sending socket type.
    pub const fn for_socket(socket_type: SocketType) -> Self {
        match socket_type {
            SocketType::Pub => Self::Drop,
            SocketType::Pair | SocketType::Sub => Self::Block,
        }
    }
}

/// Outcome of a non-blocking push.
#[derive(Debug)]
pub enum PushError {
    /// Queue is at its high-water mark; the message is handed back
    Full(Message),
    /// The other end is gone
    Disconnected(Message),
}

/// One side of a connection.
#[derive(Debug, Clone)]
pub struct Pipe {
    id: PipeId,
    endpoint: Endpoint,
    tx: Sender<Message>,
    rx: Receiver<Message>,
}

impl Pipe {
    #[inline]
    pub fn id(&self) -> PipeId {
        self.id
    }

    /// The endpoint this connection was made through.
    #[inline]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Outbound queue.
    #[inline]
    pub fn sender(&self) -> &Sender<Message> {
        &self.tx
    }

    /// Inbound queue.
    #[inline]
    pub fn receiver(&self) -> &Receiver<Message> {
        &self.rx
    }

    /// Push without blocking.
    pub fn try_push(&self, msg: Message) -> Result<(), PushError> {
        self.tx.try_send(msg).map_err(|e| match e {
            TrySendError::Full(m) => PushError::Full(m),
            TrySendError::Disconnected(m) => PushError::Disconnected(m),
        })
    }

    /// Pop without blocking. `None` if nothing is queued right now.
    pub fn try_pop(&self) -> Option<Message> {
        self.rx.try_recv().ok()
    }

    /// Whether the peer end has been torn down in either direction.
    ///
    /// Messages already queued inbound can still be popped.
    pub fn is_disconnected(&self) -> bool {
        self.tx.is_disconnected() || self.rx.is_disconnected()
    }

    /// Whether the peer is gone *and* nothing is left to read.
    pub fn is_drained(&self) -> bool {
        self.is_disconnected() && self.rx.is_empty()
    }

    /// Messages waiting in the inbound queue.
    pub fn queued(&self) -> usize {
        self.rx.len()
    }
}

fn channel(capacity: usize) -> (Sender<Message>, Receiver<Message>) {
    if capacity == 0 {
        flume::unbounded()
    } else {
        flume::bounded(capacity)
    }
}

/// Create two crossed pipe ends.
///
/// `a_to_b` bounds the queue `a` sends into, `b_to_a` the reverse.
/// A capacity of `0` means unbounded.
pub fn pipe_pair(endpoint: Endpoint, a_to_b: usize, b_to_a: usize) -> (Pipe, Pipe) {
    let (tx_ab, rx_ab) = channel(a_to_b);
    let (tx_ba, rx_ba) = channel(b_to_a);

    let a = Pipe {
        id: next_pipe_id(),
        endpoint: endpoint.clone(),
        tx: tx_ab,
        rx: rx_ba,
    };
    let b = Pipe {
        id: next_pipe_id(),
        endpoint,
        tx: tx_ba,
        rx: rx_ab,
    };
    (a, b)
}

/// Capacity of the queue carrying traffic sent by a `sender` socket.
///
/// SUB sockets only send subscription commands upstream, which must never be
/// dropped or block, so that direction is unbounded. Otherwise the capacity
/// is the sum of both high-water marks (libzmq's inproc rule), and unbounded
/// if either side is unbounded.
pub const fn queue_capacity(sender: SocketType, send_hwm: usize, recv_hwm: usize) -> usize {
    if matches!(sender, SocketType::Sub) || send_hwm == 0 || recv_hwm == 0 {
        0
    } else {
        send_hwm + recv_hwm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep() -> Endpoint {
        Endpoint::Inproc("queue-test".into())
    }

    #[test]
    fn crossed_ends_deliver_in_order() {
        let (a, b) = pipe_pair(ep(), 0, 0);
        for i in 0..10 {
            a.try_push(Message::from(vec![b'X'; i])).unwrap();
        }
        for i in 0..10 {
            assert_eq!(b.try_pop().unwrap().len(), i);
        }
        assert!(b.try_pop().is_none());

        b.try_push(Message::from("back")).unwrap();
        assert_eq!(a.try_pop().unwrap(), "back");
    }

    #[test]
    fn high_water_mark_is_enforced() {
        let (a, b) = pipe_pair(ep(), 2, 0);
        a.try_push(Message::from("1")).unwrap();
        a.try_push(Message::from("2")).unwrap();
        match a.try_push(Message::from("3")) {
            Err(PushError::Full(m)) => assert_eq!(m, "3"),
            other => panic!("expected Full, got {:?}", other),
        }
        assert_eq!(b.queued(), 2);
        b.try_pop().unwrap();
        a.try_push(Message::from("3")).unwrap();
    }

    #[test]
    fn dropping_one_end_disconnects_the_other() {
        let (a, b) = pipe_pair(ep(), 0, 0);
        a.try_push(Message::from("last words")).unwrap();
        drop(a);

        assert!(b.is_disconnected());
        assert!(!b.is_drained());
        assert_eq!(b.try_pop().unwrap(), "last words");
        assert!(b.is_drained());
        assert!(matches!(
            b.try_push(Message::from("x")),
            Err(PushError::Disconnected(_))
        ));
    }

    #[test]
    fn ids_are_unique() {
        let (a, b) = pipe_pair(ep(), 0, 0);
        let (c, d) = pipe_pair(ep(), 0, 0);
        let mut ids = vec![a.id(), b.id(), c.id(), d.id()];
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn capacity_rules() {
        assert_eq!(queue_capacity(SocketType::Pair, 10, 5), 15);
        assert_eq!(queue_capacity(SocketType::Pub, 0, 5), 0);
        assert_eq!(queue_capacity(SocketType::Sub, 10, 10), 0);
    }

    #[test]
    fn overflow_policy_by_pattern() {
        assert_eq!(Overflow::for_socket(SocketType::Pair), Overflow::Block);
        assert_eq!(Overflow::for_socket(SocketType::Pub), Overflow::Drop);
    }
}
