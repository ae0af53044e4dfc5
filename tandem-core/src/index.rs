//! PUB-side subscription index.
//!
//! A PUB socket learns each peer's subscriptions from the messages the peer
//! sends upstream and keeps them here, keyed by connection. Publishing asks
//! the index which connections want a payload.
//!
//! Layout: one row per distinct prefix, rows sorted by prefix, each row
//! holding the connections subscribed to it. Lookup walks the rows in order
//! and stops at the first prefix that sorts after the payload.

use crate::queue::PipeId;
use crate::subscription::SubscriptionEvent;
use bytes::Bytes;
use smallvec::SmallVec;

/// Peers are identified by the id of their connection.
pub type PeerKey = PipeId;

/// Peers matched for one payload. Inline for the common small fan-out.
pub type Matches = SmallVec<[PeerKey; 16]>;

#[derive(Debug, Clone)]
struct Row {
    prefix: Bytes,
    /// Inline up to 4 peers without heap allocation.
    peers: SmallVec<[PeerKey; 4]>,
}

#[derive(Debug, Default)]
pub struct SubscriptionIndex {
    rows: Vec<Row>,
}

impl SubscriptionIndex {
    #[must_use]
    pub const fn new() -> Self {
        Self { rows: Vec::new() }
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Apply an upstream subscription change from `peer`.
    pub fn apply(&mut self, peer: PeerKey, event: SubscriptionEvent) {
        match event {
            SubscriptionEvent::Subscribe(prefix) => self.subscribe(peer, prefix),
            SubscriptionEvent::Unsubscribe(prefix) => self.unsubscribe(peer, &prefix),
        }
    }

    /// Record that `peer` wants payloads starting with `prefix`.
    pub fn subscribe(&mut self, peer: PeerKey, prefix: Bytes) {
        match self.rows.binary_search_by(|r| r.prefix.cmp(&prefix)) {
            Ok(idx) => {
                let peers = &mut self.rows[idx].peers;
                if !peers.contains(&peer) {
                    peers.push(peer);
                }
            }
            Err(idx) => {
                let mut peers = SmallVec::new();
                peers.push(peer);
                self.rows.insert(idx, Row { prefix, peers });
            }
        }
    }

    /// Forget `peer`'s interest in `prefix`. Rows left without peers are dropped.
    pub fn unsubscribe(&mut self, peer: PeerKey, prefix: &[u8]) {
        if let Ok(idx) = self.rows.binary_search_by(|r| r.prefix.as_ref().cmp(prefix)) {
            let peers = &mut self.rows[idx].peers;
            peers.retain(|p| *p != peer);
            if peers.is_empty() {
                self.rows.remove(idx);
            }
        }
    }

    /// Drop every subscription held by `peer` (connection gone).
    pub fn remove_peer(&mut self, peer: PeerKey) {
        self.rows.retain_mut(|row| {
            row.peers.retain(|p| *p != peer);
            !row.peers.is_empty()
        });
    }

    /// Peers whose subscriptions match `payload`, deduplicated and sorted.
    #[must_use]
    pub fn match_topic(&self, payload: &[u8]) -> Matches {
        let mut out = Matches::new();

        for row in &self.rows {
            let p = row.prefix.as_ref();
            // e.g. prefix="apply" > payload="apple": no later row can match either.
            if p > payload {
                break;
            }
            if payload.starts_with(p) {
                out.extend_from_slice(&row.peers);
            }
        }

        // A peer subscribed to nested prefixes shows up once per row.
        if out.len() > 1 {
            out.sort_unstable();
            out.dedup();
        }
        out
    }
}
