//! SUB-side subscription set and the upstream subscription wire format.
//!
//! The set is a sorted prefix table with reference counts:
//! - subscribe/unsubscribe: O(log N) search + O(N) shift on first insert / last removal
//! - `matches`: forward scan with early exit once a prefix sorts after the topic
//!
//! Subscriptions are counted like libzmq: subscribing to the same prefix
//! twice needs two unsubscribes before the prefix stops matching.

use crate::message::Message;
use bytes::Bytes;

#[derive(Debug, Clone)]
struct Entry {
    prefix: Bytes,
    count: usize,
}

/// Topic prefixes a SUB socket is interested in.
///
/// An empty set matches nothing; the empty prefix matches everything.
#[derive(Debug, Default, Clone)]
pub struct SubscriptionSet {
    entries: Vec<Entry>,
}

impl SubscriptionSet {
    /// Create a new empty subscription set
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add a subscription.
    ///
    /// Returns `true` if the prefix was not subscribed before, i.e. the change
    /// must be propagated upstream.
    pub fn subscribe(&mut self, prefix: Bytes) -> bool {
        match self.entries.binary_search_by(|e| e.prefix.cmp(&prefix)) {
            Ok(idx) => {
                self.entries[idx].count += 1;
                false
            }
            Err(idx) => {
                self.entries.insert(idx, Entry { prefix, count: 1 });
                true
            }
        }
    }

    /// Remove one subscription to `prefix`.
    ///
    /// Returns `true` if the prefix is no longer subscribed at all.
    /// Unknown prefixes are ignored.
    pub fn unsubscribe(&mut self, prefix: &[u8]) -> bool {
        match self.entries.binary_search_by(|e| e.prefix.as_ref().cmp(prefix)) {
            Ok(idx) => {
                let entry = &mut self.entries[idx];
                entry.count -= 1;
                if entry.count == 0 {
                    self.entries.remove(idx);
                    true
                } else {
                    false
                }
            }
            Err(_) => false,
        }
    }

    /// Check if a payload matches any subscription.
    #[must_use]
    pub fn matches(&self, topic: &[u8]) -> bool {
        for entry in &self.entries {
            let p = entry.prefix.as_ref();

            // If prefix > topic, it cannot be a prefix of topic (nor can any later one).
            if p > topic {
                break;
            }

            if topic.starts_with(p) {
                return true;
            }
        }
        false
    }

    /// Distinct subscribed prefixes, in sorted order.
    pub fn prefixes(&self) -> impl Iterator<Item = &Bytes> {
        self.entries.iter().map(|e| &e.prefix)
    }

    /// Check if there are no subscriptions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct prefixes
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Subscription change travelling from SUB to PUB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionEvent {
    /// A peer subscribed to a topic prefix
    Subscribe(Bytes),
    /// A peer unsubscribed from a topic prefix
    Unsubscribe(Bytes),
}

impl SubscriptionEvent {
    /// Decode a subscription message.
    ///
    /// Format (ZMTP 3.0): `[0x01|0x00] [topic prefix...]`
    #[must_use]
    pub fn from_message(msg: &Message) -> Option<Self> {
        let (&cmd, prefix) = msg.as_bytes().split_first()?;
        let prefix = msg.payload().slice(1..1 + prefix.len());
        match cmd {
            0x01 => Some(Self::Subscribe(prefix)),
            0x00 => Some(Self::Unsubscribe(prefix)),
            _ => None,
        }
    }

    /// Encode this event as a subscription message
    #[must_use]
    pub fn to_message(&self) -> Message {
        let (cmd, prefix) = match self {
            Self::Subscribe(p) => (0x01u8, p),
            Self::Unsubscribe(p) => (0x00u8, p),
        };

        let mut msg = Vec::with_capacity(1 + prefix.len());
        msg.push(cmd);
        msg.extend_from_slice(prefix);
        Message::from(msg)
    }

    /// Get the topic prefix
    #[must_use]
    pub const fn prefix(&self) -> &Bytes {
        match self {
            Self::Subscribe(p) | Self::Unsubscribe(p) => p,
        }
    }
}
