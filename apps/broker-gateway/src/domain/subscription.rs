//! Subscription Tracking
//!
//! The live subscription set is the single source of truth for what the
//! streaming connection should be delivering. The full set is replayed to the
//! endpoint on every (re)connect: the replay set must equal the
//! pre-disconnect live set exactly.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Channels deliverable over the streaming connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamChannel {
    /// Per-symbol price ticks.
    MarketTick,
    /// Order book depth updates.
    OrderBook,
    /// Executed trades.
    Trade,
    /// Lifecycle updates for the user's own orders.
    OrderUpdate,
    /// Portfolio and position deltas.
    PortfolioUpdate,
}

impl StreamChannel {
    /// Stable wire name for the channel.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MarketTick => "tick",
            Self::OrderBook => "orderbook",
            Self::Trade => "trade",
            Self::OrderUpdate => "order_update",
            Self::PortfolioUpdate => "portfolio_update",
        }
    }
}

/// A single live subscription: a channel keyed by symbol or user identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Subscribed channel.
    pub channel: StreamChannel,
    /// Symbol (market channels) or user identifier (order/portfolio channels).
    pub key: String,
    /// Last endpoint confirmation, if any.
    pub last_confirmed_at: Option<DateTime<Utc>>,
}

impl Subscription {
    /// Create an unconfirmed subscription.
    #[must_use]
    pub fn new(channel: StreamChannel, key: impl Into<String>) -> Self {
        Self {
            channel,
            key: key.into(),
            last_confirmed_at: None,
        }
    }
}

/// The live set of subscriptions, deduplicated by (channel, key).
///
/// Ordered so the replay sequence is deterministic.
#[derive(Debug, Default, Clone)]
pub struct SubscriptionSet {
    entries: BTreeMap<(StreamChannel, String), Subscription>,
}

impl SubscriptionSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscription. Returns false if it was already present.
    pub fn insert(&mut self, channel: StreamChannel, key: impl Into<String>) -> bool {
        let key = key.into();
        let map_key = (channel, key.clone());
        if self.entries.contains_key(&map_key) {
            return false;
        }
        self.entries.insert(map_key, Subscription::new(channel, key));
        true
    }

    /// Remove a subscription. Returns false if it was not present.
    pub fn remove(&mut self, channel: StreamChannel, key: &str) -> bool {
        self.entries.remove(&(channel, key.to_string())).is_some()
    }

    /// Record an endpoint confirmation for a subscription.
    pub fn confirm(&mut self, channel: StreamChannel, key: &str, at: DateTime<Utc>) {
        if let Some(sub) = self.entries.get_mut(&(channel, key.to_string())) {
            sub.last_confirmed_at = Some(at);
        }
    }

    /// Whether a subscription is live.
    #[must_use]
    pub fn contains(&self, channel: StreamChannel, key: &str) -> bool {
        self.entries.contains_key(&(channel, key.to_string()))
    }

    /// The exact replay set for resynchronization after a reconnect.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Subscription> {
        self.entries.values().cloned().collect()
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
