//! Topic-scoped realtime status channel.
//!
//! Executors publish `{nodeId, status}` events to a `(channel, topic)` pair.
//! Observers first obtain a [`SubscriptionToken`] for one exact pair and then
//! [`attach`](StatusChannel::attach) with it to receive that pair's events
//! only. There is no wildcard subscription.
//!
//! Publishing is fire-and-forget: events for a pair nobody listens to are
//! dropped, and nothing is buffered for subscribers that attach later.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, trace};
use uuid::Uuid;

use nodes::{StatusEvent, StatusPublisher};

/// Tuning knobs for the status channel.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// How long a subscription token can be used to attach.
    pub token_ttl: Duration,
    /// Events buffered per `(channel, topic)` for slow subscribers.
    pub channel_capacity: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            token_ttl: Duration::from_secs(60 * 60),
            channel_capacity: 256,
        }
    }
}

/// Opaque credential scoped to one `(channel, topic)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionToken {
    pub token: String,
    pub channel: String,
    pub topic: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatusError {
    #[error("unknown subscription token")]
    UnknownToken,

    #[error("subscription token expired")]
    Expired,
}

type Scope = (String, String);

#[derive(Debug, Clone)]
struct Grant {
    scope: Scope,
    expires_at: DateTime<Utc>,
}

/// A live subscription to one `(channel, topic)` pair.
#[derive(Debug)]
pub struct Subscription {
    pub channel: String,
    pub topic: String,
    rx: broadcast::Receiver<StatusEvent>,
}

impl Subscription {
    /// Next event, or `None` once the channel is gone.
    ///
    /// A subscriber that falls behind skips the events it missed.
    pub async fn recv(&mut self) -> Option<StatusEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(channel = %self.channel, skipped, "status subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<StatusEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    /// The underlying receiver, for adapting into a stream.
    pub fn into_receiver(self) -> broadcast::Receiver<StatusEvent> {
        self.rx
    }
}

/// In-process pub/sub hub for node status events.
#[derive(Debug, Default)]
pub struct StatusChannel {
    config: RealtimeConfig,
    senders: RwLock<HashMap<Scope, broadcast::Sender<StatusEvent>>>,
    grants: RwLock<HashMap<String, Grant>>,
}

impl StatusChannel {
    pub fn new(config: RealtimeConfig) -> Self {
        Self {
            config,
            senders: RwLock::default(),
            grants: RwLock::default(),
        }
    }

    /// Issue a token scoped to exactly `(channel, topic)`.
    pub fn subscribe(&self, channel: &str, topic: &str) -> SubscriptionToken {
        self.prune();

        let ttl = chrono::Duration::from_std(self.config.token_ttl)
            .unwrap_or_else(|_| chrono::Duration::hours(1));
        let expires_at = Utc::now() + ttl;
        let token = Uuid::new_v4().simple().to_string();

        self.grants
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                token.clone(),
                Grant {
                    scope: (channel.to_owned(), topic.to_owned()),
                    expires_at,
                },
            );

        debug!(channel, topic, "issued status subscription token");

        SubscriptionToken {
            token,
            channel: channel.to_owned(),
            topic: topic.to_owned(),
            expires_at,
        }
    }

    /// Start receiving events for the scope `token` was issued for.
    ///
    /// # Errors
    /// [`StatusError::UnknownToken`] or [`StatusError::Expired`].
    pub fn attach(&self, token: &str) -> Result<Subscription, StatusError> {
        let grant = self
            .grants
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(token)
            .cloned()
            .ok_or(StatusError::UnknownToken)?;

        if grant.expires_at <= Utc::now() {
            self.revoke(token);
            return Err(StatusError::Expired);
        }

        let rx = self
            .senders
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(grant.scope.clone())
            .or_insert_with(|| broadcast::channel(self.config.channel_capacity.max(1)).0)
            .subscribe();

        let (channel, topic) = grant.scope;
        Ok(Subscription { channel, topic, rx })
    }

    /// Invalidate a token. Existing subscriptions keep receiving.
    pub fn revoke(&self, token: &str) {
        self.grants
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(token);
    }

    /// Publish to every subscription on `(channel, topic)`.
    pub fn publish(&self, channel: &str, topic: &str, event: StatusEvent) {
        let senders = self.senders.read().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = senders.get(&(channel.to_owned(), topic.to_owned())) else {
            trace!(channel, topic, "no subscribers; dropping status event");
            return;
        };
        // Err only means nobody is currently attached.
        let _ = tx.send(event);
    }

    /// Drop expired tokens and channels nobody listens to any more.
    fn prune(&self) {
        let now = Utc::now();
        self.grants
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|_, g| g.expires_at > now);
        self.senders
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|_, tx| tx.receiver_count() > 0);
    }
}

impl StatusPublisher for StatusChannel {
    fn publish(&self, channel: &str, topic: &str, event: StatusEvent) {
        StatusChannel::publish(self, channel, topic, event);
    }
}
