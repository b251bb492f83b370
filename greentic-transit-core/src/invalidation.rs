//! Inbound change notifications from replication or other cluster members.

use crate::manager::LockManager;
use crate::storage::POLICY_PREFIX;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Policy name carried by a changed storage key, if the key names a policy.
pub fn policy_name_from_key(key: &str) -> Option<&str> {
    key.strip_prefix(POLICY_PREFIX)
        .filter(|name| !name.is_empty())
}

/// Evict the policy addressed by `key`. Returns whether the key named a policy.
pub async fn handle_invalidation(manager: &LockManager, key: &str) -> bool {
    debug!(key = %key, "invalidating key");
    match policy_name_from_key(key) {
        Some(name) => {
            manager.invalidate(name).await;
            true
        }
        None => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalidation channel closed")]
pub struct ChannelClosed;

/// Producer half of an [`InvalidationChannel`].
#[derive(Clone, Debug)]
pub struct InvalidationSender {
    tx: mpsc::UnboundedSender<String>,
}

impl InvalidationSender {
    /// Queue a changed storage key.
    pub fn notify(&self, key: impl Into<String>) -> Result<(), ChannelClosed> {
        self.tx.send(key.into()).map_err(|_| ChannelClosed)
    }
}

/// Applies notifications one at a time in delivery order.
pub struct InvalidationChannel;

impl InvalidationChannel {
    /// Start the consumer task. It runs until every sender has been dropped.
    pub fn spawn(manager: Arc<LockManager>) -> (InvalidationSender, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let handle = tokio::spawn(async move {
            while let Some(key) = rx.recv().await {
                handle_invalidation(&manager, &key).await;
            }
            debug!("invalidation channel drained");
        });
        (InvalidationSender { tx }, handle)
    }
}

#[cfg(feature = "nats")]
pub use self::nats::{InvalidationMessage, spawn_nats_listener};

#[cfg(feature = "nats")]
mod nats {
    use super::InvalidationSender;
    use futures::StreamExt;
    use serde::{Deserialize, Serialize};
    use tokio::task::JoinHandle;
    use tracing::{info, warn};

    /// Payload published on the invalidation subject.
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct InvalidationMessage {
        pub keys: Vec<String>,
    }

    /// Forward NATS invalidation messages on `subject` into `sender`.
    pub fn spawn_nats_listener(
        url: String,
        subject: String,
        sender: InvalidationSender,
    ) -> JoinHandle<anyhow::Result<()>> {
        tokio::spawn(async move {
            let client = async_nats::connect(&url).await?;
            let mut sub = client.subscribe(subject.clone()).await?;
            info!(nats_url = %url, %subject, "listening for policy invalidations");
            while let Some(msg) = sub.next().await {
                match serde_json::from_slice::<InvalidationMessage>(&msg.payload) {
                    Ok(payload) => {
                        for key in payload.keys {
                            if sender.notify(key).is_err() {
                                return Ok(());
                            }
                        }
                    }
                    Err(err) => {
                        warn!(subject = %msg.subject, error = %err, "ignoring malformed invalidation");
                    }
                }
            }
            Ok(())
        })
    }
}
