use meter_client::domain::{AccountIdentity, AccountKey};
use serde::Serialize;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

/// Account lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AccountEvent {
    AccountReady {
        account_key: AccountKey,
        identity: AccountIdentity,
    },
    AccountCleared {
        account_key: AccountKey,
    },
}

impl AccountEvent {
    pub fn account_key(&self) -> &AccountKey {
        match self {
            Self::AccountReady { account_key, .. } | Self::AccountCleared { account_key } => account_key,
        }
    }
}

/// Explicit publish/subscribe channel for [`AccountEvent`]s.
///
/// Listeners subscribe when they are built and stop listening by dropping
/// their receiver.
#[derive(Clone)]
pub struct AccountEvents {
    tx: broadcast::Sender<AccountEvent>,
}

impl Default for AccountEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AccountEvent> {
        self.tx.subscribe()
    }

    /// Returns how many listeners got the event.
    pub fn publish(&self, event: AccountEvent) -> usize {
        tracing::debug!(account = %event.account_key(), ?event, "publishing account event");
        self.tx.send(event).unwrap_or(0)
    }
}
