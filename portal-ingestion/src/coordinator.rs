use std::sync::Arc;

use meter_client::{
    db::{ReadingRepository, StoreError},
    domain::{AccountIdentity, AccountKey, InvalidAccountKey, MeterReading},
};

use crate::{
    backfill::BackfillOrchestrator,
    config::PortalConfig,
    events::{AccountEvent, AccountEvents},
    portal::{CustomerProfile, PortalError, PortalSession},
};

#[derive(thiserror::Error, Debug)]
pub enum ConnectError {
    #[error(transparent)]
    Portal(#[from] PortalError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    InvalidAccount(#[from] InvalidAccountKey),
}

impl ConnectError {
    /// Wrong username or password, as opposed to anything going wrong.
    pub fn is_credentials(&self) -> bool {
        matches!(self, Self::Portal(PortalError::Credentials))
    }
}

/// Result of a successful [`AccountCoordinator::connect`].
pub struct ConnectedAccount {
    pub key: AccountKey,
    pub identity: AccountIdentity,
    pub profile: CustomerProfile,
    /// Today's readings so far. Not stored: the day is still incomplete.
    pub today: Vec<MeterReading>,
    pub backfill_started: bool,
}

/// Drives the login sequence and owns what happens around it.
pub struct AccountCoordinator {
    portal: PortalConfig,
    repository: ReadingRepository,
    backfill: Arc<BackfillOrchestrator>,
    events: AccountEvents,
}

impl AccountCoordinator {
    pub fn new(
        portal: PortalConfig,
        repository: ReadingRepository,
        backfill: Arc<BackfillOrchestrator>,
        events: AccountEvents,
    ) -> Self {
        Self {
            portal,
            repository,
            backfill,
            events,
        }
    }

    pub fn repository(&self) -> &ReadingRepository {
        &self.repository
    }

    pub fn backfill(&self) -> &Arc<BackfillOrchestrator> {
        &self.backfill
    }

    pub fn events(&self) -> &AccountEvents {
        &self.events
    }

    /// Try the credentials on a throwaway session.
    pub async fn validate_credentials(&self, username: &str, password: &str) -> Result<bool, PortalError> {
        let mut session = PortalSession::new(&self.portal)?;
        session.login(username, password).await
    }

    /// Log in, resolve the account and start its background backfill.
    ///
    /// The account key is derived from `username`. Any failure aborts the
    /// sequence; rejected credentials come back as [`PortalError::Credentials`].
    #[tracing::instrument(skip(self, password), fields(account = tracing::field::Empty))]
    pub async fn connect(&self, username: &str, password: &str) -> Result<ConnectedAccount, ConnectError> {
        let key = AccountKey::new(username)?;
        tracing::Span::current().record("account", tracing::field::display(&key));

        let mut session = PortalSession::new(&self.portal)?;
        if !session.login(username, password).await? {
            return Err(PortalError::Credentials.into());
        }

        session.resolve_identity().await?;
        let identity = session.select_meter().await?;
        let profile = session.customer_profile().await?;

        let today = session.fetch_daily_readings(self.repository.today()).await?;
        tracing::info!(readings = today.len(), "fetched today's readings");

        self.events.publish(AccountEvent::AccountReady {
            account_key: key.clone(),
            identity: identity.clone(),
        });

        let backfill_started = self.backfill.trigger(&key, Arc::new(session));

        Ok(ConnectedAccount {
            key,
            identity,
            profile,
            today,
            backfill_started,
        })
    }

    /// Stop the account's backfill and announce the logout.
    ///
    /// With `wipe`, waits for the backfill to stop and then deletes every stored
    /// reading of the account. Returns the number of deleted readings.
    pub async fn logout(&self, key: &AccountKey, wipe: bool) -> Result<u64, StoreError> {
        self.backfill.cancel(key);

        let mut deleted = 0;
        if wipe {
            self.backfill.wait(key).await;
            deleted = self.repository.delete_all_for_account(key).await?;
            tracing::info!(account = %key, deleted, "account readings wiped");
        }
        self.backfill.forget(key);

        self.events.publish(AccountEvent::AccountCleared {
            account_key: key.clone(),
        });
        Ok(deleted)
    }
}
