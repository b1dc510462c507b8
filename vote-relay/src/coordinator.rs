//! Vote pipeline and fan-out.
//!
//! Every accepted vote runs insert, recompute and broadcast while holding
//! its poll's lock, so updates for one poll leave the relay in commit order
//! and a later tally can never be overtaken by an older one. Votes on
//! different polls take different locks and run side by side.
//!
//! The pipeline runs on its own task: once a vote is accepted it finishes
//! and broadcasts even if the connection that sent it has already gone.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::{
    sync::{Mutex, MutexGuard},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    catalog::Catalog,
    error::RelayError,
    message::{ClientMessage, ServerMessage, decode_client_message},
    registry::{ConnectionId, ConnectionRegistry, DEFAULT_OUTBOX_CAPACITY},
    store::{BoundedStore, VoteRecord, VoteStore},
    tally::{DEFAULT_FIND_LIMIT, Tally, TallyEngine},
    validator::{ValidationError, validate},
};

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Maximum vote records read when tallying one poll.
    pub find_limit: usize,
    /// Deadline for each store call.
    pub store_timeout: Duration,
    /// Frames queued per connection before further frames to it are dropped.
    pub outbox_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            find_limit: DEFAULT_FIND_LIMIT,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
        }
    }
}

pub struct Coordinator {
    catalog: Catalog,
    store: Arc<dyn VoteStore>,
    tallies: TallyEngine,
    registry: Arc<ConnectionRegistry>,
    poll_locks: HashMap<String, Mutex<()>>,
}

impl Coordinator {
    pub fn new(catalog: Catalog, store: Arc<dyn VoteStore>, config: RelayConfig) -> Self {
        let store: Arc<dyn VoteStore> = Arc::new(BoundedStore::new(store, config.store_timeout));
        let tallies = TallyEngine::new(Arc::clone(&store), catalog.clone(), config.find_limit);
        // One lock per catalog poll; the table itself is read-only after this.
        let poll_locks = catalog
            .poll_ids()
            .map(|poll_id| (poll_id.to_string(), Mutex::new(())))
            .collect();

        Self {
            catalog,
            store,
            tallies,
            registry: Arc::new(ConnectionRegistry::with_capacity(config.outbox_capacity)),
            poll_locks,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn tallies(&self) -> &TallyEngine {
        &self.tallies
    }

    /// Queues one `update` per poll, in catalog order, for a connection that
    /// just opened. Failures are logged and skipped; the connection stays up.
    ///
    /// Each poll is tallied under its lock so the snapshot lands in the
    /// connection's queue in order with that poll's broadcasts.
    pub async fn sync_connection(&self, connection: ConnectionId) -> usize {
        let mut sent = 0;
        for poll_id in self.catalog.poll_ids() {
            let Some(_guard) = self.lock_poll(poll_id).await else {
                continue;
            };

            match self.tallies.compute_tally(poll_id).await {
                Ok(tally) => {
                    if !self
                        .registry
                        .send_to(connection, ServerMessage::update(poll_id, tally))
                    {
                        debug!(connection, poll = %poll_id, "initial tally not queued");
                        continue;
                    }
                    sent += 1;
                }
                Err(error) => {
                    warn!(connection, poll = %poll_id, %error, "failed to send initial tally");
                }
            }
        }
        sent
    }

    /// Handles one text frame from `origin`.
    ///
    /// Rejections are answered to `origin` right away. An accepted vote is
    /// handed to a detached task whose handle is returned.
    pub fn handle_message(
        self: &Arc<Self>,
        origin: ConnectionId,
        text: &str,
    ) -> Option<JoinHandle<()>> {
        let (poll_id, option_id) = match decode_client_message(text) {
            Ok(ClientMessage::Vote { poll_id, option_id }) => (poll_id, option_id),
            Ok(ClientMessage::Unsupported) => {
                debug!(connection = origin, "ignoring unsupported message");
                return None;
            }
            Err(error) => {
                self.reject(origin, &error);
                return None;
            }
        };

        if let Err(error) = validate(&self.catalog, &poll_id, &option_id) {
            self.reject(origin, &error.into());
            return None;
        }

        let coordinator = Arc::clone(self);
        Some(tokio::spawn(async move {
            if let Err(error) = coordinator.cast_vote(&poll_id, &option_id).await {
                warn!(
                    connection = origin,
                    poll = %poll_id,
                    option = %option_id,
                    %error,
                    "vote failed"
                );
                coordinator.reject(origin, &error);
            }
        }))
    }

    /// Records a vote, recomputes its poll and broadcasts the new tally to
    /// every connection. Nothing is broadcast unless both store calls succeed.
    pub async fn cast_vote(&self, poll_id: &str, option_id: &str) -> Result<Tally, RelayError> {
        validate(&self.catalog, poll_id, option_id)?;
        let _guard = self
            .lock_poll(poll_id)
            .await
            .ok_or_else(|| ValidationError::UnknownPoll(poll_id.to_string()))?;

        self.store
            .insert_one(&VoteRecord::now(poll_id, option_id))
            .await?;
        let tally = self.tallies.compute_tally(poll_id).await?;

        let delivered = self
            .registry
            .broadcast(&ServerMessage::update(poll_id, tally.clone()));
        info!(poll = %poll_id, option = %option_id, delivered, ?tally, "vote recorded");

        Ok(tally)
    }

    /// Sends an `error` frame to `origin` only.
    pub fn reject(&self, origin: ConnectionId, error: &RelayError) {
        debug!(connection = origin, %error, "rejecting message");
        if !self
            .registry
            .send_to(origin, ServerMessage::error(error.client_message()))
        {
            debug!(connection = origin, "origin closed before error could be sent");
        }
    }

    async fn lock_poll(&self, poll_id: &str) -> Option<MutexGuard<'_, ()>> {
        match self.poll_locks.get(poll_id) {
            Some(lock) => Some(lock.lock().await),
            None => None,
        }
    }
}
