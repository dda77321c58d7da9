//! The sync engine: collect, transmit, reconcile.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use sync_core::cycle::{CycleAction, CycleEvent, CycleState, StatusKind};
use sync_store::{RecordStore, StoreError};
use sync_types::{
    ChangeEntry, CollectionId, Operation, PushRequest, PushResponse, SyncCursor, SyncId,
};
use tokio::sync::watch;

use crate::transport::{SyncTransport, TransportError};

/// Errors inside a sync cycle.
///
/// Never propagated to a caller - cycles are self-triggered, so a failure
/// only feeds the state machine and the user-visible status.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The local store faulted.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The push never completed or came back unusable.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// A user-visible status message, published on every cycle step that has
/// something to say.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    /// Severity of the message.
    pub kind: StatusKind,
    /// The message text.
    pub text: String,
}

/// How a triggered cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The batch was pushed and acknowledged records marked synced.
    Completed {
        /// Number of records marked synced.
        synced: usize,
    },
    /// No pending records existed; nothing was transmitted.
    NothingPending,
    /// The cycle aborted; every record is still pending.
    Failed {
        /// Why the cycle aborted.
        reason: String,
    },
    /// A cycle was already in flight; this trigger was ignored.
    Coalesced,
}

/// The sync engine.
///
/// Owns nothing but the composition: reads pending records from the store,
/// pushes them through the transport, and writes acknowledgements back.
/// Records themselves stay the store's property - the engine only ever
/// flips `sync_status` and never deletes.
pub struct SyncEngine<S, T> {
    store: Arc<S>,
    transport: T,
    collections: Vec<CollectionId>,
    // At-most-one concurrent cycle per context. Deliberately not durable:
    // a reload loses it, and overlap from a prior context is tolerated
    // because reconciliation is idempotent.
    in_flight: tokio::sync::Mutex<()>,
    status_tx: watch::Sender<StatusMessage>,
}

impl<S: RecordStore, T: SyncTransport> SyncEngine<S, T> {
    /// Create an engine over the given store, transport and collections.
    pub fn new(store: Arc<S>, transport: T, collections: Vec<CollectionId>) -> Self {
        let (status_tx, _) = watch::channel(StatusMessage {
            kind: StatusKind::Info,
            text: "idle".to_string(),
        });
        Self {
            store,
            transport,
            collections,
            in_flight: tokio::sync::Mutex::new(()),
            status_tx,
        }
    }

    /// Subscribe to user-visible status messages.
    pub fn subscribe_status(&self) -> watch::Receiver<StatusMessage> {
        self.status_tx.subscribe()
    }

    /// Publish the offline status (connectivity lost).
    pub fn note_offline(&self) {
        self.publish(StatusKind::Warning, "working offline".to_string());
    }

    /// Run one sync cycle, coalescing with any cycle already in flight.
    ///
    /// Drives the pure cycle machine from sync-core, executing its actions
    /// against the store and transport and feeding the results back as
    /// events until the machine comes to rest.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let _guard = match self.in_flight.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::debug!("sync cycle already running, trigger coalesced");
                return CycleOutcome::Coalesced;
            }
        };

        let mut state = CycleState::new();
        let mut events: VecDeque<CycleEvent> = VecDeque::from([CycleEvent::TriggerFired]);

        let mut batch: Vec<ChangeEntry> = Vec::new();
        let mut collection_of: HashMap<SyncId, CollectionId> = HashMap::new();
        let mut cursor: Option<SyncCursor> = None;
        let mut outcome = CycleOutcome::NothingPending;

        while let Some(event) = events.pop_front() {
            let (next, actions) = state.on_event(event);
            state = next;

            for action in actions {
                match action {
                    CycleAction::Collect => match self.collect().await {
                        Ok((entries, _)) if entries.is_empty() => {
                            outcome = CycleOutcome::NothingPending;
                            events.push_back(CycleEvent::NothingPending);
                        }
                        Ok((entries, by_id)) => {
                            let changes = entries.len();
                            batch = entries;
                            collection_of = by_id;
                            events.push_back(CycleEvent::Collected { changes });
                        }
                        Err(e) => events.push_back(CycleEvent::StepFailed {
                            error: e.to_string(),
                        }),
                    },

                    CycleAction::Transmit => match self.transmit(&batch).await {
                        Ok(response) if response.is_success() => {
                            cursor = Some(response.cursor());
                            let processed = response
                                .processed_changes
                                .iter()
                                .map(|p| p.data.sync_id)
                                .collect();
                            events.push_back(CycleEvent::TransmitAccepted { processed });
                        }
                        Ok(response) => events.push_back(CycleEvent::TransmitRejected {
                            reason: format!("server status \"{}\"", response.status),
                        }),
                        Err(e) => events.push_back(CycleEvent::StepFailed {
                            error: e.to_string(),
                        }),
                    },

                    CycleAction::Reconcile { processed } => {
                        match self.reconcile(&processed, &collection_of, cursor.as_ref()).await {
                            Ok(marked) => {
                                outcome = CycleOutcome::Completed { synced: marked };
                                events.push_back(CycleEvent::Reconciled { marked });
                            }
                            Err(e) => events.push_back(CycleEvent::StepFailed {
                                error: e.to_string(),
                            }),
                        }
                    }

                    CycleAction::EmitStatus(kind, text) => self.publish(kind, text),
                }
            }
        }

        if let CycleState::Failed { reason } = state {
            outcome = CycleOutcome::Failed { reason };
        }
        outcome
    }

    /// Gather pending records from every configured collection.
    async fn collect(
        &self,
    ) -> Result<(Vec<ChangeEntry>, HashMap<SyncId, CollectionId>), EngineError> {
        let mut entries = Vec::new();
        let mut by_id = HashMap::new();

        for &collection in &self.collections {
            for record in self.store.get_pending(collection).await? {
                by_id.insert(record.sync_id, collection);
                entries.push(ChangeEntry {
                    model: collection.model_name().to_string(),
                    operation: Operation::Create,
                    data: record,
                });
            }
        }

        Ok((entries, by_id))
    }

    /// Send the batch in one request.
    async fn transmit(&self, batch: &[ChangeEntry]) -> Result<PushResponse, EngineError> {
        let request = PushRequest {
            device_id: self.store.device_id(),
            changes: batch.to_vec(),
            last_sync: self.store.load_cursor().await?,
        };

        Ok(self.transport.push(&request).await?)
    }

    /// Mark every acknowledged record synced, then persist the cursor.
    async fn reconcile(
        &self,
        processed: &[SyncId],
        collection_of: &HashMap<SyncId, CollectionId>,
        cursor: Option<&SyncCursor>,
    ) -> Result<usize, EngineError> {
        let mut marked = 0;
        for sync_id in processed {
            match collection_of.get(sync_id) {
                Some(&collection) => {
                    self.store.mark_synced(collection, sync_id).await?;
                    marked += 1;
                }
                None => {
                    tracing::warn!("server acknowledged unknown record {}", sync_id);
                }
            }
        }

        if let Some(cursor) = cursor {
            self.store.store_cursor(cursor).await?;
        }

        Ok(marked)
    }

    fn publish(&self, kind: StatusKind, text: String) {
        match kind {
            StatusKind::Error => tracing::error!("{}", text),
            StatusKind::Warning => tracing::warn!("{}", text),
            _ => tracing::info!("{}", text),
        }
        self.status_tx.send_replace(StatusMessage { kind, text });
    }
}
