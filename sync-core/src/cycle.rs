//! Sync-cycle state machine for offsync.
//!
//! This module provides a pure, side-effect-free state machine for one sync
//! cycle: collect pending records, transmit them as a batch, reconcile the
//! server's acknowledgement. The machine takes events as input and produces
//! a new state plus a list of actions to execute.
//!
//! The actual I/O (reading the store, POSTing the batch, marking records
//! synced) is performed by sync-engine, not by this module. This enables
//! instant unit testing without store or network mocks.

use sync_types::SyncId;

/// Sync-cycle state machine - NO I/O, just state transitions.
///
/// A cycle runs `Idle → Collecting → Transmitting → Reconciling → Idle`.
/// Any step's failure lands in `Failed`, which behaves like `Idle` for the
/// next trigger: nothing about a failed cycle is persisted, the pending
/// records simply ride along in the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleState {
    /// No cycle in flight.
    Idle,
    /// Gathering pending records from the store.
    Collecting,
    /// Batch handed to the transport.
    Transmitting {
        /// Number of change-set entries in the batch.
        count: usize,
    },
    /// Marking acknowledged records synced and persisting the cursor.
    Reconciling {
        /// Number of entries the server acknowledged.
        count: usize,
    },
    /// Last cycle aborted; waiting for the next trigger.
    Failed {
        /// Why the cycle aborted.
        reason: String,
    },
}

impl CycleState {
    /// Create a new state machine, idle.
    pub fn new() -> Self {
        Self::Idle
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller (sync-engine)
    /// is responsible for executing the returned actions.
    pub fn on_event(self, event: CycleEvent) -> (Self, Vec<CycleAction>) {
        match (self, event) {
            // A trigger starts a cycle from rest. Failed counts as rest:
            // nothing of the aborted cycle survives beyond what the store
            // already committed.
            (Self::Idle, CycleEvent::TriggerFired)
            | (Self::Failed { .. }, CycleEvent::TriggerFired) => {
                (Self::Collecting, vec![CycleAction::Collect])
            }

            // From Collecting
            (Self::Collecting, CycleEvent::NothingPending) => (
                Self::Idle,
                vec![CycleAction::EmitStatus(
                    StatusKind::Info,
                    "no pending items to sync".into(),
                )],
            ),
            (Self::Collecting, CycleEvent::Collected { changes }) => (
                Self::Transmitting { count: changes },
                vec![
                    CycleAction::EmitStatus(
                        StatusKind::Info,
                        format!("syncing {} items", changes),
                    ),
                    CycleAction::Transmit,
                ],
            ),

            // From Transmitting
            (Self::Transmitting { .. }, CycleEvent::TransmitAccepted { processed }) => {
                let count = processed.len();
                (
                    Self::Reconciling { count },
                    vec![CycleAction::Reconcile { processed }],
                )
            }
            (Self::Transmitting { .. }, CycleEvent::TransmitRejected { reason }) => (
                Self::Failed {
                    reason: reason.clone(),
                },
                vec![CycleAction::EmitStatus(
                    StatusKind::Error,
                    format!("sync failed: {}", reason),
                )],
            ),

            // From Reconciling
            (Self::Reconciling { .. }, CycleEvent::Reconciled { marked }) => (
                Self::Idle,
                vec![CycleAction::EmitStatus(
                    StatusKind::Success,
                    format!("synced {} items", marked),
                )],
            ),

            // Any step can fail; the cycle aborts with pending records
            // untouched.
            (_, CycleEvent::StepFailed { error }) => (
                Self::Failed {
                    reason: error.clone(),
                },
                vec![CycleAction::EmitStatus(
                    StatusKind::Error,
                    format!("sync failed: {}", error),
                )],
            ),

            // Triggers while a cycle is running are coalesced: ignored, not
            // queued. At most one cycle per context.
            (state, CycleEvent::TriggerFired) => (state, vec![]),

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Whether a trigger would start a cycle from this state.
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Idle | Self::Failed { .. })
    }

    /// Whether a cycle is currently in flight.
    pub fn is_running(&self) -> bool {
        !self.can_start()
    }
}

impl Default for CycleState {
    fn default() -> Self {
        Self::new()
    }
}

/// Events that can occur during a sync cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleEvent {
    /// A sync trigger fired (startup, connectivity restored, timer).
    TriggerFired,
    /// Pending records were gathered into a batch.
    Collected {
        /// Number of change-set entries gathered.
        changes: usize,
    },
    /// No pending records exist; the cycle ends early.
    NothingPending,
    /// The server accepted the batch.
    TransmitAccepted {
        /// Ids of the entries the server processed.
        processed: Vec<SyncId>,
    },
    /// The server responded but rejected the batch.
    TransmitRejected {
        /// The rejection reason.
        reason: String,
    },
    /// A step hit a storage or network fault.
    StepFailed {
        /// Description of the fault.
        error: String,
    },
    /// Acknowledged records were marked synced and the cursor persisted.
    Reconciled {
        /// Number of records marked synced.
        marked: usize,
    },
}

/// Actions to be executed by sync-engine.
///
/// These are instructions, not side effects. The engine interprets them and
/// performs the actual store and network I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleAction {
    /// Gather pending records from the store.
    Collect,
    /// Send the collected batch to the server.
    Transmit,
    /// Mark the acknowledged records synced and persist the cursor.
    Reconcile {
        /// Ids the server acknowledged.
        processed: Vec<SyncId>,
    },
    /// Surface a user-visible status message.
    EmitStatus(StatusKind, String),
}

/// Severity of a user-visible status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    /// Progress information.
    Info,
    /// A cycle completed.
    Success,
    /// Degraded but working (e.g. offline).
    Warning,
    /// A cycle aborted.
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<SyncId> {
        (0..n).map(|_| SyncId::new()).collect()
    }

    #[test]
    fn starts_idle() {
        let state = CycleState::new();
        assert!(matches!(state, CycleState::Idle));
        assert!(state.can_start());
    }

    #[test]
    fn trigger_starts_collecting() {
        let (state, actions) = CycleState::Idle.on_event(CycleEvent::TriggerFired);

        assert!(matches!(state, CycleState::Collecting));
        assert_eq!(actions, vec![CycleAction::Collect]);
    }

    #[test]
    fn nothing_pending_ends_cycle() {
        let (state, actions) = CycleState::Collecting.on_event(CycleEvent::NothingPending);

        assert!(matches!(state, CycleState::Idle));
        assert!(actions
            .iter()
            .any(|a| matches!(a, CycleAction::EmitStatus(StatusKind::Info, _))));
    }

    #[test]
    fn collected_moves_to_transmitting() {
        let (state, actions) =
            CycleState::Collecting.on_event(CycleEvent::Collected { changes: 3 });

        assert_eq!(state, CycleState::Transmitting { count: 3 });
        assert!(actions.iter().any(|a| matches!(a, CycleAction::Transmit)));
        assert!(actions.iter().any(
            |a| matches!(a, CycleAction::EmitStatus(StatusKind::Info, msg) if msg.contains('3'))
        ));
    }

    #[test]
    fn accepted_batch_moves_to_reconciling() {
        let processed = ids(2);
        let (state, actions) = CycleState::Transmitting { count: 2 }
            .on_event(CycleEvent::TransmitAccepted {
                processed: processed.clone(),
            });

        assert_eq!(state, CycleState::Reconciling { count: 2 });
        assert_eq!(actions, vec![CycleAction::Reconcile { processed }]);
    }

    #[test]
    fn reconciled_returns_to_idle_with_success_status() {
        let (state, actions) =
            CycleState::Reconciling { count: 2 }.on_event(CycleEvent::Reconciled { marked: 2 });

        assert!(matches!(state, CycleState::Idle));
        assert!(actions.iter().any(
            |a| matches!(a, CycleAction::EmitStatus(StatusKind::Success, msg) if msg.contains('2'))
        ));
    }

    #[test]
    fn rejection_fails_the_cycle() {
        let (state, actions) = CycleState::Transmitting { count: 1 }
            .on_event(CycleEvent::TransmitRejected {
                reason: "server said no".into(),
            });

        assert!(matches!(state, CycleState::Failed { .. }));
        assert!(actions
            .iter()
            .any(|a| matches!(a, CycleAction::EmitStatus(StatusKind::Error, _))));
    }

    #[test]
    fn step_failure_aborts_from_any_state() {
        for state in [
            CycleState::Collecting,
            CycleState::Transmitting { count: 1 },
            CycleState::Reconciling { count: 1 },
        ] {
            let (next, actions) = state.on_event(CycleEvent::StepFailed {
                error: "network unreachable".into(),
            });
            assert!(matches!(next, CycleState::Failed { .. }));
            assert!(actions
                .iter()
                .any(|a| matches!(a, CycleAction::EmitStatus(StatusKind::Error, _))));
        }
    }

    #[test]
    fn failed_state_accepts_the_next_trigger() {
        let failed = CycleState::Failed {
            reason: "timeout".into(),
        };
        assert!(failed.can_start());

        let (state, actions) = failed.on_event(CycleEvent::TriggerFired);
        assert!(matches!(state, CycleState::Collecting));
        assert_eq!(actions, vec![CycleAction::Collect]);
    }

    #[test]
    fn triggers_are_coalesced_while_running() {
        // Back-to-back triggers must not start a second cycle.
        for state in [
            CycleState::Collecting,
            CycleState::Transmitting { count: 1 },
            CycleState::Reconciling { count: 1 },
        ] {
            assert!(state.is_running());
            let (next, actions) = state.clone().on_event(CycleEvent::TriggerFired);
            assert_eq!(next, state);
            assert!(actions.is_empty());
        }
    }

    #[test]
    fn full_cycle_walkthrough() {
        let processed = ids(2);

        let (state, _) = CycleState::new().on_event(CycleEvent::TriggerFired);
        let (state, _) = state.on_event(CycleEvent::Collected { changes: 2 });
        let (state, actions) = state.on_event(CycleEvent::TransmitAccepted {
            processed: processed.clone(),
        });
        assert_eq!(actions, vec![CycleAction::Reconcile { processed }]);

        let (state, _) = state.on_event(CycleEvent::Reconciled { marked: 2 });
        assert!(matches!(state, CycleState::Idle));
    }

    #[test]
    fn irrelevant_events_are_ignored() {
        let (state, actions) = CycleState::Idle.on_event(CycleEvent::Reconciled { marked: 5 });
        assert!(matches!(state, CycleState::Idle));
        assert!(actions.is_empty());
    }
}
