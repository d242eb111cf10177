//! Batched status changes with a one-in-flight-per-scope guard.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::client::{AttendanceBackend, BulkUpdateRequest};
use crate::error::Result;
use crate::models::{AttendanceStatus, Scope};

/// What happened to a `submit` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkOutcome {
    /// Empty selection: nothing sent.
    Noop,
    /// No group selected, so there is nothing to change.
    NoScope,
    /// A mutation for this scope is still running.
    Busy,
    /// One request carrying every id was sent.
    Submitted,
}

/// Completion of a submitted mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkEvent {
    Succeeded {
        scope: Scope,
        target: AttendanceStatus,
        ids: BTreeSet<String>,
    },
    Failed {
        scope: Scope,
        target: AttendanceStatus,
        message: String,
    },
}

struct BulkReply {
    scope: Scope,
    target: AttendanceStatus,
    ids: BTreeSet<String>,
    result: Result<()>,
}

/// Sends bulk status changes and reports their completion.
///
/// Nothing local is updated on success; callers re-fetch the scope and take the
/// server's answer as the truth.
pub struct BulkMutationEngine {
    backend: Arc<dyn AttendanceBackend>,
    runtime: Handle,
    tx: mpsc::UnboundedSender<BulkReply>,
    rx: mpsc::UnboundedReceiver<BulkReply>,
    in_flight: HashSet<Scope>,
}

impl BulkMutationEngine {
    pub fn new(backend: Arc<dyn AttendanceBackend>, runtime: Handle) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            backend,
            runtime,
            tx,
            rx,
            in_flight: HashSet::new(),
        }
    }

    /// Apply `target` to every id in `ids` with a single backend call.
    pub fn submit(&mut self, scope: &Scope, target: AttendanceStatus, ids: &BTreeSet<String>) -> BulkOutcome {
        if ids.is_empty() {
            debug!("bulk {target} on empty selection ignored");
            return BulkOutcome::Noop;
        }

        let Some(key) = scope.key() else {
            debug!("bulk {target} ignored: no group selected");
            return BulkOutcome::NoScope;
        };

        if self.in_flight.contains(scope) {
            debug!("bulk {target} rejected: mutation already running for {scope}");
            return BulkOutcome::Busy;
        }

        info!("setting {} records in {scope} to {target}", ids.len());
        self.in_flight.insert(scope.clone());

        let request = BulkUpdateRequest {
            date: key.date,
            group_id: key.group_id,
            target_status: target,
            ids: ids.iter().cloned().collect(),
        };
        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();
        let scope = scope.clone();
        let ids = ids.clone();
        self.runtime.spawn(async move {
            let result = backend.bulk_update(&request).await;
            let _ = tx.send(BulkReply {
                scope,
                target,
                ids,
                result,
            });
        });

        BulkOutcome::Submitted
    }

    /// Collect finished mutations.
    pub fn poll(&mut self) -> Vec<BulkEvent> {
        let mut events = Vec::new();
        while let Ok(reply) = self.rx.try_recv() {
            events.push(self.finish(reply));
        }
        events
    }

    /// Wait for the next finished mutation.
    pub async fn wait_for_reply(&mut self) -> Option<BulkEvent> {
        let reply = self.rx.recv().await?;
        Some(self.finish(reply))
    }

    fn finish(&mut self, reply: BulkReply) -> BulkEvent {
        self.in_flight.remove(&reply.scope);
        match reply.result {
            Ok(()) => BulkEvent::Succeeded {
                scope: reply.scope,
                target: reply.target,
                ids: reply.ids,
            },
            Err(e) => {
                warn!("bulk {} on {} failed: {e}", reply.target, reply.scope);
                BulkEvent::Failed {
                    scope: reply.scope,
                    target: reply.target,
                    message: e.to_string(),
                }
            }
        }
    }

    pub fn is_pending(&self, scope: &Scope) -> bool {
        self.in_flight.contains(scope)
    }
}
