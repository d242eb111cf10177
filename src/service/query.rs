//! Scope resolution with request coalescing and stale-response dropping.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::client::{AttendanceBackend, ScopeRequest, ScopeResponse};
use crate::error::Result;
use crate::models::{AttendanceRecord, Scope, ServerAggregate};
use crate::stats;

/// Load state of the current scope.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum QueryState {
    #[default]
    Idle,
    Loading,
    Ready,
    /// Retryable failure; records of the same scope loaded earlier stay visible.
    Failed(String),
}

/// Records of the last successfully loaded scope.
#[derive(Debug, Clone)]
pub struct LoadedScope {
    pub scope: Scope,
    pub records: Vec<AttendanceRecord>,
    pub server_aggregate: Option<ServerAggregate>,
}

/// Reply from a fetch task, tagged with the generation it was issued under.
struct FetchReply {
    generation: u64,
    scope: Scope,
    result: Result<ScopeResponse>,
}

/// Resolves scopes into record lists on a background runtime.
///
/// Every issued fetch gets a new generation number. Replies are applied only
/// when their generation is still the latest one, so a slow answer for a scope
/// the view already left is dropped on arrival.
pub struct ScopeQuery {
    backend: Arc<dyn AttendanceBackend>,
    runtime: Handle,
    tx: mpsc::UnboundedSender<FetchReply>,
    rx: mpsc::UnboundedReceiver<FetchReply>,
    latest: u64,
    applied: u64,
    in_flight: Option<(u64, Scope)>,
    current: Option<Scope>,
    loaded: Option<LoadedScope>,
    state: QueryState,
}

impl ScopeQuery {
    pub fn new(backend: Arc<dyn AttendanceBackend>, runtime: Handle) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            backend,
            runtime,
            tx,
            rx,
            latest: 0,
            applied: 0,
            in_flight: None,
            current: None,
            loaded: None,
            state: QueryState::Idle,
        }
    }

    /// Show `scope`. Returns the generation of the issued fetch, or `None` when
    /// nothing new was issued (same scope already loading or loaded).
    pub fn load(&mut self, scope: Scope) -> Option<u64> {
        if self.current.as_ref() == Some(&scope) {
            if matches!(&self.in_flight, Some((_, pending)) if *pending == scope) {
                debug!("coalescing fetch for {scope}");
                return None;
            }
            if self.state != QueryState::Idle {
                return None;
            }
        }

        self.current = Some(scope.clone());
        Some(self.issue(scope))
    }

    /// Fetch the current scope again, superseding anything in flight.
    pub fn refresh(&mut self) -> Option<u64> {
        let scope = self.current.clone()?;
        Some(self.issue(scope))
    }

    fn issue(&mut self, scope: Scope) -> u64 {
        self.latest += 1;
        let generation = self.latest;

        let Some(key) = scope.key() else {
            // No group selected yet: nothing to fetch, and not every group merged.
            self.in_flight = None;
            self.applied = generation;
            self.loaded = Some(LoadedScope {
                scope,
                records: Vec::new(),
                server_aggregate: None,
            });
            self.state = QueryState::Ready;
            return generation;
        };

        debug!("fetching {scope} (generation {generation})");
        self.in_flight = Some((generation, scope.clone()));
        self.state = QueryState::Loading;

        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();
        let request = ScopeRequest::from(&key);
        self.runtime.spawn(async move {
            let result = backend.fetch_scope(&request).await;
            let _ = tx.send(FetchReply {
                generation,
                scope,
                result,
            });
        });

        generation
    }

    /// Apply every reply that has arrived. Returns `true` if the state changed.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Ok(reply) = self.rx.try_recv() {
            changed |= self.apply(reply);
        }
        changed
    }

    /// Wait for the next reply and apply it. Returns `false` if it was stale.
    pub async fn wait_for_reply(&mut self) -> bool {
        match self.rx.recv().await {
            Some(reply) => self.apply(reply),
            None => false,
        }
    }

    fn apply(&mut self, reply: FetchReply) -> bool {
        if reply.generation != self.latest {
            debug!(
                "dropping stale response for {} (generation {}, latest {})",
                reply.scope, reply.generation, self.latest
            );
            return false;
        }

        self.in_flight = None;
        self.applied = reply.generation;

        match reply.result {
            Ok(response) => {
                let mut records = response.records;
                records.sort_by_cached_key(|record| record.subject_name.to_lowercase());

                if let Some(server) = &response.server_aggregate
                    && !stats::agrees_with_server(&stats::aggregate(&records), server)
                {
                    debug!("server aggregate for {} disagrees with records; ignoring it", reply.scope);
                }

                debug!("loaded {} records for {}", records.len(), reply.scope);
                self.loaded = Some(LoadedScope {
                    scope: reply.scope,
                    records,
                    server_aggregate: response.server_aggregate,
                });
                self.state = QueryState::Ready;
            }
            Err(e) => {
                warn!("failed to load {}: {e}", reply.scope);
                self.state = QueryState::Failed(e.to_string());
            }
        }

        true
    }

    /// Full record list of the current scope. Empty while another scope's data
    /// is all there is.
    pub fn records(&self) -> &[AttendanceRecord] {
        match (&self.loaded, &self.current) {
            (Some(loaded), Some(current)) if loaded.scope == *current => &loaded.records,
            _ => &[],
        }
    }

    /// Backend totals for the current scope. Informational only.
    pub fn server_aggregate(&self) -> Option<ServerAggregate> {
        match (&self.loaded, &self.current) {
            (Some(loaded), Some(current)) if loaded.scope == *current => loaded.server_aggregate,
            _ => None,
        }
    }

    pub fn current_scope(&self) -> Option<&Scope> {
        self.current.as_ref()
    }

    pub fn state(&self) -> &QueryState {
        &self.state
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            QueryState::Failed(message) => Some(message),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Generation of the last reply applied.
    pub fn applied_generation(&self) -> u64 {
        self.applied
    }
}
