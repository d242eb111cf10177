//! Attendance view state: filters, selection, background queries and notices.
//!
//! Holds no egui types so it can be driven from tests and the CLI.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::client::AttendanceBackend;
use crate::error::Result;
use crate::export;
use crate::models::{
    AttendanceRecord, AttendanceStats, AttendanceStatus, FilterCriteria, ModeFilter, ServerAggregate, StatusFilter,
};
use crate::service::{BulkEvent, BulkMutationEngine, BulkOutcome, QueryState, ScopeQuery};
use crate::stats;

/// Inline message shown above the roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Info(String),
    Success(String),
    Error(String),
}

impl Notice {
    pub fn message(&self) -> &str {
        match self {
            Notice::Info(m) | Notice::Success(m) | Notice::Error(m) => m,
        }
    }
}

/// A successful bulk change waiting for the refreshed roster to confirm it.
#[derive(Debug, Clone)]
struct AwaitingConfirmation {
    generation: u64,
    target: AttendanceStatus,
    ids: BTreeSet<String>,
}

pub struct AttendanceView {
    backend: Arc<dyn AttendanceBackend>,
    runtime: Handle,
    criteria: FilterCriteria,
    selection: BTreeSet<String>,
    query: ScopeQuery,
    bulk: BulkMutationEngine,
    awaiting: Option<AwaitingConfirmation>,
    notice: Option<Notice>,
    groups: Vec<String>,
    groups_rx: Option<oneshot::Receiver<Result<Vec<String>>>>,
}

impl AttendanceView {
    pub fn new(backend: Arc<dyn AttendanceBackend>, runtime: Handle, criteria: FilterCriteria) -> Self {
        let mut view = Self {
            query: ScopeQuery::new(Arc::clone(&backend), runtime.clone()),
            bulk: BulkMutationEngine::new(Arc::clone(&backend), runtime.clone()),
            backend,
            runtime,
            criteria,
            selection: BTreeSet::new(),
            awaiting: None,
            notice: None,
            groups: Vec::new(),
            groups_rx: None,
        };
        view.query.load(view.criteria.scope());
        view.load_groups();
        view
    }

    /// Fetch the group list for the class picker.
    pub fn load_groups(&mut self) {
        let (tx, rx) = oneshot::channel();
        self.groups_rx = Some(rx);
        let backend = Arc::clone(&self.backend);
        self.runtime.spawn(async move {
            let _ = tx.send(backend.list_groups().await);
        });
    }

    // ---- filter criteria ----

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    /// Change the day. Always clears the row selection.
    pub fn set_date(&mut self, date: NaiveDate) {
        self.selection.clear();
        if self.criteria.set_date(date) {
            self.reload();
        }
    }

    /// Change the class. Selected ids belong to the old class, so they are dropped.
    pub fn set_group(&mut self, group_id: Option<String>) {
        if self.criteria.set_group(group_id) {
            self.selection.clear();
            self.reload();
        }
    }

    pub fn set_search_text(&mut self, text: impl Into<String>) {
        self.criteria.set_search_text(text);
    }

    pub fn set_status_filter(&mut self, filter: StatusFilter) {
        self.criteria.set_status_filter(filter);
    }

    pub fn set_mode_filter(&mut self, filter: ModeFilter) {
        self.criteria.set_mode_filter(filter);
    }

    /// Replace all criteria from a shared query string.
    pub fn apply_query(&mut self, query: &str) {
        let criteria = FilterCriteria::from_query(query);
        if criteria.scope() != self.criteria.scope() || criteria.date() != self.criteria.date() {
            self.selection.clear();
        }
        self.criteria = criteria;
        self.reload();
    }

    pub fn query_string(&self) -> String {
        self.criteria.to_query()
    }

    fn reload(&mut self) {
        let scope = self.criteria.scope();
        // A confirmation only goes stale when the scope actually moves.
        if self.query.current_scope() != Some(&scope) {
            self.awaiting = None;
        }
        self.query.load(scope);
    }

    // ---- records and stats ----

    /// Full scope list; what the stats are computed from.
    pub fn records(&self) -> &[AttendanceRecord] {
        self.query.records()
    }

    /// Records passing the search, status and mode filters.
    pub fn visible_records(&self) -> Vec<&AttendanceRecord> {
        self.query
            .records()
            .iter()
            .filter(|record| self.criteria.matches(record))
            .collect()
    }

    pub fn stats(&self) -> AttendanceStats {
        stats::aggregate(self.query.records())
    }

    /// Totals reported by the backend for the current scope, if any.
    pub fn server_aggregate(&self) -> Option<ServerAggregate> {
        self.query.server_aggregate()
    }

    pub fn query_state(&self) -> &QueryState {
        self.query.state()
    }

    pub fn is_loading(&self) -> bool {
        self.query.is_pending()
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    /// Retry after a failed load.
    pub fn retry(&mut self) {
        self.query.refresh();
    }

    // ---- selection ----

    pub fn selection(&self) -> &BTreeSet<String> {
        &self.selection
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selection.contains(id)
    }

    pub fn toggle_row(&mut self, id: &str) {
        if !self.selection.remove(id) {
            self.selection.insert(id.to_string());
        }
    }

    /// Select every row currently visible.
    pub fn select_all_visible(&mut self) {
        let ids: Vec<String> = self.visible_records().iter().map(|r| r.id.clone()).collect();
        self.selection.extend(ids);
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    // ---- bulk changes ----

    pub fn is_bulk_pending(&self) -> bool {
        self.bulk.is_pending(&self.criteria.scope())
    }

    /// Whether the bulk trigger should be enabled.
    pub fn can_bulk_apply(&self) -> bool {
        !self.selection.is_empty() && !self.is_bulk_pending() && self.criteria.group_id().is_some()
    }

    /// Set every selected row to `target` with one backend call.
    pub fn bulk_apply(&mut self, target: AttendanceStatus) -> BulkOutcome {
        let outcome = self.bulk.submit(&self.criteria.scope(), target, &self.selection);
        match outcome {
            BulkOutcome::Submitted => {
                self.notice = Some(Notice::Info(format!(
                    "Updating {} records to {}...",
                    self.selection.len(),
                    target.label()
                )));
            }
            BulkOutcome::Busy => {
                self.notice = Some(Notice::Info("Another update is still running".to_string()));
            }
            BulkOutcome::Noop | BulkOutcome::NoScope => {}
        }
        outcome
    }

    fn on_bulk_event(&mut self, event: BulkEvent) {
        match event {
            BulkEvent::Succeeded { scope, target, ids } => {
                if scope != self.criteria.scope() {
                    debug!("bulk update for {scope} finished after leaving it");
                    self.notice = Some(Notice::Success(format!(
                        "Updated {} records in {scope}",
                        ids.len()
                    )));
                    return;
                }
                if let Some(generation) = self.query.refresh() {
                    self.awaiting = Some(AwaitingConfirmation {
                        generation,
                        target,
                        ids,
                    });
                }
            }
            BulkEvent::Failed { scope, message, .. } => {
                self.notice = Some(Notice::Error(format!("Update failed for {scope}: {message}")));
            }
        }
    }

    /// Clear the selection once the refreshed roster shows the change.
    fn confirm_bulk(&mut self) {
        let Some(awaiting) = &self.awaiting else {
            return;
        };
        if self.query.applied_generation() < awaiting.generation {
            return;
        }

        let awaiting = match self.awaiting.take() {
            Some(awaiting) => awaiting,
            None => return,
        };

        if let QueryState::Failed(message) = self.query.state() {
            self.notice = Some(Notice::Error(format!(
                "Update sent, but reloading failed: {message}"
            )));
            return;
        }

        let confirmed: BTreeSet<String> = self
            .query
            .records()
            .iter()
            .filter(|record| awaiting.ids.contains(&record.id) && record.status == awaiting.target)
            .map(|record| record.id.clone())
            .collect();

        for id in &confirmed {
            self.selection.remove(id);
        }

        let unconfirmed = awaiting.ids.len() - confirmed.len();
        if unconfirmed == 0 {
            info!("bulk update to {} confirmed for {} records", awaiting.target, confirmed.len());
            self.notice = Some(Notice::Success(format!(
                "Marked {} records as {}",
                confirmed.len(),
                awaiting.target.label()
            )));
        } else {
            warn!("{unconfirmed} records did not take status {}", awaiting.target);
            self.notice = Some(Notice::Error(format!(
                "{unconfirmed} records still do not show {}; they remain selected",
                awaiting.target.label()
            )));
        }
    }

    // ---- export ----

    /// Write the visible rows as CSV.
    pub fn export_csv(&mut self, path: &Path) -> Result<usize> {
        let rows = self.visible_records();
        let count = rows.len();
        let result = export::write_csv_file(rows, path);
        self.report_export(result, path, count)
    }

    /// Write the visible rows and the scope summary as an Excel workbook.
    pub fn export_excel(&mut self, path: &Path) -> Result<usize> {
        let rows = self.visible_records();
        let count = rows.len();
        let stats = self.stats();
        let result = export::export_attendance_to_excel(rows, &stats, &self.criteria.scope(), path);
        self.report_export(result, path, count)
    }

    fn report_export(&mut self, result: Result<()>, path: &Path, count: usize) -> Result<usize> {
        match result {
            Ok(()) => {
                info!("exported {count} rows to {}", path.display());
                self.notice = Some(Notice::Success(format!("Exported {count} rows to {}", path.display())));
                Ok(count)
            }
            Err(e) => {
                warn!("export failed: {e}");
                self.notice = Some(Notice::Error(format!("Export failed: {e}")));
                Err(e)
            }
        }
    }

    /// Default file name for exports of the current scope.
    pub fn export_filename(&self, extension: &str) -> String {
        export::export_filename(&self.criteria.scope(), extension)
    }

    // ---- notices and polling ----

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    /// Drain finished background work. Returns `true` if anything changed.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;

        for event in self.bulk.poll() {
            self.on_bulk_event(event);
            changed = true;
        }

        if self.query.poll() {
            self.confirm_bulk();
            changed = true;
        }

        if let Some(rx) = &mut self.groups_rx
            && let Ok(result) = rx.try_recv()
        {
            self.groups_rx = None;
            match result {
                Ok(groups) => self.groups = groups,
                Err(e) => warn!("failed to load groups: {e}"),
            }
            changed = true;
        }

        changed
    }

    /// Wait until the current load and any bulk change have settled.
    pub async fn settle(&mut self) {
        while self.is_bulk_pending() {
            if let Some(event) = self.bulk.wait_for_reply().await {
                self.on_bulk_event(event);
            }
        }
        while self.query.is_pending() {
            if self.query.wait_for_reply().await {
                self.confirm_bulk();
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        self.query.is_pending() || self.is_bulk_pending()
    }
}
