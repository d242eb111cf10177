mod common;

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::runtime::Handle;

use common::{TestBackend, day, record, roster};
use rollcall_desk::client::{AttendanceBackend, BulkUpdateRequest, ScopeRequest, ScopeResponse};
use rollcall_desk::models::{AttendanceStatus, FilterCriteria, Scope, ScopeKey, ServerAggregate};
use rollcall_desk::service::{BulkEvent, BulkMutationEngine, BulkOutcome, QueryState, ScopeQuery};
use rollcall_desk::ui::AttendanceView;

fn ids(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[tokio::test]
async fn test_stale_reply_dropped_after_scope_switch() {
    let (d1, d2) = (day(2026, 5, 4), day(2026, 5, 11));
    let backend = TestBackend::new([
        (ScopeKey::new(d1, "g1"), vec![record("a", "First", AttendanceStatus::Present)]),
        (ScopeKey::new(d2, "g2"), vec![record("b", "Second", AttendanceStatus::Present)]),
    ]);
    backend.hold_group("g1");

    let mut query = ScopeQuery::new(backend.clone(), Handle::current());
    let first = query.load(Scope::new(d1, Some("g1".to_string()))).unwrap();
    let second = query.load(Scope::new(d2, Some("g2".to_string()))).unwrap();
    assert!(second > first);

    assert!(query.wait_for_reply().await);
    assert_eq!(query.records()[0].id, "b");

    backend.release();
    assert!(!query.wait_for_reply().await, "reply for the old scope must be dropped");
    assert_eq!(query.records()[0].id, "b");
    assert_eq!(query.applied_generation(), second);
    assert_eq!(query.state(), &QueryState::Ready);
}

#[tokio::test]
async fn test_failed_fetch_keeps_previous_records_of_same_scope() {
    struct Flaky {
        inner: Arc<TestBackend>,
        fail: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl AttendanceBackend for Flaky {
        async fn fetch_scope(&self, request: &ScopeRequest) -> rollcall_desk::Result<ScopeResponse> {
            if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(rollcall_desk::AppError::scope_fetch("connection reset"));
            }
            self.inner.fetch_scope(request).await
        }

        async fn bulk_update(&self, request: &BulkUpdateRequest) -> rollcall_desk::Result<()> {
            self.inner.bulk_update(request).await
        }

        async fn list_groups(&self) -> rollcall_desk::Result<Vec<String>> {
            self.inner.list_groups().await
        }
    }

    let date = day(2026, 5, 4);
    let flaky = Arc::new(Flaky {
        inner: TestBackend::new([(ScopeKey::new(date, "g1"), roster(2))]),
        fail: std::sync::atomic::AtomicBool::new(false),
    });

    let mut query = ScopeQuery::new(flaky.clone(), Handle::current());
    query.load(Scope::new(date, Some("g1".to_string())));
    assert!(query.wait_for_reply().await);
    assert_eq!(query.records().len(), 2);

    flaky.fail.store(true, std::sync::atomic::Ordering::SeqCst);
    query.refresh();
    assert!(query.wait_for_reply().await);
    assert_eq!(query.error(), Some("Could not load attendance: connection reset"));
    assert_eq!(query.records().len(), 2);

    flaky.fail.store(false, std::sync::atomic::Ordering::SeqCst);
    query.refresh();
    assert!(query.wait_for_reply().await);
    assert_eq!(query.state(), &QueryState::Ready);
}

#[tokio::test]
async fn test_bulk_sends_whole_selection_in_one_call() {
    let date = day(2026, 5, 4);
    let key = ScopeKey::new(date, "g1");
    let backend = TestBackend::new([(key.clone(), roster(6))]);
    let scope = Scope::new(date, Some("g1".to_string()));

    let mut engine = BulkMutationEngine::new(backend.clone(), Handle::current());
    let selection = ids(&["r02", "r04", "r06"]);
    assert_eq!(engine.submit(&scope, AttendanceStatus::Present, &selection), BulkOutcome::Submitted);
    assert!(engine.is_pending(&scope));

    let event = engine.wait_for_reply().await.unwrap();
    assert_eq!(
        event,
        BulkEvent::Succeeded {
            scope: scope.clone(),
            target: AttendanceStatus::Present,
            ids: selection.clone(),
        }
    );
    assert!(!engine.is_pending(&scope));
    assert_eq!(backend.bulks(), 1);

    let stored = rollcall_desk::db::AttendanceStore::get(backend.store.as_ref(), &key).await.unwrap();
    let present: BTreeSet<String> = stored
        .iter()
        .filter(|r| r.status == AttendanceStatus::Present)
        .map(|r| r.id.clone())
        .collect();
    assert_eq!(present, selection);
}

#[tokio::test]
async fn test_bulk_guard_is_per_scope() {
    let date = day(2026, 5, 4);
    let backend = TestBackend::new([
        (ScopeKey::new(date, "g1"), roster(2)),
        (ScopeKey::new(date, "g2"), roster(2)),
    ]);
    let g1 = Scope::new(date, Some("g1".to_string()));
    let g2 = Scope::new(date, Some("g2".to_string()));
    let mut engine = BulkMutationEngine::new(backend.clone(), Handle::current());

    let selection = ids(&["r01"]);
    assert_eq!(engine.submit(&g1, AttendanceStatus::Online, &selection), BulkOutcome::Submitted);
    assert_eq!(engine.submit(&g1, AttendanceStatus::Online, &selection), BulkOutcome::Busy);
    assert_eq!(engine.submit(&g2, AttendanceStatus::Online, &selection), BulkOutcome::Submitted);
    assert_eq!(engine.submit(&g2, AttendanceStatus::Online, &BTreeSet::new()), BulkOutcome::Noop);

    for _ in 0..2 {
        assert!(matches!(engine.wait_for_reply().await, Some(BulkEvent::Succeeded { .. })));
    }
    assert_eq!(backend.bulks(), 2);
}

#[tokio::test]
async fn test_server_aggregate_is_kept_but_stats_use_records() {
    struct Reporting {
        inner: Arc<TestBackend>,
    }

    #[async_trait::async_trait]
    impl AttendanceBackend for Reporting {
        async fn fetch_scope(&self, request: &ScopeRequest) -> rollcall_desk::Result<ScopeResponse> {
            let mut response = self.inner.fetch_scope(request).await?;
            response.server_aggregate = Some(ServerAggregate { present: 9, late: 0, absent: 0 });
            Ok(response)
        }

        async fn bulk_update(&self, request: &BulkUpdateRequest) -> rollcall_desk::Result<()> {
            self.inner.bulk_update(request).await
        }

        async fn list_groups(&self) -> rollcall_desk::Result<Vec<String>> {
            self.inner.list_groups().await
        }
    }

    let date = day(2026, 5, 4);
    let backend = Arc::new(Reporting {
        inner: TestBackend::new([(ScopeKey::new(date, "g1"), roster(2))]),
    });

    let mut criteria = FilterCriteria::for_date(date);
    criteria.set_group(Some("g1".to_string()));
    let mut view = AttendanceView::new(backend, Handle::current(), criteria);
    view.settle().await;

    assert_eq!(view.server_aggregate().map(|a| a.present), Some(9));
    assert_eq!(view.stats().total, 2);
    assert_eq!(view.stats().count(AttendanceStatus::Present), 0);

    view.set_group(None);
    assert!(view.server_aggregate().is_none());
}
