//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Notify;

use rollcall_desk::Result;
use rollcall_desk::client::{AttendanceBackend, BulkUpdateRequest, ScopeRequest, ScopeResponse, StoreBackend};
use rollcall_desk::db::MemoryStore;
use rollcall_desk::models::{AttendanceRecord, AttendanceStatus, ScopeKey, SubjectRole};
use rollcall_desk::ui::AttendanceView;

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn record(id: &str, name: &str, status: AttendanceStatus) -> AttendanceRecord {
    AttendanceRecord {
        id: id.to_string(),
        subject_id: format!("stu-{id}"),
        subject_name: name.to_string(),
        group_label: "test".to_string(),
        subject_role: SubjectRole::Learner,
        status,
        mode: None,
        recorded_time: None,
    }
}

/// `count` absent learners named "Student 01".. with ids "r01"..
pub fn roster(count: usize) -> Vec<AttendanceRecord> {
    (1..=count)
        .map(|i| record(&format!("r{i:02}"), &format!("Student {i:02}"), AttendanceStatus::UnexcusedAbsence))
        .collect()
}

/// Store-backed backend that counts calls and can hold requests until released.
pub struct TestBackend {
    pub store: Arc<MemoryStore>,
    inner: StoreBackend<MemoryStore>,
    pub fetch_calls: AtomicUsize,
    pub bulk_calls: AtomicUsize,
    held_group: Mutex<Option<String>>,
    hold_bulk: AtomicBool,
    gate: Notify,
}

impl TestBackend {
    pub fn new(scopes: impl IntoIterator<Item = (ScopeKey, Vec<AttendanceRecord>)>) -> Arc<Self> {
        let store = Arc::new(MemoryStore::with_scopes(scopes));
        Arc::new(Self {
            inner: StoreBackend::new(Arc::clone(&store)),
            store,
            fetch_calls: AtomicUsize::new(0),
            bulk_calls: AtomicUsize::new(0),
            held_group: Mutex::new(None),
            hold_bulk: AtomicBool::new(false),
            gate: Notify::new(),
        })
    }

    /// Fetches for `group` wait until [`TestBackend::release`].
    pub fn hold_group(&self, group: &str) {
        *self.held_group.lock().unwrap() = Some(group.to_string());
    }

    /// Bulk updates wait until [`TestBackend::release`].
    pub fn hold_bulk(&self) {
        self.hold_bulk.store(true, Ordering::SeqCst);
    }

    /// Stop holding and let one waiting request through.
    pub fn release(&self) {
        *self.held_group.lock().unwrap() = None;
        self.hold_bulk.store(false, Ordering::SeqCst);
        self.gate.notify_one();
    }

    pub fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn bulks(&self) -> usize {
        self.bulk_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AttendanceBackend for TestBackend {
    async fn fetch_scope(&self, request: &ScopeRequest) -> Result<ScopeResponse> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let held = self.held_group.lock().unwrap().as_deref() == Some(request.group_id.as_str());
        if held {
            self.gate.notified().await;
        }
        self.inner.fetch_scope(request).await
    }

    async fn bulk_update(&self, request: &BulkUpdateRequest) -> Result<()> {
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        if self.hold_bulk.load(Ordering::SeqCst) {
            self.gate.notified().await;
        }
        self.inner.bulk_update(request).await
    }

    async fn list_groups(&self) -> Result<Vec<String>> {
        self.inner.list_groups().await
    }
}

/// Poll the view until `done` holds, yielding to background tasks in between.
pub async fn poll_until(view: &mut AttendanceView, mut done: impl FnMut(&AttendanceView) -> bool) {
    for _ in 0..200 {
        view.poll();
        if done(view) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached while polling the view");
}
