//! Data models for attendance records, filters and scopes.

pub mod attendance;
pub mod filter;

pub use attendance::{
    AttendanceMode, AttendanceRecord, AttendanceStats, AttendanceStatus, ModeFilter, ServerAggregate, StatusFilter,
    SubjectRole, deserialize_records, records_from_values,
};
pub use filter::{FilterCriteria, Scope, ScopeKey, local_noon, local_today};
