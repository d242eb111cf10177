//! Filter criteria for the attendance view and their query-string form.

use std::fmt;

use chrono::{Local, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::form_urlencoded;

use super::attendance::{AttendanceRecord, ModeFilter, StatusFilter};

/// The `(date, group)` pair a view is showing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub date: NaiveDate,
    pub group_id: Option<String>,
}

impl Scope {
    pub fn new(date: NaiveDate, group_id: Option<String>) -> Self {
        Self { date, group_id }
    }

    /// Store key for this scope; `None` until a group is selected.
    pub fn key(&self) -> Option<ScopeKey> {
        self.group_id.as_deref().map(|group| ScopeKey::new(self.date, group))
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.group_id {
            Some(group) => write!(f, "{} / {}", self.date.format("%Y-%m-%d"), group),
            None => write!(f, "{} / (no class)", self.date.format("%Y-%m-%d")),
        }
    }
}

/// Identifies one persisted record list: a day and a concrete group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopeKey {
    pub date: NaiveDate,
    pub group_id: String,
}

impl ScopeKey {
    pub fn new(date: NaiveDate, group_id: impl Into<String>) -> Self {
        Self {
            date,
            group_id: group_id.into(),
        }
    }

    /// Flat string form used as a map key in file stores.
    pub fn as_storage_key(&self) -> String {
        format!("{}/{}", self.date.format("%Y-%m-%d"), self.group_id)
    }

    pub fn parse_storage_key(value: &str) -> Option<Self> {
        let (date, group) = value.split_once('/')?;
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
        if group.is_empty() {
            return None;
        }
        Some(Self::new(date, group))
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_storage_key())
    }
}

/// Pin a calendar day to noon in the viewer's timezone and read the day back.
///
/// Noon is far enough from both midnights that no offset can move it to a
/// neighbouring day.
pub fn local_noon(date: NaiveDate) -> NaiveDate {
    date.and_hms_opt(12, 0, 0)
        .and_then(|noon| Local.from_local_datetime(&noon).earliest())
        .map(|noon| noon.date_naive())
        .unwrap_or(date)
}

/// Today in the viewer's timezone.
pub fn local_today() -> NaiveDate {
    local_noon(Local::now().date_naive())
}

/// What is currently being viewed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterCriteria {
    date: NaiveDate,
    group_id: Option<String>,
    search_text: String,
    status_filter: StatusFilter,
    mode_filter: ModeFilter,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self::for_date(local_today())
    }
}

impl FilterCriteria {
    pub fn for_date(date: NaiveDate) -> Self {
        Self {
            date: local_noon(date),
            group_id: None,
            search_text: String::new(),
            status_filter: StatusFilter::All,
            mode_filter: ModeFilter::All,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn group_id(&self) -> Option<&str> {
        self.group_id.as_deref()
    }

    pub fn search_text(&self) -> &str {
        &self.search_text
    }

    pub fn status_filter(&self) -> StatusFilter {
        self.status_filter
    }

    pub fn mode_filter(&self) -> ModeFilter {
        self.mode_filter
    }

    /// The part of the criteria that decides which records are fetched.
    pub fn scope(&self) -> Scope {
        Scope::new(self.date, self.group_id.clone())
    }

    /// Returns `true` when the day actually changed.
    pub fn set_date(&mut self, date: NaiveDate) -> bool {
        let date = local_noon(date);
        let changed = self.date != date;
        self.date = date;
        changed
    }

    /// Blank or whitespace-only ids clear the group.
    pub fn set_group(&mut self, group_id: Option<String>) -> bool {
        let group_id = group_id
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty());
        let changed = self.group_id != group_id;
        self.group_id = group_id;
        changed
    }

    pub fn set_search_text(&mut self, text: impl Into<String>) {
        self.search_text = text.into();
    }

    pub fn set_status_filter(&mut self, filter: StatusFilter) {
        self.status_filter = filter;
    }

    pub fn set_mode_filter(&mut self, filter: ModeFilter) {
        self.mode_filter = filter;
    }

    /// Display-time predicate: search text, status filter and mode filter.
    pub fn matches(&self, record: &AttendanceRecord) -> bool {
        if !self.status_filter.accepts(record.status) || !self.mode_filter.accepts(record.mode) {
            return false;
        }

        let needle = self.search_text.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }

        record.subject_name.to_lowercase().contains(&needle)
            || record.subject_id.to_lowercase().contains(&needle)
            || record.id.to_lowercase().contains(&needle)
    }

    /// Parse a query string, substituting defaults for anything missing or malformed.
    pub fn from_query(query: &str) -> Self {
        Self::from_query_at(query, local_today())
    }

    /// Same as [`FilterCriteria::from_query`] with an explicit fallback day.
    pub fn from_query_at(query: &str, today: NaiveDate) -> Self {
        let mut criteria = Self::for_date(today);
        let query = query.trim().trim_start_matches('?');

        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "date" => match NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d") {
                    Ok(date) => {
                        criteria.set_date(date);
                    }
                    Err(_) => debug!("ignoring invalid date parameter {value:?}"),
                },
                "class" | "group" => {
                    criteria.set_group(Some(value.into_owned()));
                }
                "q" | "search" => criteria.set_search_text(value.into_owned()),
                "status" => {
                    let filter = StatusFilter::parse_or_default(&value);
                    if filter == StatusFilter::All && value.trim() != "all" {
                        debug!("ignoring invalid status parameter {value:?}");
                    }
                    criteria.set_status_filter(filter);
                }
                "mode" => {
                    let filter = ModeFilter::parse_or_default(&value);
                    if filter == ModeFilter::All && value.trim() != "all" {
                        debug!("ignoring invalid mode parameter {value:?}");
                    }
                    criteria.set_mode_filter(filter);
                }
                other => debug!("ignoring unknown query parameter {other:?}"),
            }
        }

        criteria
    }

    /// Shareable query string. Default-valued filters are left out.
    pub fn to_query(&self) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair("date", &self.date.format("%Y-%m-%d").to_string());
        if let Some(group) = &self.group_id {
            query.append_pair("class", group);
        }
        if !self.search_text.is_empty() {
            query.append_pair("q", &self.search_text);
        }
        if self.status_filter != StatusFilter::All {
            query.append_pair("status", self.status_filter.as_str());
        }
        if self.mode_filter != ModeFilter::All {
            query.append_pair("mode", self.mode_filter.as_str());
        }
        query.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::attendance::{AttendanceMode, AttendanceStatus, SubjectRole};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(name: &str, status: AttendanceStatus, mode: Option<AttendanceMode>) -> AttendanceRecord {
        AttendanceRecord {
            id: format!("att-{name}"),
            subject_id: format!("stu-{name}"),
            subject_name: name.to_string(),
            group_label: "9A".to_string(),
            subject_role: SubjectRole::Learner,
            status,
            mode,
            recorded_time: None,
        }
    }

    #[test]
    fn test_query_roundtrip_keeps_all_fields() {
        let mut criteria = FilterCriteria::for_date(day(2026, 3, 14));
        criteria.set_group(Some("9A & 9B".to_string()));
        criteria.set_search_text("o'neil");
        criteria.set_status_filter(StatusFilter::Only(AttendanceStatus::Online));
        criteria.set_mode_filter(ModeFilter::Only(AttendanceMode::Remote));

        let query = criteria.to_query();
        assert!(query.starts_with("date=2026-03-14&class=9A+%26+9B"));
        assert_eq!(FilterCriteria::from_query_at(&query, day(2000, 1, 1)), criteria);
    }

    #[test]
    fn test_invalid_values_fall_back_to_defaults() {
        let today = day(2026, 10, 19);
        let criteria = FilterCriteria::from_query_at("?date=2026-13-40&status=late&mode=hybrid&class=", today);
        assert_eq!(criteria.date(), today);
        assert_eq!(criteria.group_id(), None);
        assert_eq!(criteria.status_filter(), StatusFilter::All);
        assert_eq!(criteria.mode_filter(), ModeFilter::All);
    }

    #[test]
    fn test_group_alias_is_accepted() {
        let criteria = FilterCriteria::from_query_at("group=10C&date=2026-02-01", day(2026, 1, 1));
        assert_eq!(criteria.group_id(), Some("10C"));
        assert_eq!(criteria.date(), day(2026, 2, 1));
    }

    #[test]
    fn test_default_filters_are_omitted_from_query() {
        let criteria = FilterCriteria::for_date(day(2026, 5, 2));
        assert_eq!(criteria.to_query(), "date=2026-05-02");
    }

    #[test]
    fn test_equality_covers_every_field() {
        let base = FilterCriteria::for_date(day(2026, 5, 2));
        let mut other = base.clone();
        assert_eq!(base, other);
        other.set_search_text("x");
        assert_ne!(base, other);
        assert_eq!(base.scope(), other.scope());
    }

    #[test]
    fn test_set_date_reports_change() {
        let mut criteria = FilterCriteria::for_date(day(2026, 5, 2));
        assert!(!criteria.set_date(day(2026, 5, 2)));
        assert!(criteria.set_date(day(2026, 5, 3)));
        assert_eq!(criteria.date(), day(2026, 5, 3));
    }

    #[test]
    fn test_local_noon_keeps_calendar_day() {
        for d in [day(2026, 1, 1), day(2026, 3, 29), day(2026, 10, 25), day(2026, 12, 31)] {
            assert_eq!(local_noon(d), d);
        }
    }

    #[test]
    fn test_matches_search_status_and_mode() {
        let mut criteria = FilterCriteria::for_date(day(2026, 5, 2));
        let ana = record("Ana", AttendanceStatus::Online, Some(AttendanceMode::Remote));
        let bo = record("Bo", AttendanceStatus::ExcusedSick, None);

        criteria.set_search_text("an");
        assert!(criteria.matches(&ana));
        assert!(!criteria.matches(&bo));

        criteria.set_search_text("");
        criteria.set_mode_filter(ModeFilter::Only(AttendanceMode::Remote));
        assert!(criteria.matches(&ana));
        assert!(!criteria.matches(&bo));

        criteria.set_mode_filter(ModeFilter::All);
        criteria.set_status_filter(StatusFilter::Only(AttendanceStatus::ExcusedSick));
        assert!(!criteria.matches(&ana));
        assert!(criteria.matches(&bo));
    }

    #[test]
    fn test_scope_key_storage_form() {
        let key = ScopeKey::new(day(2026, 4, 9), "7B");
        assert_eq!(key.as_storage_key(), "2026-04-09/7B");
        assert_eq!(ScopeKey::parse_storage_key("2026-04-09/7B"), Some(key));
        assert_eq!(ScopeKey::parse_storage_key("2026-04-09/"), None);
        assert_eq!(Scope::new(day(2026, 4, 9), None).key(), None);
    }
}
