//! Attendance taxonomy, records and summary types.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveTime;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

/// Attendance state stored on a record.
///
/// Deserialization goes through [`AttendanceStatus::parse`], so stored and
/// fetched values are read exactly like query-string values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum AttendanceStatus {
    Present,
    Online,
    ExcusedSick,
    ExcusedPermission,
    UnexcusedAbsence,
}

impl AttendanceStatus {
    /// Every status, in display order.
    pub const ALL: [AttendanceStatus; 5] = [
        AttendanceStatus::Present,
        AttendanceStatus::Online,
        AttendanceStatus::ExcusedSick,
        AttendanceStatus::ExcusedPermission,
        AttendanceStatus::UnexcusedAbsence,
    ];

    /// Wire name used in query strings, stores and exports.
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Online => "online",
            AttendanceStatus::ExcusedSick => "excused_sick",
            AttendanceStatus::ExcusedPermission => "excused_permission",
            AttendanceStatus::UnexcusedAbsence => "unexcused_absence",
        }
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Online => "Online",
            AttendanceStatus::ExcusedSick => "Sick",
            AttendanceStatus::ExcusedPermission => "Permission",
            AttendanceStatus::UnexcusedAbsence => "Absent",
        }
    }

    /// Parse a wire name. This is the only place raw status strings enter the system.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "present" => Some(AttendanceStatus::Present),
            "online" => Some(AttendanceStatus::Online),
            "excused_sick" => Some(AttendanceStatus::ExcusedSick),
            "excused_permission" => Some(AttendanceStatus::ExcusedPermission),
            "unexcused_absence" => Some(AttendanceStatus::UnexcusedAbsence),
            _ => None,
        }
    }

    /// Whether the person actually attended (physically or remotely).
    pub fn is_attending(self) -> bool {
        matches!(self, AttendanceStatus::Present | AttendanceStatus::Online)
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for AttendanceStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("unknown attendance status {value:?}"))
    }
}

/// How an attending person took part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum AttendanceMode {
    Onsite,
    Remote,
}

impl AttendanceMode {
    pub const ALL: [AttendanceMode; 2] = [AttendanceMode::Onsite, AttendanceMode::Remote];

    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceMode::Onsite => "onsite",
            AttendanceMode::Remote => "remote",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AttendanceMode::Onsite => "On-site",
            AttendanceMode::Remote => "Remote",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "onsite" => Some(AttendanceMode::Onsite),
            "remote" => Some(AttendanceMode::Remote),
            _ => None,
        }
    }
}

impl fmt::Display for AttendanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for AttendanceMode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("unknown attendance mode {value:?}"))
    }
}

/// Status filter; `All` never appears on a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Only(AttendanceStatus),
}

impl StatusFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusFilter::All => "all",
            StatusFilter::Only(status) => status.as_str(),
        }
    }

    /// Parse a filter value, falling back to `All` on anything unrecognized.
    pub fn parse_or_default(value: &str) -> Self {
        AttendanceStatus::parse(value).map(StatusFilter::Only).unwrap_or_default()
    }

    pub fn accepts(self, status: AttendanceStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Only(wanted) => wanted == status,
        }
    }
}

/// Mode filter; `All` also accepts records without a mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ModeFilter {
    #[default]
    All,
    Only(AttendanceMode),
}

impl ModeFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            ModeFilter::All => "all",
            ModeFilter::Only(mode) => mode.as_str(),
        }
    }

    pub fn parse_or_default(value: &str) -> Self {
        AttendanceMode::parse(value).map(ModeFilter::Only).unwrap_or_default()
    }

    pub fn accepts(self, mode: Option<AttendanceMode>) -> bool {
        match self {
            ModeFilter::All => true,
            ModeFilter::Only(wanted) => mode == Some(wanted),
        }
    }
}

/// Role of the person a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectRole {
    #[default]
    Learner,
    Instructor,
}

/// One person's attendance entry for a scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: String,
    pub subject_id: String,
    pub subject_name: String,
    pub group_label: String,
    #[serde(default)]
    pub subject_role: SubjectRole,
    pub status: AttendanceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_mode")]
    pub mode: Option<AttendanceMode>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "hh_mm")]
    pub recorded_time: Option<NaiveTime>,
}

impl AttendanceRecord {
    /// Record after a status change, keeping mode and time consistent with the new status.
    pub fn with_status(&self, status: AttendanceStatus) -> Self {
        let mut next = self.clone();
        next.status = status;
        match status {
            AttendanceStatus::Online => next.mode = Some(AttendanceMode::Remote),
            AttendanceStatus::Present => {
                next.mode.get_or_insert(AttendanceMode::Onsite);
            }
            _ => {
                next.mode = None;
                next.recorded_time = None;
            }
        }
        next
    }

    /// Drop a mode or time that the status does not allow.
    pub fn normalize(mut self) -> Self {
        if !self.status.is_attending() {
            self.mode = None;
            self.recorded_time = None;
        }
        self
    }

    /// `HH:MM` rendering of the recorded time, empty when absent.
    pub fn time_label(&self) -> String {
        self.recorded_time
            .map(|t| t.format("%H:%M").to_string())
            .unwrap_or_default()
    }
}

/// An unknown mode is dropped instead of failing the record.
fn lenient_mode<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<AttendanceMode>, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(AttendanceMode::parse))
}

/// Decode a list of raw JSON records, skipping the ones that do not parse.
pub fn records_from_values(values: Vec<serde_json::Value>) -> Vec<AttendanceRecord> {
    values
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<AttendanceRecord>(value) {
            Ok(record) => Some(record.normalize()),
            Err(e) => {
                warn!("skipping unreadable attendance record: {e}");
                None
            }
        })
        .collect()
}

/// Serde adapter for record lists read from stores and backends.
pub fn deserialize_records<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<AttendanceRecord>, D::Error> {
    let values: Vec<serde_json::Value> = Vec::deserialize(deserializer)?;
    Ok(records_from_values(values))
}

/// Summary counts for a scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceStats {
    pub total: usize,
    pub by_status: BTreeMap<AttendanceStatus, usize>,
    pub present_rate: u8,
}

impl AttendanceStats {
    pub fn count(&self, status: AttendanceStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

/// Totals a backend may report next to the records. Informational only;
/// missing counts read as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerAggregate {
    pub present: usize,
    pub late: usize,
    pub absent: usize,
}

/// Serde adapter for `HH:MM` times.
mod hh_mm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn serialize<S: Serializer>(value: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(time) => serializer.serialize_str(&time.format(FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveTime>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => NaiveTime::parse_from_str(text, FORMAT)
                .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M:%S"))
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}
