//! PostgreSQL store on top of sea-orm raw statements.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, FromQueryResult, Statement, TransactionTrait};
use tracing::warn;

use super::AttendanceStore;
use crate::error::Result;
use crate::models::{AttendanceMode, AttendanceRecord, AttendanceStatus, ScopeKey, SubjectRole};

/// Row shape of `attendance_records`.
#[derive(Debug, Clone, FromQueryResult)]
struct AttendanceRow {
    id: String,
    subject_id: String,
    subject_name: String,
    group_label: String,
    subject_role: String,
    status: String,
    mode: Option<String>,
    recorded_time: Option<NaiveTime>,
}

impl AttendanceRow {
    /// Rows with an unknown status are skipped rather than guessed.
    fn into_record(self) -> Option<AttendanceRecord> {
        let Some(status) = AttendanceStatus::parse(&self.status) else {
            warn!("skipping record {} with unknown status {:?}", self.id, self.status);
            return None;
        };

        let subject_role = match self.subject_role.as_str() {
            "instructor" => SubjectRole::Instructor,
            _ => SubjectRole::Learner,
        };

        let record = AttendanceRecord {
            id: self.id,
            subject_id: self.subject_id,
            subject_name: self.subject_name,
            group_label: self.group_label,
            subject_role,
            status,
            mode: self.mode.as_deref().and_then(AttendanceMode::parse),
            recorded_time: self.recorded_time,
        };
        Some(record.normalize())
    }
}

#[derive(Debug, FromQueryResult)]
struct GroupRow {
    group_id: String,
}

pub struct PgStore {
    db: DatabaseConnection,
}

impl PgStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AttendanceStore for PgStore {
    async fn get(&self, key: &ScopeKey) -> Result<Vec<AttendanceRecord>> {
        let rows = AttendanceRow::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            SELECT id, subject_id, subject_name, group_label, subject_role, status, mode, recorded_time
            FROM attendance_records
            WHERE scope_date = $1 AND group_id = $2
            ORDER BY subject_name, id
            "#,
            [key.date.into(), key.group_id.clone().into()],
        ))
        .all(&self.db)
        .await?;

        Ok(rows.into_iter().filter_map(AttendanceRow::into_record).collect())
    }

    async fn put(&self, key: &ScopeKey, records: Vec<AttendanceRecord>) -> Result<()> {
        let txn = self.db.begin().await?;

        txn.execute(Statement::from_sql_and_values(
            DbBackend::Postgres,
            "DELETE FROM attendance_records WHERE scope_date = $1 AND group_id = $2",
            [key.date.into(), key.group_id.clone().into()],
        ))
        .await?;

        for record in &records {
            txn.execute(insert_statement(key.date, &key.group_id, record)).await?;
        }

        txn.commit().await?;
        Ok(())
    }

    async fn groups(&self) -> Result<Vec<String>> {
        let rows = GroupRow::find_by_statement(Statement::from_string(
            DbBackend::Postgres,
            "SELECT DISTINCT group_id FROM attendance_records ORDER BY group_id".to_owned(),
        ))
        .all(&self.db)
        .await?;

        Ok(rows.into_iter().map(|row| row.group_id).collect())
    }
}

fn insert_statement(date: NaiveDate, group_id: &str, record: &AttendanceRecord) -> Statement {
    let role = match record.subject_role {
        SubjectRole::Learner => "learner",
        SubjectRole::Instructor => "instructor",
    };

    Statement::from_sql_and_values(
        DbBackend::Postgres,
        r#"
        INSERT INTO attendance_records
            (scope_date, group_id, id, subject_id, subject_name, group_label, subject_role, status, mode, recorded_time)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
        [
            date.into(),
            group_id.to_owned().into(),
            record.id.clone().into(),
            record.subject_id.clone().into(),
            record.subject_name.clone().into(),
            record.group_label.clone().into(),
            role.to_owned().into(),
            record.status.as_str().to_owned().into(),
            record.mode.map(|m| m.as_str().to_owned()).into(),
            record.recorded_time.into(),
        ],
    )
}
