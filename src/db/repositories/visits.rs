use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{ffi, params, ErrorCode, OptionalExtension, Row};

use crate::{
    db::{
        helpers::{
            parse_datetime, parse_optional_datetime, parse_optional_point, parse_outcome,
            parse_seller_id, to_i64, to_u64,
        },
        models::{NewVisit, SellerId, Visit, VisitClosure, VisitId, VisitOutcome},
        Database,
    },
    visits::store::{StoreError, StoreResult, VisitStore},
};

const VISIT_COLUMNS: &str = "id, seller_id, client_id, start_time, end_time, duration_seconds, \
     outcome, notes, gps_accuracy_meters, check_out_location, created_at, updated_at";

fn row_to_visit(row: &Row) -> Result<Visit> {
    let seller_id: String = row.get("seller_id")?;
    let start_time: String = row.get("start_time")?;
    let end_time: Option<String> = row.get("end_time")?;
    let duration_seconds: Option<i64> = row.get("duration_seconds")?;
    let outcome: String = row.get("outcome")?;
    let check_out_location: Option<String> = row.get("check_out_location")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(Visit {
        id: VisitId(row.get("id")?),
        seller_id: parse_seller_id(&seller_id)?,
        client_id: row.get("client_id")?,
        start_time: parse_datetime(&start_time, "start_time")?,
        end_time: parse_optional_datetime(end_time, "end_time")?,
        duration_seconds: duration_seconds
            .map(|secs| to_u64(secs, "duration_seconds"))
            .transpose()?,
        outcome: parse_outcome(&outcome)?,
        notes: row.get("notes")?,
        gps_accuracy_meters: row.get("gps_accuracy_meters")?,
        check_out_location: parse_optional_point(check_out_location)?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

/// True when the error chain holds a unique-constraint failure from SQLite.
fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<rusqlite::Error>(),
            Some(rusqlite::Error::SqliteFailure(failure, _))
                if failure.code == ErrorCode::ConstraintViolation
                    && failure.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
        )
    })
}

impl Database {
    pub async fn insert_visit(&self, visit: &NewVisit) -> Result<Visit> {
        let record = visit.clone();
        self.execute(move |conn| {
            let now = Utc::now().to_rfc3339();
            let sql = format!(
                "INSERT INTO visits (seller_id, client_id, start_time, outcome, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 RETURNING {VISIT_COLUMNS}"
            );
            let created = conn.query_row(
                &sql,
                params![
                    record.seller_id.to_string(),
                    record.client_id,
                    record.start_time.to_rfc3339(),
                    VisitOutcome::Pending.as_str(),
                    now,
                    now,
                ],
                |row| Ok(row_to_visit(row)),
            )??;
            Ok(created)
        })
        .await
    }

    pub async fn find_pending_visit(&self, seller_id: SellerId) -> Result<Option<Visit>> {
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {VISIT_COLUMNS}
                 FROM visits
                 WHERE seller_id = ?1 AND outcome = 'pending'
                 ORDER BY start_time DESC
                 LIMIT 1"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![seller_id.to_string()])?;
            let visit = match rows.next()? {
                Some(row) => Some(row_to_visit(row)?),
                None => None,
            };
            Ok(visit)
        })
        .await
    }

    /// Applies the closure to a still-pending visit owned by `seller_id`.
    /// Returns the updated rows, which is empty when the guard matched nothing.
    pub async fn close_visit(
        &self,
        seller_id: SellerId,
        visit_id: VisitId,
        closure: &VisitClosure,
    ) -> Result<Vec<Visit>> {
        let closure = closure.clone();
        self.execute(move |conn| {
            let sql = format!(
                "UPDATE visits
                 SET end_time = ?1,
                     duration_seconds = ?2,
                     outcome = ?3,
                     notes = ?4,
                     gps_accuracy_meters = ?5,
                     check_out_location = ?6,
                     updated_at = ?7
                 WHERE id = ?8 AND seller_id = ?9 AND outcome = 'pending'
                 RETURNING {VISIT_COLUMNS}"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![
                closure.end_time.to_rfc3339(),
                to_i64(closure.duration_seconds)?,
                VisitOutcome::from(closure.outcome).as_str(),
                closure.notes,
                closure.gps_accuracy_meters,
                closure.check_out_location.to_ewkt(),
                Utc::now().to_rfc3339(),
                visit_id.0,
                seller_id.to_string(),
            ])?;

            let mut updated = Vec::new();
            while let Some(row) = rows.next()? {
                updated.push(row_to_visit(row)?);
            }
            Ok(updated)
        })
        .await
    }

    pub async fn get_visit(&self, visit_id: VisitId) -> Result<Option<Visit>> {
        self.execute(move |conn| {
            let sql = format!("SELECT {VISIT_COLUMNS} FROM visits WHERE id = ?1");
            let visit = conn
                .query_row(&sql, params![visit_id.0], |row| Ok(row_to_visit(row)))
                .optional()?
                .transpose()?;
            Ok(visit)
        })
        .await
    }

    pub async fn list_visits_for_seller(
        &self,
        seller_id: SellerId,
        limit: usize,
    ) -> Result<Vec<Visit>> {
        let limit = i64::try_from(limit).context("visit limit out of range")?;
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {VISIT_COLUMNS}
                 FROM visits
                 WHERE seller_id = ?1
                 ORDER BY start_time DESC
                 LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![seller_id.to_string(), limit])?;
            let mut visits = Vec::new();
            while let Some(row) = rows.next()? {
                visits.push(row_to_visit(row)?);
            }
            Ok(visits)
        })
        .await
    }
}

#[async_trait]
impl VisitStore for Database {
    async fn find_pending_visit(&self, seller_id: SellerId) -> StoreResult<Option<Visit>> {
        Database::find_pending_visit(self, seller_id)
            .await
            .map_err(StoreError::Backend)
    }

    async fn insert_visit(&self, visit: NewVisit) -> StoreResult<Visit> {
        Database::insert_visit(self, &visit).await.map_err(|err| {
            if is_unique_violation(&err) {
                StoreError::PendingVisitExists
            } else {
                StoreError::Backend(err)
            }
        })
    }

    async fn close_visit(
        &self,
        seller_id: SellerId,
        visit_id: VisitId,
        closure: VisitClosure,
    ) -> StoreResult<Vec<Visit>> {
        Database::close_visit(self, seller_id, visit_id, &closure)
            .await
            .map_err(StoreError::Backend)
    }
}
