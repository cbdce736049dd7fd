use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};

use super::types::*;
use crate::db::{PgStore, decode};
use crate::errors::AppError;
use crate::models::trip::Activity;
use crate::store::ProposalStore;

const PROPOSAL_COLUMNS: &str = "id, trip_id, proposer_id, proposal_type, activity_data, \
     target_day, target_time_slot, target_activity_id, note, status, created_at, updated_at, \
     expires_at, resolved_at, resolved_by, resolution_method, applied_at";

#[derive(sqlx::FromRow)]
struct ProposalRow {
    id: i64,
    trip_id: i64,
    proposer_id: i64,
    proposal_type: String,
    activity_data: Json<Activity>,
    target_day: i32,
    target_time_slot: Option<String>,
    target_activity_id: Option<String>,
    note: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    resolved_by: Option<i64>,
    resolution_method: Option<String>,
    applied_at: Option<DateTime<Utc>>,
}

impl TryFrom<ProposalRow> for Proposal {
    type Error = AppError;

    fn try_from(row: ProposalRow) -> Result<Self, Self::Error> {
        Ok(Proposal {
            id: row.id,
            trip_id: row.trip_id,
            proposer_id: row.proposer_id,
            proposal_type: decode("proposal_type", &row.proposal_type)?,
            activity: row.activity_data.0,
            target_day: row.target_day,
            target_time_slot: row
                .target_time_slot
                .as_deref()
                .map(|s| decode("target_time_slot", s))
                .transpose()?,
            target_activity_id: row.target_activity_id,
            note: row.note,
            status: decode("status", &row.status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
            expires_at: row.expires_at,
            resolved_at: row.resolved_at,
            resolved_by: row.resolved_by,
            resolution_method: row
                .resolution_method
                .as_deref()
                .map(|s| decode("resolution_method", s))
                .transpose()?,
            applied_at: row.applied_at,
        })
    }
}

fn into_proposals(rows: Vec<ProposalRow>) -> Result<Vec<Proposal>, AppError> {
    rows.into_iter().map(Proposal::try_from).collect()
}

fn status_strings(statuses: &[ProposalStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

impl ProposalStore for PgStore {
    async fn insert_proposal(&self, new: &NewProposal) -> Result<Proposal, AppError> {
        let spec = &new.spec;
        let sql = format!(
            "INSERT INTO activity_proposals \
                 (trip_id, proposer_id, proposal_type, activity_data, target_day, \
                  target_time_slot, target_activity_id, note, status, created_at, updated_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', $9, $9, $10) \
             RETURNING {PROPOSAL_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ProposalRow>(&sql)
            .bind(new.trip_id)
            .bind(new.proposer_id)
            .bind(spec.proposal_type.as_str())
            .bind(Json(&spec.activity))
            .bind(spec.target_day)
            .bind(spec.target_time_slot.map(|s| s.as_str()))
            .bind(spec.target_activity_id.as_deref())
            .bind(spec.note.as_deref())
            .bind(new.created_at)
            .bind(new.expires_at)
            .fetch_one(self.pool())
            .await?;

        row.try_into()
    }

    async fn find_proposal(&self, trip_id: i64, proposal_id: i64) -> Result<Option<Proposal>, AppError> {
        let sql = format!("SELECT {PROPOSAL_COLUMNS} FROM activity_proposals WHERE id = $1 AND trip_id = $2");
        let row = sqlx::query_as::<_, ProposalRow>(&sql)
            .bind(proposal_id)
            .bind(trip_id)
            .fetch_optional(self.pool())
            .await?;

        row.map(Proposal::try_from).transpose()
    }

    async fn find_proposals(&self, trip_id: i64, filter: &ProposalFilter) -> Result<Vec<Proposal>, AppError> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {PROPOSAL_COLUMNS} FROM activity_proposals WHERE trip_id = "
        ));
        qb.push_bind(trip_id);

        match filter.status {
            StatusFilter::All => {}
            StatusFilter::Active => {
                qb.push(" AND status IN ('pending', 'voting')");
            }
            StatusFilter::Only(status) => {
                qb.push(" AND status = ").push_bind(status.as_str());
            }
        }
        if let Some(day) = filter.day {
            qb.push(" AND target_day = ").push_bind(day);
        }
        if let Some(slot) = filter.time_slot {
            qb.push(" AND target_time_slot = ").push_bind(slot.as_str());
        }
        qb.push(" ORDER BY created_at DESC, id DESC");

        let rows = qb
            .build_query_as::<ProposalRow>()
            .fetch_all(self.pool())
            .await?;
        into_proposals(rows)
    }

    async fn transition_status(
        &self,
        proposal_id: i64,
        from: &[ProposalStatus],
        to: ProposalStatus,
        resolution: Option<&Resolution>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE activity_proposals \
             SET status = $3, \
                 updated_at = now(), \
                 resolved_at = COALESCE($4, resolved_at), \
                 resolved_by = COALESCE($5, resolved_by), \
                 resolution_method = COALESCE($6, resolution_method) \
             WHERE id = $1 AND status = ANY($2)",
        )
        .bind(proposal_id)
        .bind(status_strings(from))
        .bind(to.as_str())
        .bind(resolution.map(|r| r.at))
        .bind(resolution.and_then(|r| r.by))
        .bind(resolution.and_then(|r| r.method).map(|m| m.as_str()))
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_applied(&self, proposal_id: i64, at: DateTime<Utc>) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE activity_proposals SET applied_at = $2 \
             WHERE id = $1 AND applied_at IS NULL",
        )
        .bind(proposal_id)
        .bind(at)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_pending_proposal(&self, proposal_id: i64) -> Result<bool, AppError> {
        // Votes go with the proposal via ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM activity_proposals WHERE id = $1 AND status = 'pending'")
            .bind(proposal_id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_expired_open(&self, now: DateTime<Utc>) -> Result<Vec<Proposal>, AppError> {
        let sql = format!(
            "SELECT {PROPOSAL_COLUMNS} FROM activity_proposals \
             WHERE status IN ('pending', 'voting') AND expires_at <= $1 \
             ORDER BY expires_at"
        );
        let rows = sqlx::query_as::<_, ProposalRow>(&sql)
            .bind(now)
            .fetch_all(self.pool())
            .await?;
        into_proposals(rows)
    }

    async fn find_unapplied_approved(&self) -> Result<Vec<Proposal>, AppError> {
        let sql = format!(
            "SELECT {PROPOSAL_COLUMNS} FROM activity_proposals \
             WHERE status = 'approved' AND applied_at IS NULL \
             ORDER BY resolved_at, id"
        );
        let rows = sqlx::query_as::<_, ProposalRow>(&sql)
            .fetch_all(self.pool())
            .await?;
        into_proposals(rows)
    }
}
