use chrono::{DateTime, Utc};

use super::types::*;
use crate::db::{PgStore, decode};
use crate::errors::AppError;
use crate::store::VoteStore;

#[derive(sqlx::FromRow)]
struct VoteRow {
    id: i64,
    proposal_id: i64,
    user_id: i64,
    vote_type: String,
    comment: Option<String>,
    voted_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<VoteRow> for Vote {
    type Error = AppError;

    fn try_from(row: VoteRow) -> Result<Self, Self::Error> {
        Ok(Vote {
            id: row.id,
            proposal_id: row.proposal_id,
            user_id: row.user_id,
            vote_type: decode("vote_type", &row.vote_type)?,
            comment: row.comment,
            voted_at: row.voted_at,
            updated_at: row.updated_at,
        })
    }
}

impl VoteStore for PgStore {
    async fn upsert_vote(&self, upsert: &VoteUpsert) -> Result<Option<(Vote, bool)>, AppError> {
        #[derive(sqlx::FromRow)]
        struct UpsertRow {
            #[sqlx(flatten)]
            vote: VoteRow,
            is_update: bool,
        }

        // The row lock on the proposal serializes the upsert against a
        // concurrent status change, so no vote lands on a closed proposal.
        let row = sqlx::query_as::<_, UpsertRow>(
            "INSERT INTO proposal_votes (proposal_id, user_id, vote_type, comment, voted_at, updated_at) \
             SELECT $1, $2, $3, $4, $5, $5 \
             WHERE EXISTS ( \
                 SELECT 1 FROM activity_proposals \
                 WHERE id = $1 AND status IN ('pending', 'voting') \
                 FOR SHARE) \
             ON CONFLICT (proposal_id, user_id) DO UPDATE \
                 SET vote_type = EXCLUDED.vote_type, \
                     comment = EXCLUDED.comment, \
                     updated_at = EXCLUDED.updated_at \
             RETURNING id, proposal_id, user_id, vote_type, comment, voted_at, updated_at, \
                       NOT (xmax = 0) AS is_update",
        )
        .bind(upsert.proposal_id)
        .bind(upsert.user_id)
        .bind(upsert.vote_type.as_str())
        .bind(upsert.comment.as_deref())
        .bind(upsert.at)
        .fetch_optional(self.pool())
        .await?;

        match row {
            Some(r) => Ok(Some((Vote::try_from(r.vote)?, r.is_update))),
            None => Ok(None),
        }
    }

    async fn delete_vote(&self, proposal_id: i64, user_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query(
            "DELETE FROM proposal_votes v \
             USING activity_proposals p \
             WHERE v.proposal_id = p.id \
               AND v.proposal_id = $1 AND v.user_id = $2 \
               AND p.status IN ('pending', 'voting')",
        )
        .bind(proposal_id)
        .bind(user_id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_votes(&self, proposal_id: i64) -> Result<Vec<Vote>, AppError> {
        let rows = sqlx::query_as::<_, VoteRow>(
            "SELECT id, proposal_id, user_id, vote_type, comment, voted_at, updated_at \
             FROM proposal_votes WHERE proposal_id = $1 \
             ORDER BY voted_at, id",
        )
        .bind(proposal_id)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(Vote::try_from).collect()
    }

    async fn find_votes_for(&self, proposal_ids: &[i64]) -> Result<Vec<Vote>, AppError> {
        if proposal_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, VoteRow>(
            "SELECT id, proposal_id, user_id, vote_type, comment, voted_at, updated_at \
             FROM proposal_votes WHERE proposal_id = ANY($1) \
             ORDER BY voted_at, id",
        )
        .bind(proposal_ids)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(Vote::try_from).collect()
    }
}
