use sqlx::types::Json;

use super::types::*;
use crate::db::{PgStore, decode};
use crate::errors::AppError;
use crate::store::{ItineraryStore, TripStore};

impl TripStore for PgStore {
    async fn find_trip(&self, trip_id: i64) -> Result<Option<Trip>, AppError> {
        let trip = sqlx::query_as::<_, Trip>("SELECT id, owner_id, title FROM trips WHERE id = $1")
            .bind(trip_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(trip)
    }

    async fn find_collaborators(&self, trip_id: i64) -> Result<Vec<Collaborator>, AppError> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT user_id, role FROM trip_collaborators \
             WHERE trip_id = $1 \
             ORDER BY joined_at, user_id",
        )
        .bind(trip_id)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|(user_id, role)| {
                Ok(Collaborator {
                    user_id,
                    role: decode("role", &role)?,
                })
            })
            .collect()
    }
}

impl ItineraryStore for PgStore {
    async fn load_itinerary(&self, trip_id: i64) -> Result<Option<Itinerary>, AppError> {
        let row: Option<(Json<Vec<ItineraryDay>>, i64)> =
            sqlx::query_as("SELECT itinerary, itinerary_version FROM trips WHERE id = $1")
                .bind(trip_id)
                .fetch_optional(self.pool())
                .await?;

        Ok(row.map(|(Json(days), version)| Itinerary { days, version }))
    }

    async fn save_itinerary(
        &self,
        trip_id: i64,
        expected_version: i64,
        days: &[ItineraryDay],
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE trips \
             SET itinerary = $3, itinerary_version = itinerary_version + 1 \
             WHERE id = $1 AND itinerary_version = $2",
        )
        .bind(trip_id)
        .bind(expected_version)
        .bind(Json(days))
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
