//! Per-user chosen-route persistence. `put` is an unconditional overwrite;
//! the planner serializes each user's operations, so there are no concurrent
//! writers for one key.

use optimaldn_common::schema::UserRoute;
use sqlx::PgPool;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("stored route legs are corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

pub struct RouteStore {
    pool: PgPool,
}

impl RouteStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, user_id: &str) -> Result<Option<UserRoute>, StateError> {
        let row = sqlx::query_as::<_, (i32, String, serde_json::Value)>(
            "SELECT total_duration, description, legs FROM chosen_routes WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some((total_duration, description, legs)) => Ok(Some(UserRoute {
                user_id: user_id.to_string(),
                total_duration,
                description,
                legs: serde_json::from_value(legs)?,
            })),
            None => Ok(None),
        }
    }

    pub async fn put(&self, route: &UserRoute) -> Result<(), StateError> {
        let legs = serde_json::to_value(&route.legs)?;
        sqlx::query(
            "INSERT INTO chosen_routes (user_id, total_duration, description, legs) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (user_id) DO UPDATE SET \
                 total_duration = EXCLUDED.total_duration, \
                 description = EXCLUDED.description, \
                 legs = EXCLUDED.legs",
        )
        .bind(&route.user_id)
        .bind(route.total_duration)
        .bind(&route.description)
        .bind(legs)
        .execute(&self.pool)
        .await?;
        debug!(user_id = %route.user_id, legs = route.legs.len(), "chosen route saved");
        Ok(())
    }

    pub async fn delete(&self, user_id: &str) -> Result<(), StateError> {
        sqlx::query("DELETE FROM chosen_routes WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
