//! User credentials and saved-route persistence.

use optimaldn_common::schema::UserSavedRoute;
use sqlx::PgPool;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

type SavedRouteRow = (
    Uuid,
    String,
    String,
    String,
    String,
    i32,
    i32,
    Vec<String>,
    Vec<String>,
);

fn from_row(row: SavedRouteRow) -> UserSavedRoute {
    let (
        route_id,
        user_id,
        start_point,
        end_point,
        transport_mode,
        stops,
        estimated_time,
        line_names,
        stops_names,
    ) = row;
    UserSavedRoute {
        route_id,
        user_id,
        start_point,
        end_point,
        transport_mode,
        stops,
        estimated_time,
        line_names,
        stops_names,
    }
}

const SAVED_ROUTE_COLUMNS: &str = "route_id, user_id, start_point, end_point, transport_mode, \
    stops, estimated_time, line_names, stops_names";

pub struct UserStore {
    pool: PgPool,
}

impl UserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn password_hash(&self, username: &str) -> Result<Option<String>, StoreError> {
        let hash = sqlx::query_scalar::<_, String>(
            "SELECT password_hash FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(hash)
    }

    /// Insert a favorite; duplicates per `(user, start, end, mode)` are
    /// silently ignored.
    pub async fn insert_saved_route(&self, route: &UserSavedRoute) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO user_saved_routes \
             (route_id, user_id, start_point, end_point, transport_mode, \
              stops, estimated_time, line_names, stops_names) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (user_id, start_point, end_point, transport_mode) DO NOTHING",
        )
        .bind(route.route_id)
        .bind(&route.user_id)
        .bind(&route.start_point)
        .bind(&route.end_point)
        .bind(&route.transport_mode)
        .bind(route.stops)
        .bind(route.estimated_time)
        .bind(&route.line_names)
        .bind(&route.stops_names)
        .execute(&self.pool)
        .await?;
        debug!(user_id = %route.user_id, route_id = %route.route_id, "favorite route saved");
        Ok(())
    }

    pub async fn saved_routes(&self, user_id: &str) -> Result<Vec<UserSavedRoute>, StoreError> {
        let rows = sqlx::query_as::<_, SavedRouteRow>(&format!(
            "SELECT {SAVED_ROUTE_COLUMNS} FROM user_saved_routes WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(from_row).collect())
    }

    pub async fn saved_route(
        &self,
        user_id: &str,
        route_id: Uuid,
    ) -> Result<Option<UserSavedRoute>, StoreError> {
        let row = sqlx::query_as::<_, SavedRouteRow>(&format!(
            "SELECT {SAVED_ROUTE_COLUMNS} FROM user_saved_routes \
             WHERE user_id = $1 AND route_id = $2"
        ))
        .bind(user_id)
        .bind(route_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(from_row))
    }
}
