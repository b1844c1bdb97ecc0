//! PostGIS candidate locator.
//!
//! An agent is a candidate for a request when it is online, has the
//! service type enabled, and shares an operating zone with the request's
//! origin. Results are nearest first by geodesic distance.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use fixin_core::{AgentId, GeoPoint, ServiceTypeId};
use fixin_dispatch::{Candidate, CandidateLocator, StoreError};

use super::store_error;

const CANDIDATES_SQL: &str = "
    WITH origin AS (
        SELECT ST_SetSRID(ST_MakePoint($2, $3), 4326)::geography AS point
    )
    SELECT a.id, a.push_token, ST_Distance(a.location, origin.point) AS distance_m
    FROM agents a
    CROSS JOIN origin
    JOIN agent_services s
      ON s.agent_id = a.id AND s.service_type_id = $1 AND s.enabled
    WHERE a.status = 'online'
      AND a.location IS NOT NULL
      AND EXISTS (
          SELECT 1 FROM operating_zones z
          WHERE ST_Intersects(z.area, a.location)
            AND ST_Intersects(z.area, origin.point)
      )
    ORDER BY distance_m ASC";

#[derive(Debug, Clone)]
pub struct PgLocator {
    pool: PgPool,
}

impl PgLocator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CandidateLocator for PgLocator {
    async fn candidates(
        &self,
        service_type: ServiceTypeId,
        origin: GeoPoint,
    ) -> Result<Vec<Candidate>, StoreError> {
        let rows: Vec<(Uuid, Option<String>, f64)> = sqlx::query_as(CANDIDATES_SQL)
            .bind(service_type.0)
            .bind(origin.longitude())
            .bind(origin.latitude())
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(rows
            .into_iter()
            .map(|(id, push_token, distance_m)| Candidate::new(AgentId(id), push_token, distance_m))
            .collect())
    }
}
