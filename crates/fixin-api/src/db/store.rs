//! PostgreSQL dispatch store.
//!
//! [`PgStore`] serves plain reads from the pool; [`PgTx`] wraps one SQLx
//! transaction with a transaction-local `lock_timeout`, so every lock wait
//! is bounded and a lost wait surfaces as [`StoreError::LockTimeout`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use fixin_core::{
    AgentId, ClientId, Credits, GeoPoint, LedgerEntryId, Rating, RequestId, ServiceTypeId,
};
use fixin_dispatch::{
    AgentProfile, AgentStatus, ClientProfile, DispatchStore, DispatchTx, PendingOffer,
    ServiceType, StoreError,
};
use fixin_state::{
    AgentRating, Assignment, BucketKind, CancelInitiator, CancellationRecord, CompletionRecord,
    LedgerEntry, LedgerReason, RequestBucket, RequestSnapshot, ServiceRequest,
};

use super::store_error;

/// Requests joined with whichever bucket table currently holds each one.
const REQUEST_FROM: &str = "
    SELECT r.id, r.client_id, r.service_type_id, r.latitude, r.longitude, r.details, r.created_at,
           p.expires_at,
           a.agent_id AS assigned_agent_id, a.fee, a.assigned_at,
           c.agent_id AS completed_agent_id, c.client_rating, c.client_comment,
           c.agent_rating, c.agent_comment, c.agent_rated_at, c.completed_at,
           x.initiator, x.agent_id AS cancelled_agent_id, x.reason AS cancel_reason,
           x.refund, x.cancelled_at
    FROM service_requests r
    LEFT JOIN pending_requests p ON p.request_id = r.id
    LEFT JOIN assigned_requests a ON a.request_id = r.id
    LEFT JOIN completed_requests c ON c.request_id = r.id
    LEFT JOIN cancelled_requests x ON x.request_id = r.id";

const PENDING_FOR_AGENT_SQL: &str = "
    SELECT r.id, r.client_id, r.service_type_id, r.latitude, r.longitude, r.details, r.created_at,
           p.expires_at, st.name AS service_name,
           ST_Distance(ag.location, r.origin) AS distance_m
    FROM pending_requests p
    JOIN service_requests r ON r.id = p.request_id
    JOIN service_types st ON st.id = r.service_type_id
    JOIN agent_services s
      ON s.service_type_id = r.service_type_id AND s.agent_id = $1 AND s.enabled
    JOIN agents ag ON ag.id = $1 AND ag.location IS NOT NULL
    WHERE p.expires_at > $2
      AND EXISTS (
          SELECT 1 FROM operating_zones z
          WHERE ST_Intersects(z.area, ag.location)
            AND ST_Intersects(z.area, r.origin)
      )
    ORDER BY distance_m ASC, r.created_at ASC, r.id ASC
    LIMIT $3 OFFSET $4";

fn request_by_id_sql() -> String {
    format!("{REQUEST_FROM} WHERE r.id = $1")
}

const LEDGER_COLUMNS: &str = "id, agent_id, amount, reason, request_id, created_at";

// ── Store ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DispatchStore for PgStore {
    async fn begin(&self, lock_timeout: Duration) -> Result<Box<dyn DispatchTx>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", lock_timeout.as_millis().max(1)))
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn client(&self, id: ClientId) -> Result<Option<ClientProfile>, StoreError> {
        let row = sqlx::query_as::<_, ClientRow>(
            "SELECT id, display_name, push_token, profile_complete FROM clients WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(row.map(ClientRow::into_profile))
    }

    async fn agent(&self, id: AgentId) -> Result<Option<AgentProfile>, StoreError> {
        let row = sqlx::query_as::<_, AgentRow>(
            "SELECT id, display_name, push_token, status, balance FROM agents WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;
        row.map(AgentRow::into_profile).transpose()
    }

    async fn service_type(&self, id: ServiceTypeId) -> Result<Option<ServiceType>, StoreError> {
        let row: Option<(Uuid, String)> =
            sqlx::query_as("SELECT id, name FROM service_types WHERE id = $1")
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_error)?;
        Ok(row.map(|(id, name)| ServiceType {
            id: ServiceTypeId(id),
            name,
        }))
    }

    async fn snapshot(&self, id: RequestId) -> Result<Option<RequestSnapshot>, StoreError> {
        let sql = request_by_id_sql();
        let row = sqlx::query_as::<_, RequestRow>(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        row.map(RequestRow::into_snapshot).transpose()
    }

    async fn ledger_for_agent(
        &self,
        agent: AgentId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let sql = format!(
            "SELECT {LEDGER_COLUMNS} FROM ledger_entries WHERE agent_id = $1
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query_as::<_, LedgerRow>(&sql)
            .bind(agent.0)
            .bind(i64::from(limit))
            .bind(i64::from(offset))
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        rows.into_iter().map(LedgerRow::into_entry).collect()
    }

    async fn pending_for_agent(
        &self,
        agent: AgentId,
        now: DateTime<Utc>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<PendingOffer>, StoreError> {
        let rows = sqlx::query_as::<_, PendingRow>(PENDING_FOR_AGENT_SQL)
            .bind(agent.0)
            .bind(now)
            .bind(i64::from(limit))
            .bind(i64::from(offset))
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        rows.into_iter().map(PendingRow::into_offer).collect()
    }

    async fn active_for_agent(
        &self,
        agent: AgentId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<RequestSnapshot>, StoreError> {
        let sql = format!(
            "{REQUEST_FROM} WHERE a.agent_id = $1
             ORDER BY a.assigned_at DESC, r.id DESC LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query_as::<_, RequestRow>(&sql)
            .bind(agent.0)
            .bind(i64::from(limit))
            .bind(i64::from(offset))
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        rows.into_iter().map(RequestRow::into_snapshot).collect()
    }

    async fn requests_for_client(
        &self,
        client: ClientId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<RequestSnapshot>, StoreError> {
        let sql = format!(
            "{REQUEST_FROM} WHERE r.client_id = $1
             ORDER BY COALESCE(x.cancelled_at, c.completed_at, a.assigned_at, r.created_at) DESC,
                      r.id DESC
             LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query_as::<_, RequestRow>(&sql)
            .bind(client.0)
            .bind(i64::from(limit))
            .bind(i64::from(offset))
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        rows.into_iter().map(RequestRow::into_snapshot).collect()
    }

    async fn expired_pending(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<RequestId>, StoreError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT request_id FROM pending_requests WHERE expires_at <= $1
             ORDER BY expires_at LIMIT $2",
        )
        .bind(now)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(ids.into_iter().map(RequestId).collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(())
    }
}

// ── Transaction ─────────────────────────────────────────────────────────────

/// One transition's unit of work. Dropping it without commit rolls back.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

impl PgTx {
    async fn lock_agent_balance(&mut self, agent: AgentId) -> Result<Credits, StoreError> {
        let balance: Option<Decimal> =
            sqlx::query_scalar("SELECT balance FROM agents WHERE id = $1 FOR UPDATE")
                .bind(agent.0)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(store_error)?;
        let balance = balance.ok_or_else(|| StoreError::Backend(format!("{agent} not found")))?;
        credits(balance)
    }

    async fn apply_ledger(&mut self, entry: &LedgerEntry) -> Result<(), StoreError> {
        sqlx::query("UPDATE agents SET balance = balance + $2 WHERE id = $1")
            .bind(entry.agent_id.0)
            .bind(entry.amount)
            .execute(&mut *self.tx)
            .await
            .map_err(store_error)?;
        sqlx::query(
            "INSERT INTO ledger_entries (id, agent_id, amount, reason, request_id, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(entry.id.0)
        .bind(entry.agent_id.0)
        .bind(entry.amount)
        .bind(entry.reason.as_str())
        .bind(entry.request_id.map(|r| r.0))
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    /// Delete the request's row from a bucket table, failing unless exactly
    /// one row moved.
    async fn leave_bucket(&mut self, request: RequestId, from: BucketKind) -> Result<(), StoreError> {
        let sql = match from {
            BucketKind::Pending => "DELETE FROM pending_requests WHERE request_id = $1",
            BucketKind::Assigned => "DELETE FROM assigned_requests WHERE request_id = $1",
            terminal => {
                return Err(StoreError::Backend(format!(
                    "{request} cannot leave terminal bucket {terminal}"
                )))
            }
        };
        let result = sqlx::query(sql)
            .bind(request.0)
            .execute(&mut *self.tx)
            .await
            .map_err(store_error)?;
        if result.rows_affected() != 1 {
            return Err(StoreError::Backend(format!("{request} is not {from}")));
        }
        Ok(())
    }
}

#[async_trait]
impl DispatchTx for PgTx {
    async fn lock_request(&mut self, id: RequestId) -> Result<Option<RequestSnapshot>, StoreError> {
        // Lock and read in separate statements: under READ COMMITTED the
        // second statement's snapshot is taken after the lock is granted,
        // so it sees whatever the previous holder committed.
        let locked: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM service_requests WHERE id = $1 FOR UPDATE")
                .bind(id.0)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(store_error)?;
        if locked.is_none() {
            return Ok(None);
        }
        let sql = request_by_id_sql();
        let row = sqlx::query_as::<_, RequestRow>(&sql)
            .bind(id.0)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(store_error)?;
        row.map(RequestRow::into_snapshot).transpose()
    }

    async fn agent_balance(&mut self, agent: AgentId) -> Result<Option<Credits>, StoreError> {
        let balance: Option<Decimal> = sqlx::query_scalar("SELECT balance FROM agents WHERE id = $1")
            .bind(agent.0)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(store_error)?;
        balance.map(credits).transpose()
    }

    async fn debit(
        &mut self,
        agent: AgentId,
        amount: Credits,
        request: Option<RequestId>,
        reason: LedgerReason,
    ) -> Result<Option<LedgerEntry>, StoreError> {
        let balance = self.lock_agent_balance(agent).await?;
        if !balance.covers(amount) {
            return Ok(None);
        }
        let entry = LedgerEntry::debit(agent, amount, reason, request, Utc::now());
        self.apply_ledger(&entry).await?;
        Ok(Some(entry))
    }

    async fn credit(
        &mut self,
        agent: AgentId,
        amount: Credits,
        request: Option<RequestId>,
        reason: LedgerReason,
    ) -> Result<LedgerEntry, StoreError> {
        self.lock_agent_balance(agent).await?;
        let entry = LedgerEntry::credit(agent, amount, reason, request, Utc::now());
        self.apply_ledger(&entry).await?;
        Ok(entry)
    }

    async fn acceptance_debit(
        &mut self,
        request: RequestId,
    ) -> Result<Option<LedgerEntry>, StoreError> {
        let sql = format!(
            "SELECT {LEDGER_COLUMNS} FROM ledger_entries
             WHERE request_id = $1 AND reason = $2
             ORDER BY created_at LIMIT 1"
        );
        let row = sqlx::query_as::<_, LedgerRow>(&sql)
            .bind(request.0)
            .bind(LedgerReason::AcceptanceFee.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(store_error)?;
        row.map(LedgerRow::into_entry).transpose()
    }

    async fn insert_pending(
        &mut self,
        request: &ServiceRequest,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO service_requests
                 (id, client_id, service_type_id, latitude, longitude, origin, details, created_at)
             VALUES ($1, $2, $3, $4, $5,
                     ST_SetSRID(ST_MakePoint($5, $4), 4326)::geography, $6, $7)",
        )
        .bind(request.id.0)
        .bind(request.client_id.0)
        .bind(request.service_type_id.0)
        .bind(request.origin.latitude())
        .bind(request.origin.longitude())
        .bind(&request.details)
        .bind(request.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(store_error)?;
        sqlx::query("INSERT INTO pending_requests (request_id, expires_at) VALUES ($1, $2)")
            .bind(request.id.0)
            .bind(expires_at)
            .execute(&mut *self.tx)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn move_to_assigned(&mut self, assignment: &Assignment) -> Result<(), StoreError> {
        self.leave_bucket(assignment.request_id, BucketKind::Pending)
            .await?;
        sqlx::query(
            "INSERT INTO assigned_requests (request_id, agent_id, fee, assigned_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(assignment.request_id.0)
        .bind(assignment.agent_id.0)
        .bind(assignment.fee.amount())
        .bind(assignment.assigned_at)
        .execute(&mut *self.tx)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn move_to_completed(&mut self, record: &CompletionRecord) -> Result<(), StoreError> {
        self.leave_bucket(record.request_id, BucketKind::Assigned)
            .await?;
        sqlx::query(
            "INSERT INTO completed_requests
                 (request_id, agent_id, client_rating, client_comment, completed_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(record.request_id.0)
        .bind(record.agent_id.0)
        .bind(i16::from(record.client_rating.stars()))
        .bind(&record.client_comment)
        .bind(record.completed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn move_to_cancelled(
        &mut self,
        from: BucketKind,
        record: &CancellationRecord,
    ) -> Result<(), StoreError> {
        self.leave_bucket(record.request_id, from).await?;
        sqlx::query(
            "INSERT INTO cancelled_requests
                 (request_id, initiator, agent_id, reason, refund, cancelled_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(record.request_id.0)
        .bind(record.initiator.as_str())
        .bind(record.agent_id.map(|a| a.0))
        .bind(&record.reason)
        .bind(record.refund.map(|r| r.amount()))
        .bind(record.cancelled_at)
        .execute(&mut *self.tx)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn record_agent_rating(
        &mut self,
        request: RequestId,
        rating: &AgentRating,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE completed_requests
             SET agent_rating = $2, agent_comment = $3, agent_rated_at = $4
             WHERE request_id = $1 AND agent_rating IS NULL",
        )
        .bind(request.0)
        .bind(i16::from(rating.rating.stars()))
        .bind(&rating.comment)
        .bind(rating.rated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(store_error)?;
        if result.rows_affected() != 1 {
            return Err(StoreError::Backend(format!(
                "{request} is not completed or already rated"
            )));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(store_error)
    }
}

// ── Row mapping ─────────────────────────────────────────────────────────────

fn corrupt(what: impl std::fmt::Display, detail: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("corrupt row for {what}: {detail}"))
}

fn credits(amount: Decimal) -> Result<Credits, StoreError> {
    Credits::new(amount).map_err(|e| corrupt("credit amount", e))
}

fn rating(stars: i16) -> Result<Rating, StoreError> {
    Rating::new(i64::from(stars)).map_err(|e| corrupt("rating", e))
}

#[derive(sqlx::FromRow)]
struct ClientRow {
    id: Uuid,
    display_name: String,
    push_token: Option<String>,
    profile_complete: bool,
}

impl ClientRow {
    fn into_profile(self) -> ClientProfile {
        ClientProfile {
            id: ClientId(self.id),
            display_name: self.display_name,
            push_token: self.push_token,
            profile_complete: self.profile_complete,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AgentRow {
    id: Uuid,
    display_name: String,
    push_token: Option<String>,
    status: String,
    balance: Decimal,
}

impl AgentRow {
    fn into_profile(self) -> Result<AgentProfile, StoreError> {
        let status = match self.status.as_str() {
            "online" => AgentStatus::Online,
            "offline" => AgentStatus::Offline,
            other => return Err(corrupt(AgentId(self.id), format!("status {other}"))),
        };
        Ok(AgentProfile {
            id: AgentId(self.id),
            display_name: self.display_name,
            push_token: self.push_token,
            status,
            balance: credits(self.balance)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LedgerRow {
    id: Uuid,
    agent_id: Uuid,
    amount: Decimal,
    reason: String,
    request_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl LedgerRow {
    fn into_entry(self) -> Result<LedgerEntry, StoreError> {
        let reason = LedgerReason::parse(&self.reason)
            .ok_or_else(|| corrupt(LedgerEntryId(self.id), format!("reason {}", self.reason)))?;
        Ok(LedgerEntry {
            id: LedgerEntryId(self.id),
            agent_id: AgentId(self.agent_id),
            amount: self.amount,
            reason,
            request_id: self.request_id.map(RequestId),
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PendingRow {
    id: Uuid,
    client_id: Uuid,
    service_type_id: Uuid,
    latitude: f64,
    longitude: f64,
    details: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    service_name: String,
    distance_m: f64,
}

impl PendingRow {
    fn into_offer(self) -> Result<PendingOffer, StoreError> {
        let request_id = RequestId(self.id);
        let origin =
            GeoPoint::new(self.latitude, self.longitude).map_err(|e| corrupt(request_id, e))?;
        Ok(PendingOffer {
            request: ServiceRequest {
                id: request_id,
                client_id: ClientId(self.client_id),
                service_type_id: ServiceTypeId(self.service_type_id),
                origin,
                details: self.details,
                created_at: self.created_at,
            },
            expires_at: self.expires_at,
            service_name: self.service_name,
            distance_m: self.distance_m,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RequestRow {
    id: Uuid,
    client_id: Uuid,
    service_type_id: Uuid,
    latitude: f64,
    longitude: f64,
    details: String,
    created_at: DateTime<Utc>,

    expires_at: Option<DateTime<Utc>>,

    assigned_agent_id: Option<Uuid>,
    fee: Option<Decimal>,
    assigned_at: Option<DateTime<Utc>>,

    completed_agent_id: Option<Uuid>,
    client_rating: Option<i16>,
    client_comment: Option<String>,
    agent_rating: Option<i16>,
    agent_comment: Option<String>,
    agent_rated_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,

    initiator: Option<String>,
    cancelled_agent_id: Option<Uuid>,
    cancel_reason: Option<String>,
    refund: Option<Decimal>,
    cancelled_at: Option<DateTime<Utc>>,
}

impl RequestRow {
    fn into_snapshot(self) -> Result<RequestSnapshot, StoreError> {
        let request_id = RequestId(self.id);
        let origin =
            GeoPoint::new(self.latitude, self.longitude).map_err(|e| corrupt(request_id, e))?;
        let bucket = self.bucket(request_id)?;
        Ok(RequestSnapshot {
            request: ServiceRequest {
                id: request_id,
                client_id: ClientId(self.client_id),
                service_type_id: ServiceTypeId(self.service_type_id),
                origin,
                details: self.details,
                created_at: self.created_at,
            },
            bucket,
        })
    }

    fn bucket(&self, request_id: RequestId) -> Result<RequestBucket, StoreError> {
        if let Some(expires_at) = self.expires_at {
            return Ok(RequestBucket::Pending { expires_at });
        }
        if let (Some(agent), Some(fee), Some(assigned_at)) =
            (self.assigned_agent_id, self.fee, self.assigned_at)
        {
            return Ok(RequestBucket::Assigned(Assignment {
                request_id,
                agent_id: AgentId(agent),
                fee: credits(fee)?,
                assigned_at,
            }));
        }
        if let (Some(agent), Some(stars), Some(completed_at)) =
            (self.completed_agent_id, self.client_rating, self.completed_at)
        {
            let agent_rating = match (self.agent_rating, self.agent_rated_at) {
                (Some(stars), Some(rated_at)) => Some(AgentRating {
                    rating: rating(stars)?,
                    comment: self.agent_comment.clone().unwrap_or_default(),
                    rated_at,
                }),
                _ => None,
            };
            return Ok(RequestBucket::Completed(CompletionRecord {
                request_id,
                agent_id: AgentId(agent),
                client_rating: rating(stars)?,
                client_comment: self.client_comment.clone().unwrap_or_default(),
                agent_rating,
                completed_at,
            }));
        }
        if let (Some(initiator), Some(cancelled_at)) = (&self.initiator, self.cancelled_at) {
            let initiator = CancelInitiator::parse(initiator)
                .ok_or_else(|| corrupt(request_id, format!("initiator {initiator}")))?;
            return Ok(RequestBucket::Cancelled(CancellationRecord {
                request_id,
                initiator,
                agent_id: self.cancelled_agent_id.map(AgentId),
                reason: self.cancel_reason.clone().unwrap_or_default(),
                refund: self.refund.map(credits).transpose()?,
                cancelled_at,
            }));
        }
        Err(corrupt(request_id, "no lifecycle bucket"))
    }
}
