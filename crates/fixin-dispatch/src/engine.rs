//! # Dispatch Engine
//!
//! Owns the request lifecycle. Each transition runs in exactly one store
//! transaction:
//!
//! 1. lock the request (bounded wait, timeout surfaces as a conflict),
//! 2. run the guard from `fixin-state` against the locked snapshot,
//! 3. stage bucket moves and ledger entries,
//! 4. commit.
//!
//! Fanout and push notifications happen strictly after commit. Fanout is
//! published synchronously before the operation returns. Pushes run on
//! detached tasks and their outcome is only logged.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;

use fixin_core::{
    bounded_text, AgentId, ClientId, GeoPoint, Rating, RequestId, ServiceTypeId, ValidationError,
};
use fixin_state::{
    Actor, AgentRating, Assignment, BucketKind, CancelInitiator, CancellationRecord,
    CompletionRecord, LedgerEntry, LedgerReason, RequestSnapshot, ServiceRequest,
    REASON_MAX_CHARS,
};

use crate::config::DispatchConfig;
use crate::error::DispatchError;
use crate::fanout::{events, FanoutChannel, FanoutEvent, Topic};
use crate::locator::{Candidate, CandidateLocator};
use crate::notify::{send_detached, Notifier, PushMessage};
use crate::store::{DispatchStore, PendingOffer};

/// Default and maximum page sizes for the paginated reads.
pub const PAGE_SIZE_DEFAULT: u32 = 20;
pub const PAGE_SIZE_MAX: u32 = 100;

/// Upper bound on requests the reaper expires per sweep.
const EXPIRE_BATCH: u32 = 100;

/// The request dispatch and lifecycle engine.
///
/// Collaborators are injected at construction so tests can substitute
/// in-memory stores and recording fanout/notifiers.
pub struct DispatchEngine {
    store: Arc<dyn DispatchStore>,
    locator: Arc<dyn CandidateLocator>,
    fanout: Arc<dyn FanoutChannel>,
    notifier: Arc<dyn Notifier>,
    config: DispatchConfig,
}

impl std::fmt::Debug for DispatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DispatchEngine {
    pub fn new(
        store: Arc<dyn DispatchStore>,
        locator: Arc<dyn CandidateLocator>,
        fanout: Arc<dyn FanoutChannel>,
        notifier: Arc<dyn Notifier>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            store,
            locator,
            fanout,
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn DispatchStore> {
        &self.store
    }

    // ─── Create ──────────────────────────────────────────────────────

    /// Persist a new request as `Pending` and announce it to candidates.
    pub async fn create_request(
        &self,
        client_id: ClientId,
        service_type_id: ServiceTypeId,
        origin: GeoPoint,
        details: &str,
    ) -> Result<RequestId, DispatchError> {
        let now = Utc::now();
        let request = ServiceRequest::new(client_id, service_type_id, origin, details, now)?;

        let client = self
            .store
            .client(client_id)
            .await?
            .ok_or_else(|| DispatchError::NotFound(client_id.to_string()))?;
        if !client.profile_complete {
            return Err(ValidationError::ProfileIncomplete("client").into());
        }
        let service = self
            .store
            .service_type(service_type_id)
            .await?
            .ok_or_else(|| DispatchError::NotFound(service_type_id.to_string()))?;

        let expires_at = now + self.config.pending_expiry;
        let mut tx = self.store.begin(self.config.lock_timeout).await?;
        tx.insert_pending(&request, expires_at).await?;
        tx.commit().await?;

        tracing::info!(
            request_id = %request.id,
            client_id = %client_id,
            service = %service.name,
            "request created"
        );

        let candidates = self.find_candidates(service_type_id, origin).await;
        for candidate in &candidates {
            self.fanout.publish(
                candidate.channel,
                FanoutEvent::new(
                    events::NEW_REQUEST,
                    json!({
                        "request_id": request.id,
                        "service_type_id": service_type_id,
                        "service_name": service.name,
                        "distance_m": candidate.distance_m,
                        "details": request.details,
                        "latitude": origin.latitude(),
                        "longitude": origin.longitude(),
                        "expires_at": expires_at,
                    }),
                ),
            );
            self.push(
                candidate.push_token.clone(),
                "New request available",
                format!("{} requested {:.1} km away", service.name, candidate.distance_m / 1000.0),
                json!({ "request_id": request.id, "event": events::NEW_REQUEST }),
            );
        }
        tracing::debug!(request_id = %request.id, candidates = candidates.len(), "new request fanned out");

        Ok(request.id)
    }

    // ─── Accept ──────────────────────────────────────────────────────

    /// Claim a pending request for `agent_id`, debiting the acceptance fee.
    ///
    /// Exactly one of several concurrent accepts on the same request
    /// succeeds; the rest see the request outside `Pending` once they get
    /// the lock, or time out waiting for it, and report
    /// [`DispatchError::RequestUnavailable`].
    pub async fn accept_request(
        &self,
        agent_id: AgentId,
        request_id: RequestId,
    ) -> Result<Assignment, DispatchError> {
        let fee = self.config.acceptance_fee;
        let now = Utc::now();

        let mut tx = self.store.begin(self.config.lock_timeout).await?;

        let balance = tx
            .agent_balance(agent_id)
            .await?
            .ok_or_else(|| DispatchError::NotFound(agent_id.to_string()))?;
        if !balance.covers(fee) {
            tracing::debug!(%agent_id, %request_id, %balance, "accept rejected, balance below fee");
            return Err(DispatchError::InsufficientBalance {
                balance,
                required: fee,
            });
        }

        let snapshot = tx
            .lock_request(request_id)
            .await?
            .ok_or_else(|| DispatchError::NotFound(request_id.to_string()))?;
        let assignment = snapshot.assign(agent_id, fee, now).map_err(|e| {
            tracing::debug!(%agent_id, %request_id, error = %e, "accept rejected");
            DispatchError::from(e)
        })?;

        // The balance read above was unlocked; the debit re-checks under the agent lock.
        let debit = tx
            .debit(agent_id, fee, Some(request_id), LedgerReason::AcceptanceFee)
            .await?
            .ok_or(DispatchError::InsufficientBalance {
                balance,
                required: fee,
            })?;
        tx.move_to_assigned(&assignment).await?;
        tx.commit().await?;

        tracing::info!(
            %request_id,
            %agent_id,
            fee = %fee,
            ledger_entry = %debit.id,
            "request accepted"
        );

        let agent_name = match self.store.agent(agent_id).await {
            Ok(Some(agent)) => agent.display_name,
            Ok(None) => String::new(),
            Err(e) => {
                tracing::warn!(%agent_id, error = %e, "agent lookup after accept failed");
                String::new()
            }
        };

        self.fanout.publish(
            Topic::Request(request_id),
            FanoutEvent::new(
                events::REQUEST_ACCEPTED,
                json!({
                    "request_id": request_id,
                    "agent_id": agent_id,
                    "agent_name": agent_name,
                    "assigned_at": assignment.assigned_at,
                }),
            ),
        );
        let others = self
            .find_candidates(snapshot.request.service_type_id, snapshot.request.origin)
            .await;
        for candidate in others.iter().filter(|c| c.agent_id != agent_id) {
            self.fanout.publish(
                candidate.channel,
                FanoutEvent::new(events::REQUEST_TAKEN, json!({ "request_id": request_id })),
            );
        }

        let client_token = self.client_token(snapshot.request.client_id).await;
        self.push(
            client_token,
            "Your request was accepted",
            format!("{agent_name} is on the way"),
            json!({ "request_id": request_id, "event": events::REQUEST_ACCEPTED }),
        );

        Ok(assignment)
    }

    // ─── Complete ────────────────────────────────────────────────────

    /// Finish an assigned request, recording the agent's rating of the
    /// client. Only the bound agent may complete.
    pub async fn complete_request(
        &self,
        agent_id: AgentId,
        request_id: RequestId,
        client_rating: Rating,
        comment: &str,
    ) -> Result<CompletionRecord, DispatchError> {
        let comment = bounded_text("comment", comment, REASON_MAX_CHARS)?;
        let now = Utc::now();

        let mut tx = self.store.begin(self.config.lock_timeout).await?;
        let snapshot = tx
            .lock_request(request_id)
            .await?
            .ok_or_else(|| DispatchError::NotFound(request_id.to_string()))?;
        let record = snapshot
            .complete(agent_id, client_rating, &comment, now)
            .map_err(|e| {
                tracing::debug!(%agent_id, %request_id, error = %e, "complete rejected");
                DispatchError::from(e)
            })?;
        tx.move_to_completed(&record).await?;
        tx.commit().await?;

        tracing::info!(%request_id, %agent_id, rating = record.client_rating.stars(), "request completed");

        self.fanout.publish(
            Topic::Request(request_id),
            FanoutEvent::new(
                events::SERVICE_COMPLETED,
                json!({
                    "request_id": request_id,
                    "agent_id": agent_id,
                    "completed_at": record.completed_at,
                }),
            ),
        );
        let client_token = self.client_token(snapshot.request.client_id).await;
        self.push(
            client_token,
            "Service completed",
            "Your service has been completed. Rate your agent!".to_string(),
            json!({ "request_id": request_id, "event": events::SERVICE_COMPLETED }),
        );

        Ok(record)
    }

    // ─── Cancel ──────────────────────────────────────────────────────

    /// Cancel a request on behalf of `actor`.
    ///
    /// From `Assigned`, the acceptance debit is reversed by a compensating
    /// credit in the same transaction. From `Pending`, the withdrawal is
    /// broadcast so candidates drop it.
    pub async fn cancel_request(
        &self,
        actor: Actor,
        request_id: RequestId,
        reason: &str,
    ) -> Result<CancellationRecord, DispatchError> {
        let reason = bounded_text("reason", reason, REASON_MAX_CHARS)?;
        self.cancel_at(actor, request_id, &reason, Utc::now()).await
    }

    async fn cancel_at(
        &self,
        actor: Actor,
        request_id: RequestId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<CancellationRecord, DispatchError> {
        let mut tx = self.store.begin(self.config.lock_timeout).await?;
        let snapshot = tx
            .lock_request(request_id)
            .await?
            .ok_or_else(|| DispatchError::NotFound(request_id.to_string()))?;
        let from = snapshot.kind();
        let mut record = snapshot.cancel(actor, reason, now).map_err(|e| {
            tracing::debug!(%request_id, ?actor, error = %e, "cancel rejected");
            DispatchError::from(e)
        })?;

        let mut refund_entry: Option<LedgerEntry> = None;
        if let (Some(agent_id), Some(fee)) = (record.agent_id, record.refund) {
            // Refund what was actually debited, not the current configured fee.
            let amount = match tx.acceptance_debit(request_id).await? {
                Some(debit) => debit.magnitude(),
                None => fee,
            };
            let entry = tx
                .credit(
                    agent_id,
                    amount,
                    Some(request_id),
                    LedgerReason::CancellationRefund,
                )
                .await?;
            record.refund = Some(amount);
            refund_entry = Some(entry);
        }
        tx.move_to_cancelled(from, &record).await?;
        tx.commit().await?;

        tracing::info!(
            %request_id,
            initiator = %record.initiator,
            from = %from,
            refund = ?record.refund.map(|c| c.to_string()),
            ledger_entry = ?refund_entry.as_ref().map(|e| e.id.to_string()),
            "request cancelled"
        );

        match from {
            BucketKind::Assigned => self.announce_assigned_cancel(&snapshot, &record).await,
            _ => self.announce_withdrawal(&snapshot, &record).await,
        }

        Ok(record)
    }

    async fn announce_assigned_cancel(
        &self,
        snapshot: &RequestSnapshot,
        record: &CancellationRecord,
    ) {
        let request_id = snapshot.request.id;
        self.fanout.publish(
            Topic::Request(request_id),
            FanoutEvent::new(
                events::REQUEST_CANCELLED,
                json!({
                    "request_id": request_id,
                    "initiator": record.initiator,
                    "reason": record.reason,
                    "cancelled_at": record.cancelled_at,
                }),
            ),
        );

        let data = json!({ "request_id": request_id, "event": events::REQUEST_CANCELLED });
        let body = format!("Reason: {}", record.reason);
        match record.initiator {
            CancelInitiator::Client => {
                if let Some(agent_id) = record.agent_id {
                    let token = self.agent_token(agent_id).await;
                    self.push(token, "Request cancelled by client", body, data);
                }
            }
            CancelInitiator::Agent => {
                let token = self.client_token(snapshot.request.client_id).await;
                self.push(token, "Your agent cancelled the service", body, data);
            }
            CancelInitiator::System => {}
        }
    }

    async fn announce_withdrawal(&self, snapshot: &RequestSnapshot, record: &CancellationRecord) {
        let request_id = snapshot.request.id;
        let event = FanoutEvent::new(
            events::REQUEST_WITHDRAWN,
            json!({
                "request_id": request_id,
                "initiator": record.initiator,
            }),
        );
        self.fanout.publish(Topic::Request(request_id), event.clone());
        let candidates = self
            .find_candidates(snapshot.request.service_type_id, snapshot.request.origin)
            .await;
        for candidate in &candidates {
            self.fanout.publish(candidate.channel, event.clone());
        }
    }

    // ─── Rating ──────────────────────────────────────────────────────

    /// Record the owning client's rating of the agent on a completed
    /// request. Allowed once. Does not touch the ledger.
    pub async fn rate_agent(
        &self,
        client_id: ClientId,
        request_id: RequestId,
        rating: Rating,
        comment: &str,
    ) -> Result<AgentRating, DispatchError> {
        let comment = bounded_text("comment", comment, REASON_MAX_CHARS)?;
        let now = Utc::now();

        let mut tx = self.store.begin(self.config.lock_timeout).await?;
        let snapshot = tx
            .lock_request(request_id)
            .await?
            .ok_or_else(|| DispatchError::NotFound(request_id.to_string()))?;
        let agent_rating = snapshot.rate_agent(client_id, rating, &comment, now)?;
        tx.record_agent_rating(request_id, &agent_rating).await?;
        tx.commit().await?;

        if let Some(agent_id) = snapshot.bucket.bound_agent() {
            tracing::info!(%request_id, %agent_id, rating = rating.stars(), "agent rated");
            self.fanout.publish(
                Topic::Agent(agent_id),
                FanoutEvent::new(
                    events::RATING_RECEIVED,
                    json!({
                        "request_id": request_id,
                        "rating": agent_rating.rating,
                        "comment": agent_rating.comment,
                    }),
                ),
            );
        }

        Ok(agent_rating)
    }

    // ─── Reads ───────────────────────────────────────────────────────

    /// The request with its current bucket, visible to the owning client
    /// and to the agent bound to it.
    pub async fn request_status(
        &self,
        viewer: Actor,
        request_id: RequestId,
    ) -> Result<RequestSnapshot, DispatchError> {
        let snapshot = self
            .store
            .snapshot(request_id)
            .await?
            .ok_or_else(|| DispatchError::NotFound(request_id.to_string()))?;
        if !snapshot.visible_to(viewer) {
            return Err(DispatchError::Unauthorized(
                "request belongs to another party".into(),
            ));
        }
        Ok(snapshot)
    }

    /// An agent's ledger, newest first. `page` is zero-based.
    pub async fn ledger_history(
        &self,
        agent_id: AgentId,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<Vec<LedgerEntry>, DispatchError> {
        let (limit, offset) = page_window(page, limit)?;
        Ok(self.store.ledger_for_agent(agent_id, limit, offset).await?)
    }

    /// Pending requests the agent could accept right now, nearest first.
    /// Expired requests are left out even before the reaper moves them.
    pub async fn pending_queue(
        &self,
        agent_id: AgentId,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<Vec<PendingOffer>, DispatchError> {
        let (limit, offset) = page_window(page, limit)?;
        Ok(self
            .store
            .pending_for_agent(agent_id, Utc::now(), limit, offset)
            .await?)
    }

    /// Requests currently assigned to the agent, most recently accepted
    /// first.
    pub async fn active_jobs(
        &self,
        agent_id: AgentId,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<Vec<RequestSnapshot>, DispatchError> {
        let (limit, offset) = page_window(page, limit)?;
        Ok(self.store.active_for_agent(agent_id, limit, offset).await?)
    }

    /// The client's requests across every bucket, most recent activity
    /// first.
    pub async fn client_history(
        &self,
        client_id: ClientId,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<Vec<RequestSnapshot>, DispatchError> {
        let (limit, offset) = page_window(page, limit)?;
        Ok(self
            .store
            .requests_for_client(client_id, limit, offset)
            .await?)
    }

    // ─── Expiry ──────────────────────────────────────────────────────

    /// Move every pending request whose deadline has passed to
    /// `Cancelled` with initiator `system`. Each request gets its own
    /// transaction; a failure on one does not stop the sweep.
    ///
    /// Returns the number of requests expired.
    pub async fn expire_pending(&self, now: DateTime<Utc>) -> Result<usize, DispatchError> {
        let due = self.store.expired_pending(now, EXPIRE_BATCH).await?;
        let mut expired = 0;
        for request_id in due {
            match self.cancel_at(Actor::System, request_id, "expired", now).await {
                Ok(_) => expired += 1,
                Err(DispatchError::RequestUnavailable(reason)) => {
                    tracing::debug!(%request_id, %reason, "skipping expiry, request moved on");
                }
                Err(e) => {
                    tracing::warn!(%request_id, error = %e, "failed to expire request");
                }
            }
        }
        if expired > 0 {
            tracing::info!(expired, "expired pending requests");
        }
        Ok(expired)
    }

    // ─── Helpers ─────────────────────────────────────────────────────

    async fn find_candidates(&self, service_type: ServiceTypeId, origin: GeoPoint) -> Vec<Candidate> {
        match self.locator.candidates(service_type, origin).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(%service_type, error = %e, "candidate lookup failed, treating as empty");
                Vec::new()
            }
        }
    }

    async fn client_token(&self, client_id: ClientId) -> Option<String> {
        match self.store.client(client_id).await {
            Ok(profile) => profile.and_then(|p| p.push_token),
            Err(e) => {
                tracing::warn!(%client_id, error = %e, "client token lookup failed");
                None
            }
        }
    }

    async fn agent_token(&self, agent_id: AgentId) -> Option<String> {
        match self.store.agent(agent_id).await {
            Ok(profile) => profile.and_then(|p| p.push_token),
            Err(e) => {
                tracing::warn!(%agent_id, error = %e, "agent token lookup failed");
                None
            }
        }
    }

    fn push(&self, token: Option<String>, title: &str, body: String, data: serde_json::Value) {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return;
        };
        send_detached(
            Arc::clone(&self.notifier),
            PushMessage {
                token,
                title: title.to_string(),
                body,
                data,
            },
        );
    }
}

/// Resolve a zero-based `page` and a `limit` into `(limit, offset)`.
fn page_window(page: Option<u32>, limit: Option<u32>) -> Result<(u32, u32), DispatchError> {
    let limit = limit.unwrap_or(PAGE_SIZE_DEFAULT);
    if !(1..=PAGE_SIZE_MAX).contains(&limit) {
        return Err(ValidationError::OutOfRange {
            field: "limit",
            value: limit.to_string(),
        }
        .into());
    }
    let page = page.unwrap_or(0);
    let offset = page.checked_mul(limit).ok_or_else(|| {
        DispatchError::from(ValidationError::OutOfRange {
            field: "page",
            value: page.to_string(),
        })
    })?;
    Ok((limit, offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_window_defaults_and_bounds() {
        assert_eq!(page_window(None, None).unwrap(), (PAGE_SIZE_DEFAULT, 0));
        assert_eq!(page_window(Some(3), Some(10)).unwrap(), (10, 30));
        assert!(matches!(
            page_window(None, Some(0)),
            Err(DispatchError::Validation(_))
        ));
        assert!(matches!(
            page_window(None, Some(PAGE_SIZE_MAX + 1)),
            Err(DispatchError::Validation(_))
        ));
        assert!(matches!(
            page_window(Some(u32::MAX), Some(2)),
            Err(DispatchError::Validation(_))
        ));
    }
}
