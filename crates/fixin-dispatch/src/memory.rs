//! # In-Memory Store
//!
//! [`MemoryStore`] implements the store contracts without a database, for
//! development mode and tests. Tables sit behind one `parking_lot::RwLock`;
//! the per-request and per-agent exclusive locks are tokio mutexes kept in a
//! `DashMap`, so a transaction can hold them across `.await` points and wait
//! for them with a timeout.
//!
//! A [`MemoryTx`] stages its writes and applies them under a single table
//! write lock at commit. Dropping it discards the staged writes and releases
//! its locks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::{Mutex, OwnedMutexGuard};

use fixin_core::{AgentId, ClientId, Credits, GeoPoint, GeoPolygon, RequestId, ServiceTypeId};
use fixin_state::{
    AgentRating, Assignment, BucketKind, CancellationRecord, CompletionRecord, LedgerEntry,
    LedgerReason, RequestBucket, RequestSnapshot, ServiceRequest,
};

use crate::error::StoreError;
use crate::locator::{Candidate, CandidateLocator};
use crate::store::{
    AgentProfile, AgentStatus, ClientProfile, DispatchStore, DispatchTx, PendingOffer,
    ServiceType,
};

// ─── Tables ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct AgentRow {
    profile: AgentProfile,
    location: Option<GeoPoint>,
    /// Offered services and whether each is currently enabled.
    services: HashMap<ServiceTypeId, bool>,
}

#[derive(Debug, Default)]
struct Tables {
    clients: HashMap<ClientId, ClientProfile>,
    agents: HashMap<AgentId, AgentRow>,
    service_types: HashMap<ServiceTypeId, ServiceType>,
    zones: Vec<GeoPolygon>,
    requests: HashMap<RequestId, RequestSnapshot>,
    /// Append-only, in commit order.
    ledger: Vec<LedgerEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum LockKey {
    Request(RequestId),
    Agent(AgentId),
}

type LockTable = DashMap<LockKey, Arc<Mutex<()>>>;

// ─── Store ───────────────────────────────────────────────────────────

/// Process-local implementation of [`DispatchStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    locks: Arc<LockTable>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A locator reading this store's agents and zones.
    pub fn locator(&self) -> MemoryLocator {
        MemoryLocator {
            tables: Arc::clone(&self.tables),
        }
    }

    pub fn add_client(&self, client: ClientProfile) {
        self.tables.write().clients.insert(client.id, client);
    }

    pub fn add_service_type(&self, service: ServiceType) {
        self.tables.write().service_types.insert(service.id, service);
    }

    pub fn add_zone(&self, zone: GeoPolygon) {
        self.tables.write().zones.push(zone);
    }

    /// Register an agent at `location` offering `services`, all enabled.
    pub fn add_agent(&self, profile: AgentProfile, location: GeoPoint, services: &[ServiceTypeId]) {
        let row = AgentRow {
            location: Some(location),
            services: services.iter().map(|s| (*s, true)).collect(),
            profile,
        };
        self.tables.write().agents.insert(row.profile.id, row);
    }

    /// Returns `false` when the agent is unknown.
    pub fn set_agent_status(&self, agent: AgentId, status: AgentStatus) -> bool {
        match self.tables.write().agents.get_mut(&agent) {
            Some(row) => {
                row.profile.status = status;
                true
            }
            None => false,
        }
    }

    /// Returns `false` when the agent does not offer the service.
    pub fn set_service_enabled(
        &self,
        agent: AgentId,
        service: ServiceTypeId,
        enabled: bool,
    ) -> bool {
        let mut tables = self.tables.write();
        match tables
            .agents
            .get_mut(&agent)
            .and_then(|row| row.services.get_mut(&service))
        {
            Some(flag) => {
                *flag = enabled;
                true
            }
            None => false,
        }
    }

    pub fn balance(&self, agent: AgentId) -> Option<Credits> {
        self.tables
            .read()
            .agents
            .get(&agent)
            .map(|row| row.profile.balance)
    }

    pub fn bucket_of(&self, request: RequestId) -> Option<BucketKind> {
        self.tables
            .read()
            .requests
            .get(&request)
            .map(|s| s.bucket.kind())
    }

    /// Ledger entries tagged with `request`, oldest first.
    pub fn ledger_for_request(&self, request: RequestId) -> Vec<LedgerEntry> {
        self.tables
            .read()
            .ledger
            .iter()
            .filter(|e| e.request_id == Some(request))
            .cloned()
            .collect()
    }

    /// Overwrite the expiry of a pending request. Test hook.
    pub fn set_pending_expiry(&self, request: RequestId, expires_at: DateTime<Utc>) -> bool {
        let mut tables = self.tables.write();
        match tables.requests.get_mut(&request) {
            Some(snapshot) if matches!(snapshot.bucket, RequestBucket::Pending { .. }) => {
                snapshot.bucket = RequestBucket::Pending { expires_at };
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl DispatchStore for MemoryStore {
    async fn begin(&self, lock_timeout: Duration) -> Result<Box<dyn DispatchTx>, StoreError> {
        Ok(Box::new(MemoryTx {
            tables: Arc::clone(&self.tables),
            locks: Arc::clone(&self.locks),
            lock_timeout,
            held: HashMap::new(),
            staged: Vec::new(),
            balances: HashMap::new(),
        }))
    }

    async fn client(&self, id: ClientId) -> Result<Option<ClientProfile>, StoreError> {
        Ok(self.tables.read().clients.get(&id).cloned())
    }

    async fn agent(&self, id: AgentId) -> Result<Option<AgentProfile>, StoreError> {
        Ok(self.tables.read().agents.get(&id).map(|r| r.profile.clone()))
    }

    async fn service_type(&self, id: ServiceTypeId) -> Result<Option<ServiceType>, StoreError> {
        Ok(self.tables.read().service_types.get(&id).cloned())
    }

    async fn snapshot(&self, id: RequestId) -> Result<Option<RequestSnapshot>, StoreError> {
        Ok(self.tables.read().requests.get(&id).cloned())
    }

    async fn ledger_for_agent(
        &self,
        agent: AgentId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        Ok(self
            .tables
            .read()
            .ledger
            .iter()
            .rev()
            .filter(|e| e.agent_id == agent)
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn pending_for_agent(
        &self,
        agent: AgentId,
        now: DateTime<Utc>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<PendingOffer>, StoreError> {
        let tables = self.tables.read();
        let Some(row) = tables.agents.get(&agent) else {
            return Ok(Vec::new());
        };
        let Some(location) = row.location else {
            return Ok(Vec::new());
        };
        let zones: Vec<&GeoPolygon> = tables
            .zones
            .iter()
            .filter(|z| z.contains(&location))
            .collect();

        let mut offers: Vec<PendingOffer> = tables
            .requests
            .values()
            .filter_map(|s| match s.bucket {
                RequestBucket::Pending { expires_at } if expires_at > now => {
                    Some((s, expires_at))
                }
                _ => None,
            })
            .filter(|(s, _)| {
                row.services
                    .get(&s.request.service_type_id)
                    .copied()
                    .unwrap_or(false)
            })
            .filter(|(s, _)| zones.iter().any(|z| z.contains(&s.request.origin)))
            .map(|(s, expires_at)| PendingOffer {
                service_name: tables
                    .service_types
                    .get(&s.request.service_type_id)
                    .map(|t| t.name.clone())
                    .unwrap_or_default(),
                distance_m: location.distance_m(&s.request.origin),
                expires_at,
                request: s.request.clone(),
            })
            .collect();
        offers.sort_by(|a, b| {
            a.distance_m
                .total_cmp(&b.distance_m)
                .then(a.request.created_at.cmp(&b.request.created_at))
                .then(a.request.id.cmp(&b.request.id))
        });
        Ok(offers
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn active_for_agent(
        &self,
        agent: AgentId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<RequestSnapshot>, StoreError> {
        let tables = self.tables.read();
        let mut active: Vec<&RequestSnapshot> = tables
            .requests
            .values()
            .filter(|s| matches!(&s.bucket, RequestBucket::Assigned(a) if a.agent_id == agent))
            .collect();
        active.sort_by(|a, b| {
            b.last_activity()
                .cmp(&a.last_activity())
                .then(b.request.id.cmp(&a.request.id))
        });
        Ok(active
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn requests_for_client(
        &self,
        client: ClientId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<RequestSnapshot>, StoreError> {
        let tables = self.tables.read();
        let mut history: Vec<&RequestSnapshot> = tables
            .requests
            .values()
            .filter(|s| s.request.client_id == client)
            .collect();
        history.sort_by(|a, b| {
            b.last_activity()
                .cmp(&a.last_activity())
                .then(b.request.id.cmp(&a.request.id))
        });
        Ok(history
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn expired_pending(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<RequestId>, StoreError> {
        let tables = self.tables.read();
        let mut due: Vec<(DateTime<Utc>, RequestId)> = tables
            .requests
            .values()
            .filter_map(|s| match s.bucket {
                RequestBucket::Pending { expires_at } if expires_at <= now => {
                    Some((expires_at, s.request.id))
                }
                _ => None,
            })
            .collect();
        due.sort();
        Ok(due.into_iter().take(limit as usize).map(|(_, id)| id).collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ─── Transaction ─────────────────────────────────────────────────────

#[derive(Debug)]
enum Staged {
    Insert(RequestSnapshot),
    Bucket {
        request: RequestId,
        expect: BucketKind,
        next: RequestBucket,
    },
    Rating {
        request: RequestId,
        rating: AgentRating,
    },
    Ledger(LedgerEntry),
}

/// One unit of work against a [`MemoryStore`].
pub struct MemoryTx {
    tables: Arc<RwLock<Tables>>,
    locks: Arc<LockTable>,
    lock_timeout: Duration,
    held: HashMap<LockKey, OwnedMutexGuard<()>>,
    staged: Vec<Staged>,
    /// Post-transaction balances of agents touched by this transaction.
    balances: HashMap<AgentId, Credits>,
}

impl MemoryTx {
    async fn acquire(&mut self, key: LockKey) -> Result<(), StoreError> {
        if self.held.contains_key(&key) {
            return Ok(());
        }
        let mutex = Arc::clone(
            self.locks
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        let guard = tokio::time::timeout(self.lock_timeout, mutex.lock_owned())
            .await
            .map_err(|_| StoreError::LockTimeout)?;
        self.held.insert(key, guard);
        Ok(())
    }

    fn current_balance(&self, agent: AgentId) -> Result<Credits, StoreError> {
        if let Some(balance) = self.balances.get(&agent) {
            return Ok(*balance);
        }
        self.tables
            .read()
            .agents
            .get(&agent)
            .map(|r| r.profile.balance)
            .ok_or_else(|| StoreError::Backend(format!("unknown {agent}")))
    }

    fn require_locked(&self, request: RequestId) -> Result<(), StoreError> {
        if self.held.contains_key(&LockKey::Request(request)) {
            Ok(())
        } else {
            Err(StoreError::Backend(format!("{request} not locked by this transaction")))
        }
    }

    fn stage_bucket(
        &mut self,
        request: RequestId,
        expect: BucketKind,
        next: RequestBucket,
    ) -> Result<(), StoreError> {
        self.require_locked(request)?;
        self.staged.push(Staged::Bucket {
            request,
            expect,
            next,
        });
        Ok(())
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        let keys: Vec<LockKey> = self.held.keys().copied().collect();
        self.held.clear();
        // Forget mutexes nobody else is holding or waiting on.
        for key in keys {
            self.locks
                .remove_if(&key, |_, mutex| Arc::strong_count(mutex) == 1);
        }
    }
}

#[async_trait]
impl DispatchTx for MemoryTx {
    async fn lock_request(&mut self, id: RequestId) -> Result<Option<RequestSnapshot>, StoreError> {
        if !self.tables.read().requests.contains_key(&id) {
            return Ok(None);
        }
        self.acquire(LockKey::Request(id)).await?;
        Ok(self.tables.read().requests.get(&id).cloned())
    }

    async fn agent_balance(&mut self, agent: AgentId) -> Result<Option<Credits>, StoreError> {
        if let Some(balance) = self.balances.get(&agent) {
            return Ok(Some(*balance));
        }
        Ok(self.tables.read().agents.get(&agent).map(|r| r.profile.balance))
    }

    async fn debit(
        &mut self,
        agent: AgentId,
        amount: Credits,
        request: Option<RequestId>,
        reason: LedgerReason,
    ) -> Result<Option<LedgerEntry>, StoreError> {
        self.acquire(LockKey::Agent(agent)).await?;
        let Some(next) = self.current_balance(agent)?.checked_sub(amount) else {
            return Ok(None);
        };
        let entry = LedgerEntry::debit(agent, amount, reason, request, Utc::now());
        self.balances.insert(agent, next);
        self.staged.push(Staged::Ledger(entry.clone()));
        Ok(Some(entry))
    }

    async fn credit(
        &mut self,
        agent: AgentId,
        amount: Credits,
        request: Option<RequestId>,
        reason: LedgerReason,
    ) -> Result<LedgerEntry, StoreError> {
        self.acquire(LockKey::Agent(agent)).await?;
        let next = self
            .current_balance(agent)?
            .checked_add(amount)
            .ok_or_else(|| StoreError::Backend(format!("balance overflow for {agent}")))?;
        let entry = LedgerEntry::credit(agent, amount, reason, request, Utc::now());
        self.balances.insert(agent, next);
        self.staged.push(Staged::Ledger(entry.clone()));
        Ok(entry)
    }

    async fn acceptance_debit(
        &mut self,
        request: RequestId,
    ) -> Result<Option<LedgerEntry>, StoreError> {
        Ok(self
            .tables
            .read()
            .ledger
            .iter()
            .rev()
            .find(|e| e.request_id == Some(request) && e.reason == LedgerReason::AcceptanceFee)
            .cloned())
    }

    async fn insert_pending(
        &mut self,
        request: &ServiceRequest,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.staged.push(Staged::Insert(RequestSnapshot {
            request: request.clone(),
            bucket: RequestBucket::Pending { expires_at },
        }));
        Ok(())
    }

    async fn move_to_assigned(&mut self, assignment: &Assignment) -> Result<(), StoreError> {
        self.stage_bucket(
            assignment.request_id,
            BucketKind::Pending,
            RequestBucket::Assigned(assignment.clone()),
        )
    }

    async fn move_to_completed(&mut self, record: &CompletionRecord) -> Result<(), StoreError> {
        self.stage_bucket(
            record.request_id,
            BucketKind::Assigned,
            RequestBucket::Completed(record.clone()),
        )
    }

    async fn move_to_cancelled(
        &mut self,
        from: BucketKind,
        record: &CancellationRecord,
    ) -> Result<(), StoreError> {
        self.stage_bucket(
            record.request_id,
            from,
            RequestBucket::Cancelled(record.clone()),
        )
    }

    async fn record_agent_rating(
        &mut self,
        request: RequestId,
        rating: &AgentRating,
    ) -> Result<(), StoreError> {
        self.require_locked(request)?;
        self.staged.push(Staged::Rating {
            request,
            rating: rating.clone(),
        });
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        let staged = std::mem::take(&mut self.staged);
        let balances = std::mem::take(&mut self.balances);
        let mut tables = self.tables.write();

        // Validate everything before applying anything.
        for op in &staged {
            match op {
                Staged::Insert(s) if tables.requests.contains_key(&s.request.id) => {
                    return Err(StoreError::Backend(format!("{} already exists", s.request.id)));
                }
                Staged::Bucket {
                    request, expect, ..
                } => {
                    let actual = tables.requests.get(request).map(|s| s.bucket.kind());
                    if actual != Some(*expect) {
                        return Err(StoreError::Backend(format!(
                            "{request} expected in {expect}, found {actual:?}"
                        )));
                    }
                }
                Staged::Rating { request, .. } => {
                    let completed = matches!(
                        tables.requests.get(request).map(|s| &s.bucket),
                        Some(RequestBucket::Completed(c)) if c.agent_rating.is_none()
                    );
                    if !completed {
                        return Err(StoreError::Backend(format!(
                            "{request} cannot take an agent rating"
                        )));
                    }
                }
                _ => {}
            }
        }
        for agent in balances.keys() {
            if !tables.agents.contains_key(agent) {
                return Err(StoreError::Backend(format!("unknown {agent}")));
            }
        }

        for op in staged {
            match op {
                Staged::Insert(s) => {
                    tables.requests.insert(s.request.id, s);
                }
                Staged::Bucket { request, next, .. } => {
                    if let Some(s) = tables.requests.get_mut(&request) {
                        s.bucket = next;
                    }
                }
                Staged::Rating { request, rating } => {
                    if let Some(RequestBucket::Completed(c)) =
                        tables.requests.get_mut(&request).map(|s| &mut s.bucket)
                    {
                        c.agent_rating = Some(rating);
                    }
                }
                Staged::Ledger(entry) => tables.ledger.push(entry),
            }
        }
        for (agent, balance) in balances {
            if let Some(row) = tables.agents.get_mut(&agent) {
                row.profile.balance = balance;
            }
        }
        Ok(())
    }
}

// ─── Locator ─────────────────────────────────────────────────────────

/// [`CandidateLocator`] over a [`MemoryStore`]'s agents and zones.
///
/// An agent qualifies when it is online, has the service enabled, and its
/// location lies in an operating zone that also contains the origin.
#[derive(Debug, Clone)]
pub struct MemoryLocator {
    tables: Arc<RwLock<Tables>>,
}

#[async_trait]
impl CandidateLocator for MemoryLocator {
    async fn candidates(
        &self,
        service_type: ServiceTypeId,
        origin: GeoPoint,
    ) -> Result<Vec<Candidate>, StoreError> {
        let tables = self.tables.read();
        let zones: Vec<&GeoPolygon> = tables.zones.iter().filter(|z| z.contains(&origin)).collect();
        if zones.is_empty() {
            return Ok(Vec::new());
        }
        let mut found: Vec<Candidate> = tables
            .agents
            .values()
            .filter(|row| row.profile.status == AgentStatus::Online)
            .filter(|row| row.services.get(&service_type).copied().unwrap_or(false))
            .filter_map(|row| {
                let location = row.location?;
                zones.iter().any(|z| z.contains(&location)).then(|| {
                    Candidate::new(
                        row.profile.id,
                        row.profile.push_token.clone(),
                        origin.distance_m(&location),
                    )
                })
            })
            .collect();
        found.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).unwrap()
    }

    fn zone() -> GeoPolygon {
        GeoPolygon::new(vec![
            point(-32.0, -65.0),
            point(-32.0, -64.0),
            point(-31.0, -64.0),
            point(-31.0, -65.0),
        ])
        .unwrap()
    }

    fn agent(balance_cents: u32) -> AgentProfile {
        AgentProfile {
            id: AgentId::new(),
            display_name: "Grúas Sur".into(),
            push_token: Some("agent-token".into()),
            status: AgentStatus::Online,
            balance: Credits::from_cents(balance_cents),
        }
    }

    fn pending_request(store: &MemoryStore) -> RequestId {
        let request = ServiceRequest::new(
            ClientId::new(),
            ServiceTypeId::new(),
            point(-31.4, -64.2),
            "",
            Utc::now(),
        )
        .unwrap();
        let id = request.id;
        store.tables.write().requests.insert(
            id,
            RequestSnapshot {
                request,
                bucket: RequestBucket::Pending {
                    expires_at: Utc::now() + chrono::Duration::minutes(30),
                },
            },
        );
        id
    }

    #[tokio::test]
    async fn dropped_transaction_leaves_no_trace() {
        let store = MemoryStore::new();
        let a = agent(2000);
        let agent_id = a.id;
        store.add_agent(a, point(-31.4, -64.2), &[]);

        let mut tx = store.begin(Duration::from_secs(1)).await.unwrap();
        let entry = tx
            .debit(agent_id, Credits::from_cents(500), None, LedgerReason::AcceptanceFee)
            .await
            .unwrap();
        assert!(entry.is_some());
        drop(tx);

        assert_eq!(store.balance(agent_id), Some(Credits::from_cents(2000)));
        assert!(store.tables.read().ledger.is_empty());
        assert!(store.locks.is_empty());
    }

    #[tokio::test]
    async fn debit_refuses_overdraft() {
        let store = MemoryStore::new();
        let a = agent(400);
        let agent_id = a.id;
        store.add_agent(a, point(-31.4, -64.2), &[]);

        let mut tx = store.begin(Duration::from_secs(1)).await.unwrap();
        let entry = tx
            .debit(agent_id, Credits::from_cents(500), None, LedgerReason::AcceptanceFee)
            .await
            .unwrap();
        assert!(entry.is_none());
    }

    #[tokio::test]
    async fn second_lock_times_out_while_first_is_held() {
        let store = MemoryStore::new();
        let id = pending_request(&store);

        let mut first = store.begin(Duration::from_millis(50)).await.unwrap();
        assert!(first.lock_request(id).await.unwrap().is_some());

        let mut second = store.begin(Duration::from_millis(50)).await.unwrap();
        assert_eq!(
            second.lock_request(id).await.unwrap_err(),
            StoreError::LockTimeout
        );

        drop(first);
        assert!(second.lock_request(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unknown_request_locks_nothing() {
        let store = MemoryStore::new();
        let mut tx = store.begin(Duration::from_millis(50)).await.unwrap();
        assert!(tx.lock_request(RequestId::new()).await.unwrap().is_none());
        assert!(store.locks.is_empty());
    }

    #[tokio::test]
    async fn bucket_move_requires_lock() {
        let store = MemoryStore::new();
        let id = pending_request(&store);
        let mut tx = store.begin(Duration::from_millis(50)).await.unwrap();
        let assignment = Assignment {
            request_id: id,
            agent_id: AgentId::new(),
            fee: Credits::from_cents(500),
            assigned_at: Utc::now(),
        };
        assert!(tx.move_to_assigned(&assignment).await.is_err());
    }

    #[tokio::test]
    async fn locator_filters_and_orders() {
        let store = MemoryStore::new();
        store.add_zone(zone());
        let service = ServiceTypeId::new();
        let origin = point(-31.40, -64.20);

        let near = agent(0);
        let far = agent(0);
        let offline = agent(0);
        let outside = agent(0);
        let (near_id, far_id, offline_id) = (near.id, far.id, offline.id);
        store.add_agent(near, point(-31.41, -64.21), &[service]);
        store.add_agent(far, point(-31.80, -64.70), &[service]);
        store.add_agent(offline, point(-31.40, -64.20), &[service]);
        store.add_agent(outside, point(-30.00, -64.20), &[service]);
        store.set_agent_status(offline_id, AgentStatus::Offline);

        let found = store.locator().candidates(service, origin).await.unwrap();
        let ids: Vec<AgentId> = found.iter().map(|c| c.agent_id).collect();
        assert_eq!(ids, vec![near_id, far_id]);
        assert_eq!(found[0].channel, crate::fanout::Topic::Agent(near_id));

        store.set_service_enabled(near_id, service, false);
        let found = store.locator().candidates(service, origin).await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn locator_empty_outside_every_zone() {
        let store = MemoryStore::new();
        store.add_zone(zone());
        let found = store
            .locator()
            .candidates(ServiceTypeId::new(), point(10.0, 10.0))
            .await
            .unwrap();
        assert!(found.is_empty());
    }
}
