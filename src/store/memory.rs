use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::calendar::{QueueCalendar, day_span};
use crate::limits::*;
use crate::model::*;
use crate::observability::{QUEUES_ACTIVE, WAL_COMPACTIONS_TOTAL};
use crate::wal::Wal;

use super::writer::WalHandle;
use super::{Storage, StoreError};

pub type SharedQueueState = Arc<RwLock<QueueState>>;

fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct QueueState {
    pub queue: Queue,
    pub blackout: BTreeSet<NaiveDate>,
    /// Reservations sorted by `span.start`; never overlapping.
    pub slots: Vec<ReservedSlot>,
    /// Set under the write lock by a cascade delete. Holders of a stale
    /// `Arc` must treat the queue as gone.
    deleted: bool,
}

impl QueueState {
    pub fn new(queue: Queue) -> Self {
        Self {
            queue,
            blackout: BTreeSet::new(),
            slots: Vec::new(),
            deleted: false,
        }
    }

    fn live_for(&self, merchant_id: &MerchantId) -> bool {
        !self.deleted && self.queue.merchant_id == *merchant_id
    }

    /// Insert maintaining sort order by span.start.
    fn insert_slot(&mut self, slot: ReservedSlot) {
        let pos = self
            .slots
            .binary_search_by_key(&slot.span.start, |s| s.span.start)
            .unwrap_or_else(|e| e);
        self.slots.insert(pos, slot);
    }

    fn remove_slot(&mut self, token_no: TokenNo) -> Option<ReservedSlot> {
        let pos = self.slots.iter().position(|s| s.token_no == token_no)?;
        Some(self.slots.remove(pos))
    }

    fn first_overlap(&self, span: &Span) -> Option<&ReservedSlot> {
        let right_bound = self.slots.partition_point(|s| s.span.start < span.end);
        self.slots[..right_bound].iter().find(|s| s.span.end > span.start)
    }

    /// Reservations starting on `date`, in order.
    fn slots_on(&self, date: NaiveDate) -> Vec<ReservedSlot> {
        let day = day_span(date);
        let lo = self.slots.partition_point(|s| s.span.start < day.start);
        let hi = self.slots.partition_point(|s| s.span.start < day.end);
        self.slots[lo..hi].to_vec()
    }

    /// Apply a per-queue event. Caller holds the lock; creation and deletion
    /// are handled at the map level.
    fn apply(&mut self, event: &Event, tokens: &DashMap<TokenNo, QueueId>) {
        match event {
            Event::AvailabilitySet { available, .. } => self.queue.is_available = *available,
            Event::BlackoutAdded { dates, .. } => self.blackout.extend(dates.iter().copied()),
            Event::BlackoutRemoved { dates, .. } => {
                for d in dates {
                    self.blackout.remove(d);
                }
            }
            Event::SlotReserved { slot } => {
                tokens.insert(slot.token_no, slot.queue_id);
                self.insert_slot(slot.clone());
            }
            Event::SlotReleased { token_no, .. } => {
                self.remove_slot(*token_no);
                tokens.remove(token_no);
            }
            Event::QueueCreated { .. } | Event::QueueDeleted { .. } => {}
        }
    }
}

/// Storage port backed by process memory, optionally made durable by a WAL.
///
/// Each queue sits behind its own `RwLock`, so writers to different queues
/// never contend. Every mutation is appended to the WAL before it is applied.
pub struct MemoryStore {
    queues: DashMap<QueueId, SharedQueueState>,
    /// Reverse lookup: reservation token → queue id.
    tokens: DashMap<TokenNo, QueueId>,
    /// Merchant → owned queues, in creation order.
    by_merchant: DashMap<MerchantId, Vec<QueueId>>,
    /// Held shared by `create_queue` and exclusively by `compact`, so no
    /// queue can be logged to a WAL that is about to be replaced.
    create_gate: RwLock<()>,
    wal: Option<WalHandle>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// A volatile store; nothing survives the process.
    pub fn new() -> Self {
        Self {
            queues: DashMap::new(),
            tokens: DashMap::new(),
            by_merchant: DashMap::new(),
            create_gate: RwLock::new(()),
            wal: None,
        }
    }

    /// Replay the WAL at `path` and keep appending to it.
    /// Must be called from within a tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        let events = Wal::recover(path)?;
        let replayed = events.len();
        let wal = Wal::open(path)?;

        let mut store = Self::new();
        store.replay(events);
        store.wal = Some(WalHandle::spawn(wal));

        tracing::info!(
            "opened {} ({replayed} events, {} queues, {} reservations)",
            path.display(),
            store.queues.len(),
            store.tokens.len()
        );
        metrics::gauge!(QUEUES_ACTIVE).set(store.queues.len() as f64);
        Ok(store)
    }

    fn replay(&mut self, events: Vec<Event>) {
        // Sole owner during replay: build plain states, wrap them afterwards.
        let mut states: HashMap<QueueId, QueueState> = HashMap::new();
        for event in events {
            match event {
                Event::QueueCreated { queue } => {
                    self.by_merchant
                        .entry(queue.merchant_id.clone())
                        .or_default()
                        .push(queue.id);
                    states.insert(queue.id, QueueState::new(queue));
                }
                Event::QueueDeleted { queue_id } => {
                    if let Some(state) = states.remove(&queue_id) {
                        self.forget(&state);
                    }
                }
                Event::SlotReserved { slot } => {
                    let Some(state) = states.get_mut(&slot.queue_id) else {
                        continue;
                    };
                    if let Some(held) = state.first_overlap(&slot.span) {
                        tracing::warn!(
                            "replay: skipping token {} on queue {}, overlaps token {}",
                            slot.token_no,
                            slot.queue_id,
                            held.token_no
                        );
                        continue;
                    }
                    state.apply(&Event::SlotReserved { slot }, &self.tokens);
                }
                other => {
                    if let Some(state) = states.get_mut(&other.queue_id()) {
                        state.apply(&other, &self.tokens);
                    }
                }
            }
        }
        for (id, state) in states {
            self.queues.insert(id, Arc::new(RwLock::new(state)));
        }
    }

    /// Drop the indexes pointing at a deleted queue.
    fn forget(&self, state: &QueueState) {
        for slot in &state.slots {
            self.tokens.remove(&slot.token_no);
        }
        if let Some(mut ids) = self.by_merchant.get_mut(&state.queue.merchant_id) {
            ids.retain(|id| *id != state.queue.id);
        }
    }

    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    pub fn reservation_count(&self) -> usize {
        self.tokens.len()
    }

    fn get_state(&self, id: &QueueId) -> Option<SharedQueueState> {
        self.queues.get(id).map(|e| e.value().clone())
    }

    async fn persist(&self, event: &Event) -> Result<(), StoreError> {
        match &self.wal {
            Some(wal) => wal.append(event).await,
            None => Ok(()),
        }
    }

    /// WAL-append + apply in one call.
    async fn persist_and_apply(&self, state: &mut QueueState, event: &Event) -> Result<(), StoreError> {
        self.persist(event).await?;
        state.apply(event, &self.tokens);
        Ok(())
    }

    /// Run `build` against an owned, live queue under its write lock, then
    /// persist and apply the event it returns. `Ok(false)` if not owned.
    async fn mutate_owned<F>(&self, merchant_id: &MerchantId, queue_id: QueueId, build: F) -> Result<bool, StoreError>
    where
        F: FnOnce(&QueueState) -> Option<Event> + Send,
    {
        let Some(rs) = self.get_state(&queue_id) else {
            return Ok(false);
        };
        let mut guard = rs.write().await;
        if !guard.live_for(merchant_id) {
            return Ok(false);
        }
        if let Some(event) = build(&*guard) {
            self.persist_and_apply(&mut guard, &event).await?;
        }
        Ok(true)
    }

    pub async fn appends_since_compact(&self) -> u64 {
        match &self.wal {
            Some(wal) => wal.appends_since_compact().await,
            None => 0,
        }
    }

    /// Rewrite the WAL with only the events needed to recreate current state.
    ///
    /// Holds the creation gate and a read lock on every queue until the new
    /// file is synced and swapped in, so every mutation on every queue waits
    /// for the whole rewrite. Reads proceed. The compactor runs this only
    /// past its append threshold.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let Some(wal) = &self.wal else {
            return Ok(());
        };

        let _gate = self.create_gate.write().await;
        let states: Vec<SharedQueueState> = self.queues.iter().map(|e| e.value().clone()).collect();
        // Read guards stay held until the swap: a mutation logged after the
        // snapshot would otherwise only exist in the discarded file.
        let mut guards = Vec::with_capacity(states.len());
        for rs in states {
            guards.push(rs.read_owned().await);
        }

        let mut snapshot: Vec<Queue> = Vec::new();
        let mut events = Vec::new();
        for guard in &guards {
            if guard.deleted {
                continue;
            }
            snapshot.push(guard.queue.clone());
            let queue_id = guard.queue.id;
            if !guard.blackout.is_empty() {
                events.push(Event::BlackoutAdded {
                    queue_id,
                    dates: guard.blackout.iter().copied().collect(),
                });
            }
            events.extend(guard.slots.iter().map(|slot| Event::SlotReserved { slot: slot.clone() }));
        }
        // Creation order keeps the merchant index ordered after replay.
        snapshot.sort_by_key(|q| q.id);
        let mut compacted: Vec<Event> = snapshot
            .into_iter()
            .map(|queue| Event::QueueCreated { queue })
            .collect();
        compacted.extend(events);

        let count = compacted.len();
        wal.compact(compacted).await?;
        drop(guards);
        metrics::counter!(WAL_COMPACTIONS_TOTAL).increment(1);
        tracing::info!("compacted WAL to {count} events");
        Ok(())
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn create_queue(&self, new: NewQueue) -> Result<Queue, StoreError> {
        let owned = self.by_merchant.get(&new.merchant_id).map_or(0, |ids| ids.len());
        if owned >= MAX_QUEUES_PER_MERCHANT {
            return Err(StoreError::LimitExceeded("too many queues for merchant"));
        }

        let queue = Queue {
            id: Ulid::new(),
            merchant_id: new.merchant_id,
            name: new.name,
            interval_minutes: new.interval_minutes,
            window: new.window,
            is_available: true,
            created_at: now_ms(),
        };
        let event = Event::QueueCreated { queue: queue.clone() };
        let _gate = self.create_gate.read().await;
        self.persist(&event).await?;

        self.queues
            .insert(queue.id, Arc::new(RwLock::new(QueueState::new(queue.clone()))));
        self.by_merchant
            .entry(queue.merchant_id.clone())
            .or_default()
            .push(queue.id);
        metrics::gauge!(QUEUES_ACTIVE).set(self.queues.len() as f64);
        Ok(queue)
    }

    async fn get_queue(&self, id: QueueId) -> Result<Queue, StoreError> {
        let rs = self.get_state(&id).ok_or(StoreError::NotFound(id))?;
        let guard = rs.read().await;
        if guard.deleted {
            return Err(StoreError::NotFound(id));
        }
        Ok(guard.queue.clone())
    }

    async fn queues_by_merchant(&self, merchant_id: &MerchantId) -> Result<Vec<QueueCalendar>, StoreError> {
        let ids = self
            .by_merchant
            .get(merchant_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        let mut calendars = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(rs) = self.get_state(&id) else { continue };
            let guard = rs.read().await;
            if guard.live_for(merchant_id) {
                calendars.push(QueueCalendar::new(guard.queue.clone(), guard.blackout.clone()));
            }
        }
        calendars.sort_by_key(|c| (c.queue.created_at, c.queue.id));
        Ok(calendars)
    }

    async fn is_owned_by(&self, merchant_id: &MerchantId, queue_id: QueueId) -> Result<bool, StoreError> {
        let Some(rs) = self.get_state(&queue_id) else {
            return Ok(false);
        };
        let guard = rs.read().await;
        Ok(guard.live_for(merchant_id))
    }

    async fn set_availability(
        &self,
        merchant_id: &MerchantId,
        queue_id: QueueId,
        available: bool,
    ) -> Result<bool, StoreError> {
        self.mutate_owned(merchant_id, queue_id, |state| {
            (state.queue.is_available != available)
                .then_some(Event::AvailabilitySet { queue_id, available })
        })
        .await
    }

    async fn blackout_dates(&self, queue_id: QueueId) -> Result<BTreeSet<NaiveDate>, StoreError> {
        let rs = self.get_state(&queue_id).ok_or(StoreError::NotFound(queue_id))?;
        let guard = rs.read().await;
        if guard.deleted {
            return Err(StoreError::NotFound(queue_id));
        }
        Ok(guard.blackout.clone())
    }

    async fn add_blackout_dates(
        &self,
        merchant_id: &MerchantId,
        queue_id: QueueId,
        dates: &[NaiveDate],
    ) -> Result<bool, StoreError> {
        self.mutate_owned(merchant_id, queue_id, |state| {
            let fresh: BTreeSet<NaiveDate> = dates
                .iter()
                .copied()
                .filter(|d| !state.blackout.contains(d))
                .collect();
            (!fresh.is_empty()).then(|| Event::BlackoutAdded {
                queue_id,
                dates: fresh.into_iter().collect(),
            })
        })
        .await
    }

    async fn remove_blackout_dates(
        &self,
        merchant_id: &MerchantId,
        queue_id: QueueId,
        dates: &[NaiveDate],
    ) -> Result<bool, StoreError> {
        self.mutate_owned(merchant_id, queue_id, |state| {
            let present: BTreeSet<NaiveDate> = dates
                .iter()
                .copied()
                .filter(|d| state.blackout.contains(d))
                .collect();
            (!present.is_empty()).then(|| Event::BlackoutRemoved {
                queue_id,
                dates: present.into_iter().collect(),
            })
        })
        .await
    }

    async fn list_reserved_slots(&self, queue_id: QueueId, date: NaiveDate) -> Result<Vec<ReservedSlot>, StoreError> {
        let rs = self.get_state(&queue_id).ok_or(StoreError::NotFound(queue_id))?;
        let guard = rs.read().await;
        if guard.deleted {
            return Err(StoreError::NotFound(queue_id));
        }
        Ok(guard.slots_on(date))
    }

    async fn insert_reserved_slot(&self, reservation: NewReservation) -> Result<ReservedSlot, StoreError> {
        let queue_id = reservation.queue_id;
        let rs = self.get_state(&queue_id).ok_or(StoreError::NotFound(queue_id))?;
        let mut guard = rs.write().await;
        if guard.deleted {
            return Err(StoreError::NotFound(queue_id));
        }
        if guard.slots.len() >= MAX_SLOTS_PER_QUEUE {
            return Err(StoreError::LimitExceeded("too many reservations on queue"));
        }
        if let Some(existing) = guard.first_overlap(&reservation.span) {
            return Err(StoreError::Conflict(existing.token_no));
        }

        let slot = ReservedSlot {
            token_no: Ulid::new(),
            queue_id,
            span: reservation.span,
            reserved_by: reservation.reserved_by,
            created_at: now_ms(),
        };
        let event = Event::SlotReserved { slot: slot.clone() };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(slot)
    }

    async fn delete_reserved_slot(&self, token_no: TokenNo) -> Result<ReservedSlot, StoreError> {
        let queue_id = self
            .tokens
            .get(&token_no)
            .map(|e| *e.value())
            .ok_or(StoreError::NotFound(token_no))?;
        let rs = self.get_state(&queue_id).ok_or(StoreError::NotFound(token_no))?;
        let mut guard = rs.write().await;
        if guard.deleted {
            return Err(StoreError::NotFound(token_no));
        }
        let slot = guard
            .slots
            .iter()
            .find(|s| s.token_no == token_no)
            .cloned()
            .ok_or(StoreError::NotFound(token_no))?;

        let event = Event::SlotReleased { token_no, queue_id };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(slot)
    }

    async fn delete_queue_cascade(&self, merchant_id: &MerchantId, queue_id: QueueId) -> Result<bool, StoreError> {
        let Some(rs) = self.get_state(&queue_id) else {
            return Ok(false);
        };
        let mut guard = rs.write().await;
        if !guard.live_for(merchant_id) {
            return Ok(false);
        }

        self.persist(&Event::QueueDeleted { queue_id }).await?;
        guard.deleted = true;
        self.forget(&guard);
        self.queues.remove(&queue_id);
        metrics::gauge!(QUEUES_ACTIVE).set(self.queues.len() as f64);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use std::path::PathBuf;

    use crate::calendar::at;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("queuebook_test_store");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn new_queue(merchant: &str) -> NewQueue {
        NewQueue {
            merchant_id: MerchantId::new(merchant),
            name: "Clinic".into(),
            interval_minutes: 30,
            window: ServiceWindow::new(hm(9, 0), hm(12, 0)),
        }
    }

    fn reservation(queue_id: QueueId, d: &str, from: (u32, u32), to: (u32, u32)) -> NewReservation {
        NewReservation {
            queue_id,
            span: Span::new(at(date(d), hm(from.0, from.1)), at(date(d), hm(to.0, to.1))),
            reserved_by: Customer::new("Amal", "0771234567", None),
        }
    }

    #[tokio::test]
    async fn insert_rejects_overlap_with_existing_token() {
        let store = MemoryStore::new();
        let q = store.create_queue(new_queue("m-1")).await.unwrap();

        let first = store
            .insert_reserved_slot(reservation(q.id, "2024-01-10", (9, 0), (9, 30)))
            .await
            .unwrap();
        let err = store
            .insert_reserved_slot(reservation(q.id, "2024-01-10", (9, 15), (9, 45)))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::Conflict(first.token_no));

        // adjacent is fine
        store
            .insert_reserved_slot(reservation(q.id, "2024-01-10", (9, 30), (10, 0)))
            .await
            .unwrap();
        assert_eq!(store.reservation_count(), 2);
    }

    #[tokio::test]
    async fn list_is_per_date_and_ordered() {
        let store = MemoryStore::new();
        let q = store.create_queue(new_queue("m-1")).await.unwrap();
        for (from, to) in [((10, 0), (10, 30)), ((9, 0), (9, 30))] {
            store
                .insert_reserved_slot(reservation(q.id, "2024-01-10", from, to))
                .await
                .unwrap();
        }
        store
            .insert_reserved_slot(reservation(q.id, "2024-01-11", (9, 0), (9, 30)))
            .await
            .unwrap();

        let day = store.list_reserved_slots(q.id, date("2024-01-10")).await.unwrap();
        assert_eq!(day.len(), 2);
        assert!(day[0].span.start < day[1].span.start);
        assert_eq!(store.list_reserved_slots(q.id, date("2024-01-12")).await.unwrap(), vec![]);
    }

    #[tokio::test]
    async fn scoped_mutations_ignore_foreign_queues() {
        let store = MemoryStore::new();
        let q = store.create_queue(new_queue("owner")).await.unwrap();
        let intruder = MerchantId::new("intruder");

        assert!(!store.set_availability(&intruder, q.id, false).await.unwrap());
        assert!(!store.add_blackout_dates(&intruder, q.id, &[date("2024-01-11")]).await.unwrap());
        assert!(!store.delete_queue_cascade(&intruder, q.id).await.unwrap());

        let queue = store.get_queue(q.id).await.unwrap();
        assert!(queue.is_available);
        assert!(store.blackout_dates(q.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn blackout_edits_are_set_semantics() {
        let store = MemoryStore::new();
        let q = store.create_queue(new_queue("m-1")).await.unwrap();
        let m = q.merchant_id.clone();
        let d = date("2024-01-11");

        assert!(store.add_blackout_dates(&m, q.id, &[d, d]).await.unwrap());
        assert!(store.add_blackout_dates(&m, q.id, &[d]).await.unwrap());
        assert_eq!(store.blackout_dates(q.id).await.unwrap().len(), 1);

        assert!(store.remove_blackout_dates(&m, q.id, &[date("2024-03-01")]).await.unwrap());
        assert!(store.remove_blackout_dates(&m, q.id, &[d]).await.unwrap());
        assert!(store.blackout_dates(q.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cascade_delete_drops_tokens() {
        let store = MemoryStore::new();
        let q = store.create_queue(new_queue("m-1")).await.unwrap();
        let slot = store
            .insert_reserved_slot(reservation(q.id, "2024-01-10", (9, 0), (9, 30)))
            .await
            .unwrap();

        assert!(store.delete_queue_cascade(&q.merchant_id, q.id).await.unwrap());
        assert_eq!(store.get_queue(q.id).await, Err(StoreError::NotFound(q.id)));
        assert_eq!(
            store.delete_reserved_slot(slot.token_no).await,
            Err(StoreError::NotFound(slot.token_no))
        );
        assert!(store.queues_by_merchant(&q.merchant_id).await.unwrap().is_empty());
        assert_eq!(store.queue_count(), 0);
        assert_eq!(store.reservation_count(), 0);
    }

    #[tokio::test]
    async fn stale_handle_cannot_insert_after_delete() {
        let store = MemoryStore::new();
        let q = store.create_queue(new_queue("m-1")).await.unwrap();
        let stale = store.get_state(&q.id).unwrap();

        store.delete_queue_cascade(&q.merchant_id, q.id).await.unwrap();
        assert!(stale.read().await.deleted);
        let err = store
            .insert_reserved_slot(reservation(q.id, "2024-01-10", (9, 0), (9, 30)))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NotFound(q.id));
    }

    #[tokio::test]
    async fn wal_replay_restores_state() {
        let path = test_wal_path("replay.wal");
        let (queue_id, kept, released) = {
            let store = MemoryStore::open(&path).unwrap();
            let q = store.create_queue(new_queue("m-1")).await.unwrap();
            let m = q.merchant_id.clone();
            store.set_availability(&m, q.id, false).await.unwrap();
            store.add_blackout_dates(&m, q.id, &[date("2024-01-11")]).await.unwrap();
            let kept = store
                .insert_reserved_slot(reservation(q.id, "2024-01-10", (9, 0), (9, 30)))
                .await
                .unwrap();
            let released = store
                .insert_reserved_slot(reservation(q.id, "2024-01-10", (10, 0), (10, 30)))
                .await
                .unwrap();
            store.delete_reserved_slot(released.token_no).await.unwrap();
            let doomed = store.create_queue(new_queue("m-1")).await.unwrap();
            store.delete_queue_cascade(&m, doomed.id).await.unwrap();
            (q.id, kept, released)
        };

        let store = MemoryStore::open(&path).unwrap();
        assert_eq!(store.queue_count(), 1);
        let queue = store.get_queue(queue_id).await.unwrap();
        assert!(!queue.is_available);
        assert!(store.blackout_dates(queue_id).await.unwrap().contains(&date("2024-01-11")));
        let day = store.list_reserved_slots(queue_id, date("2024-01-10")).await.unwrap();
        assert_eq!(day, vec![kept]);
        assert!(store.delete_reserved_slot(released.token_no).await.is_err());
    }

    #[tokio::test]
    async fn replay_skips_overlapping_reservation() {
        let path = test_wal_path("overlap.wal");
        let queue = Queue {
            id: Ulid::new(),
            merchant_id: MerchantId::new("m-1"),
            name: "Clinic".into(),
            interval_minutes: 30,
            window: ServiceWindow::new(hm(9, 0), hm(12, 0)),
            is_available: true,
            created_at: 0,
        };
        let slot = |from: (u32, u32), to: (u32, u32)| ReservedSlot {
            token_no: Ulid::new(),
            queue_id: queue.id,
            span: Span::new(
                at(date("2024-01-10"), hm(from.0, from.1)),
                at(date("2024-01-10"), hm(to.0, to.1)),
            ),
            reserved_by: Customer::new("Amal", "0771234567", None),
            created_at: 0,
        };
        let first = slot((9, 0), (9, 30));
        let overlapping = slot((9, 15), (9, 45));
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&Event::QueueCreated { queue: queue.clone() }).unwrap();
            wal.append(&Event::SlotReserved { slot: first.clone() }).unwrap();
            wal.append(&Event::SlotReserved { slot: overlapping.clone() }).unwrap();
        }

        let store = MemoryStore::open(&path).unwrap();
        assert_eq!(store.reservation_count(), 1);
        let day = store.list_reserved_slots(queue.id, date("2024-01-10")).await.unwrap();
        assert_eq!(day, vec![first]);
        assert!(store.delete_reserved_slot(overlapping.token_no).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn reservations_during_compaction_survive_restart() {
        let path = test_wal_path("compaction_concurrent.wal");
        let queue_id = {
            let store = Arc::new(MemoryStore::open(&path).unwrap());
            let q = store.create_queue(new_queue("m-1")).await.unwrap();
            store
                .insert_reserved_slot(reservation(q.id, "2024-01-10", (9, 0), (9, 30)))
                .await
                .unwrap();

            let writers: Vec<_> = (0..5u32)
                .map(|i| {
                    let store = store.clone();
                    let queue_id = q.id;
                    tokio::spawn(async move {
                        store
                            .insert_reserved_slot(reservation(
                                queue_id,
                                "2024-01-11",
                                (9 + i / 2, (i % 2) * 30),
                                (9 + (i + 1) / 2, ((i + 1) % 2) * 30),
                            ))
                            .await
                    })
                })
                .collect();
            let compaction = {
                let store = store.clone();
                tokio::spawn(async move { store.compact().await })
            };
            for w in writers {
                w.await.unwrap().unwrap();
            }
            compaction.await.unwrap().unwrap();
            q.id
        };

        let store = MemoryStore::open(&path).unwrap();
        assert_eq!(store.reservation_count(), 6);
        assert_eq!(store.list_reserved_slots(queue_id, date("2024-01-11")).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn compaction_preserves_state() {
        let path = test_wal_path("compaction.wal");
        {
            let store = MemoryStore::open(&path).unwrap();
            let q = store.create_queue(new_queue("m-1")).await.unwrap();
            let m = q.merchant_id.clone();
            for _ in 0..10 {
                let slot = store
                    .insert_reserved_slot(reservation(q.id, "2024-01-10", (9, 0), (9, 30)))
                    .await
                    .unwrap();
                store.delete_reserved_slot(slot.token_no).await.unwrap();
            }
            store.add_blackout_dates(&m, q.id, &[date("2024-01-11")]).await.unwrap();
            store
                .insert_reserved_slot(reservation(q.id, "2024-01-10", (11, 0), (11, 30)))
                .await
                .unwrap();
            assert_eq!(store.appends_since_compact().await, 23);

            let before = std::fs::metadata(&path).unwrap().len();
            store.compact().await.unwrap();
            assert_eq!(store.appends_since_compact().await, 0);
            assert!(std::fs::metadata(&path).unwrap().len() < before);
        }

        let events = Wal::replay(&path).unwrap();
        assert_eq!(events.len(), 3);
        let store = MemoryStore::open(&path).unwrap();
        assert_eq!(store.queue_count(), 1);
        assert_eq!(store.reservation_count(), 1);
    }

    #[tokio::test]
    async fn merchant_listing_in_creation_order() {
        let store = MemoryStore::new();
        let a = store.create_queue(new_queue("m-1")).await.unwrap();
        let b = store.create_queue(new_queue("m-1")).await.unwrap();
        store.create_queue(new_queue("m-2")).await.unwrap();

        let listed = store.queues_by_merchant(&MerchantId::new("m-1")).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|c| c.queue.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
    }
}
