mod availability;
mod error;
mod mutations;
mod ownership;
mod queries;

pub use availability::{
    conflicts, free_spans, is_date_blacked, open_slots, slot_grid, subtract_intervals, validate_span,
    within_window,
};
pub use error::EngineError;
pub use queries::DayView;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::identity::IdentityResolver;
use crate::model::*;
use crate::store::Storage;

/// The reservation engine.
///
/// Keeps no calendar state of its own: every operation re-reads what it needs
/// through the storage port. The only in-process state is one mutex per queue
/// that serializes the read-check-insert sequence of concurrent reservations
/// on that queue. Reservations on different queues never wait on each other.
///
/// The store and identity handles are acquired once by the embedding service
/// and must outlive every in-flight call.
pub struct Engine {
    store: Arc<dyn Storage>,
    identity: Arc<dyn IdentityResolver>,
    reserve_locks: DashMap<QueueId, Arc<Mutex<()>>>,
}

impl Engine {
    pub fn new(store: Arc<dyn Storage>, identity: Arc<dyn IdentityResolver>) -> Self {
        Self {
            store,
            identity,
            reserve_locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn Storage> {
        &self.store
    }

    /// Resolve an opaque merchant credential through the identity port.
    pub async fn authenticate(&self, token: &str) -> Result<MerchantId, EngineError> {
        self.identity.resolve_token(token).await.map_err(|e| {
            let e = EngineError::from(e);
            if let EngineError::DependencyUnavailable(msg) = &e {
                tracing::warn!("identity port failed: {msg}");
            }
            e
        })
    }

    /// Enter the reservation critical section for `queue_id`.
    pub(super) async fn lock_queue(&self, queue_id: QueueId) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the map shard is released before awaiting.
        let lock = self.reserve_locks.entry(queue_id).or_default().clone();
        lock.lock_owned().await
    }

    pub(super) fn forget_queue_lock(&self, queue_id: &QueueId) {
        self.reserve_locks.remove(queue_id);
    }
}
