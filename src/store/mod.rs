//! The storage port: everything the engine needs to persist.
//!
//! Merchant-scoped mutations take `(merchant_id, queue_id)` and report whether
//! an owned queue matched, so a mutation can never touch a queue the caller
//! does not own, whatever an earlier ownership check said.

mod memory;
mod writer;

pub use memory::MemoryStore;

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use ulid::Ulid;

use crate::calendar::QueueCalendar;
use crate::model::*;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(Ulid),
    /// The insert would overlap the reservation with this token.
    #[error("overlaps reservation {0}")]
    Conflict(TokenNo),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    /// Backend failure (I/O, connectivity). Callers may retry.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Persist a new queue and return it with its assigned id.
    async fn create_queue(&self, queue: NewQueue) -> Result<Queue, StoreError>;

    async fn get_queue(&self, id: QueueId) -> Result<Queue, StoreError>;

    /// Queues owned by `merchant_id`, oldest first, with their blackout dates.
    async fn queues_by_merchant(&self, merchant_id: &MerchantId) -> Result<Vec<QueueCalendar>, StoreError>;

    async fn is_owned_by(&self, merchant_id: &MerchantId, queue_id: QueueId) -> Result<bool, StoreError>;

    async fn set_availability(
        &self,
        merchant_id: &MerchantId,
        queue_id: QueueId,
        available: bool,
    ) -> Result<bool, StoreError>;

    async fn blackout_dates(&self, queue_id: QueueId) -> Result<BTreeSet<NaiveDate>, StoreError>;

    /// Idempotent per date.
    async fn add_blackout_dates(
        &self,
        merchant_id: &MerchantId,
        queue_id: QueueId,
        dates: &[NaiveDate],
    ) -> Result<bool, StoreError>;

    /// Absent dates are ignored.
    async fn remove_blackout_dates(
        &self,
        merchant_id: &MerchantId,
        queue_id: QueueId,
        dates: &[NaiveDate],
    ) -> Result<bool, StoreError>;

    /// Reservations starting on `date`, ordered by start.
    async fn list_reserved_slots(&self, queue_id: QueueId, date: NaiveDate) -> Result<Vec<ReservedSlot>, StoreError>;

    /// Assigns a token. Fails with [`StoreError::Conflict`] if the span
    /// overlaps an existing reservation of the same queue.
    async fn insert_reserved_slot(&self, reservation: NewReservation) -> Result<ReservedSlot, StoreError>;

    async fn delete_reserved_slot(&self, token_no: TokenNo) -> Result<ReservedSlot, StoreError>;

    /// Removes the queue with its blackout dates and reservations.
    async fn delete_queue_cascade(&self, merchant_id: &MerchantId, queue_id: QueueId) -> Result<bool, StoreError>;
}
