use std::time::Instant;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::calendar::{DaySchedule, QueueCalendar, date_of};
use crate::limits::*;
use crate::model::*;
use crate::observability::{CANCELLATIONS_TOTAL, RESERVATIONS_TOTAL, RESERVE_DURATION_SECONDS};

use super::availability::{conflicts, is_date_blacked, validate_span, within_window};
use super::ownership::not_owned;
use super::{Engine, EngineError};

fn validate_customer(customer: &Customer) -> Result<(), EngineError> {
    if customer.name.trim().is_empty() {
        return Err(EngineError::InvalidInput("customer name must not be empty"));
    }
    if customer.name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("customer name too long"));
    }
    if customer.email.as_ref().is_some_and(|e| e.len() > MAX_EMAIL_LEN) {
        return Err(EngineError::LimitExceeded("customer email too long"));
    }
    if !customer.has_valid_phone() {
        return Err(EngineError::InvalidInput("phone must be exactly 10 digits"));
    }
    Ok(())
}

fn check_blackout_batch(dates: &[NaiveDate]) -> Result<(), EngineError> {
    if dates.len() > MAX_BLACKOUT_DATES_PER_CALL {
        return Err(EngineError::LimitExceeded("too many dates in one call"));
    }
    Ok(())
}

fn log_failure(op: &str, queue_id: QueueId, err: &EngineError) {
    match err {
        EngineError::DependencyUnavailable(msg) => warn!("{op} on {queue_id} failed: {msg}"),
        other => debug!("{op} on {queue_id} rejected: {other}"),
    }
}

impl Engine {
    pub async fn create_queue(
        &self,
        merchant_id: &MerchantId,
        name: impl Into<String>,
        interval_minutes: u32,
        window: ServiceWindow,
    ) -> Result<Queue, EngineError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(EngineError::InvalidInput("queue name must not be empty"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("queue name too long"));
        }
        if !window.is_valid() {
            return Err(EngineError::InvalidInput("window start must be before window end"));
        }
        if interval_minutes == 0 {
            return Err(EngineError::InvalidInput("interval must be positive"));
        }
        if interval_minutes > MAX_INTERVAL_MINUTES {
            return Err(EngineError::LimitExceeded("interval longer than a day"));
        }

        let queue = self
            .store
            .create_queue(NewQueue {
                merchant_id: merchant_id.clone(),
                name,
                interval_minutes,
                window,
            })
            .await?;
        info!("merchant {merchant_id} created queue {} ({:?})", queue.id, queue.name);
        Ok(queue)
    }

    pub async fn set_availability(
        &self,
        merchant_id: &MerchantId,
        queue_id: QueueId,
        available: bool,
    ) -> Result<(), EngineError> {
        self.verify_owner(merchant_id, queue_id).await?;
        // Scoped again by owner: a stale check can at worst be a no-op.
        if !self.store.set_availability(merchant_id, queue_id, available).await? {
            return Err(not_owned(merchant_id, queue_id));
        }
        info!("queue {queue_id} available={available}");
        Ok(())
    }

    pub async fn add_blackout_dates(
        &self,
        merchant_id: &MerchantId,
        queue_id: QueueId,
        dates: &[NaiveDate],
    ) -> Result<(), EngineError> {
        self.verify_owner(merchant_id, queue_id).await?;
        check_blackout_batch(dates)?;
        if !self.store.add_blackout_dates(merchant_id, queue_id, dates).await? {
            return Err(not_owned(merchant_id, queue_id));
        }
        info!("queue {queue_id} blacked out {} dates", dates.len());
        Ok(())
    }

    pub async fn remove_blackout_dates(
        &self,
        merchant_id: &MerchantId,
        queue_id: QueueId,
        dates: &[NaiveDate],
    ) -> Result<(), EngineError> {
        self.verify_owner(merchant_id, queue_id).await?;
        check_blackout_batch(dates)?;
        if !self.store.remove_blackout_dates(merchant_id, queue_id, dates).await? {
            return Err(not_owned(merchant_id, queue_id));
        }
        info!("queue {queue_id} reopened {} dates", dates.len());
        Ok(())
    }

    /// Reserve `[start, end)` on a queue for `customer`.
    ///
    /// Checks run in a fixed order: queue exists, queue is available, input is
    /// well formed, date is not blacked out, span is inside the window, span
    /// overlaps no reservation. The last check and the insert run inside the
    /// queue's critical section, and the store re-checks overlap on insert.
    pub async fn reserve_slot(
        &self,
        queue_id: QueueId,
        start: Ms,
        end: Ms,
        customer: Customer,
    ) -> Result<ReservedSlot, EngineError> {
        let started = Instant::now();
        let result = self.try_reserve(queue_id, start, end, customer).await;

        let outcome = match &result {
            Ok(_) => "reserved",
            Err(e) => e.label(),
        };
        metrics::counter!(RESERVATIONS_TOTAL, "outcome" => outcome).increment(1);
        metrics::histogram!(RESERVE_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

        match &result {
            Ok(slot) => info!("queue {queue_id} reserved {} as {}", slot.span, slot.token_no),
            Err(e) => log_failure("reserve", queue_id, e),
        }
        result
    }

    async fn try_reserve(
        &self,
        queue_id: QueueId,
        start: Ms,
        end: Ms,
        customer: Customer,
    ) -> Result<ReservedSlot, EngineError> {
        let queue = self.store.get_queue(queue_id).await?;
        if !queue.is_available {
            return Err(EngineError::QueueUnavailable(queue_id));
        }
        let span = validate_span(start, end)?;
        validate_customer(&customer)?;
        let date = date_of(span.start).ok_or(EngineError::LimitExceeded("timestamp out of range"))?;

        let section = self.lock_queue(queue_id).await;
        let result = self.reserve_locked(queue, date, span, customer).await;
        if matches!(&result, Err(EngineError::NotFound(id)) if *id == queue_id) {
            // Deleted while we waited; drop the lock entry taken after the delete.
            drop(section);
            self.forget_queue_lock(&queue_id);
        }
        result
    }

    /// The part of a reservation that runs inside the queue's critical section.
    async fn reserve_locked(
        &self,
        queue: Queue,
        date: NaiveDate,
        span: Span,
        customer: Customer,
    ) -> Result<ReservedSlot, EngineError> {
        let queue_id = queue.id;
        let calendar = QueueCalendar::new(queue, self.store.blackout_dates(queue_id).await?);
        if is_date_blacked(&calendar, date) {
            return Err(EngineError::DateBlacked(date));
        }
        if !within_window(&calendar.queue, &span) {
            return Err(EngineError::OutsideWindow(span));
        }

        let day = DaySchedule::new(date, self.store.list_reserved_slots(queue_id, date).await?);
        if let Some(token_no) = conflicts(&day, &span) {
            return Err(EngineError::SlotConflict(token_no));
        }

        // A store-side overlap rejection maps to SlotConflict as well.
        let slot = self
            .store
            .insert_reserved_slot(NewReservation {
                queue_id,
                span,
                reserved_by: customer,
            })
            .await?;
        Ok(slot)
    }

    /// Cancel a reservation. The token is the capability: no ownership check.
    pub async fn unreserve_slot(&self, token_no: TokenNo) -> Result<ReservedSlot, EngineError> {
        let result = self.store.delete_reserved_slot(token_no).await.map_err(EngineError::from);
        let outcome = match &result {
            Ok(_) => "cancelled",
            Err(e) => e.label(),
        };
        metrics::counter!(CANCELLATIONS_TOTAL, "outcome" => outcome).increment(1);

        match &result {
            Ok(slot) => info!("queue {} released {} ({token_no})", slot.queue_id, slot.span),
            Err(EngineError::DependencyUnavailable(msg)) => warn!("unreserve {token_no} failed: {msg}"),
            Err(e) => debug!("unreserve {token_no} rejected: {e}"),
        }
        result
    }

    /// Delete a queue with all its blackout dates and reservations.
    pub async fn delete_queue(&self, merchant_id: &MerchantId, queue_id: QueueId) -> Result<(), EngineError> {
        self.verify_owner(merchant_id, queue_id).await?;
        if !self.store.delete_queue_cascade(merchant_id, queue_id).await? {
            return Err(not_owned(merchant_id, queue_id));
        }
        self.forget_queue_lock(&queue_id);
        info!("merchant {merchant_id} deleted queue {queue_id}");
        Ok(())
    }
}
