use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::calendar::{DaySchedule, QueueCalendar};
use crate::model::*;

use super::availability::{free_spans, is_date_blacked, open_slots};
use super::{Engine, EngineError};

/// Everything a booking screen needs for one queue on one date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayView {
    pub queue: Queue,
    pub date: NaiveDate,
    pub blacked_out: bool,
    pub reservations: Vec<ReservedSlot>,
    /// Window minus reservations. Empty when the date is blacked out or the
    /// queue is not accepting reservations.
    pub free: Vec<Span>,
    /// Unreserved grid slots, under the same rule as `free`.
    pub open_slots: Vec<Span>,
}

impl Engine {
    pub async fn get_queue(&self, queue_id: QueueId) -> Result<Queue, EngineError> {
        Ok(self.store.get_queue(queue_id).await?)
    }

    /// All queues of `merchant_id` with their blackout dates, oldest first.
    pub async fn queues_for_merchant(&self, merchant_id: &MerchantId) -> Result<Vec<QueueCalendar>, EngineError> {
        let mut calendars = self.store.queues_by_merchant(merchant_id).await?;
        calendars.sort_by_key(|c| (c.queue.created_at, c.queue.id));
        Ok(calendars)
    }

    pub async fn blackout_dates(&self, queue_id: QueueId) -> Result<BTreeSet<NaiveDate>, EngineError> {
        // Surfaces NotFound for unknown queues rather than an empty set.
        self.store.get_queue(queue_id).await?;
        Ok(self.store.blackout_dates(queue_id).await?)
    }

    pub async fn day_schedule(&self, queue_id: QueueId, date: NaiveDate) -> Result<DaySchedule, EngineError> {
        let slots = self.store.list_reserved_slots(queue_id, date).await?;
        Ok(DaySchedule::new(date, slots))
    }

    /// Reserved slots of `queue_id` starting on `date`, ordered by start.
    pub async fn list_reserved_slots(
        &self,
        queue_id: QueueId,
        date: NaiveDate,
    ) -> Result<Vec<ReservedSlot>, EngineError> {
        Ok(self.day_schedule(queue_id, date).await?.into_slots())
    }

    pub async fn day_view(&self, queue_id: QueueId, date: NaiveDate) -> Result<DayView, EngineError> {
        let queue = self.store.get_queue(queue_id).await?;
        let calendar = QueueCalendar::new(queue, self.store.blackout_dates(queue_id).await?);
        let day = self.day_schedule(queue_id, date).await?;

        let blacked_out = is_date_blacked(&calendar, date);
        let bookable = calendar.queue.is_available && !blacked_out;
        let (free, open) = if bookable {
            (free_spans(&calendar.queue, &day), open_slots(&calendar.queue, &day))
        } else {
            (Vec::new(), Vec::new())
        };

        Ok(DayView {
            queue: calendar.queue,
            date,
            blacked_out,
            reservations: day.into_slots(),
            free,
            open_slots: open,
        })
    }
}
