//! Read projections of a queue's calendar.
//!
//! Nothing here mutates state: the engine fetches a [`QueueCalendar`] or a
//! [`DaySchedule`] from the storage port, asks the availability policy about
//! it, and throws it away. All calendar arithmetic is UTC.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, NaiveTime};

use crate::model::*;

pub const DAY_MS: Ms = 86_400_000;

/// Instant of `time` on `date`.
pub fn at(date: NaiveDate, time: NaiveTime) -> Ms {
    date.and_time(time).and_utc().timestamp_millis()
}

/// Midnight at the start of `date`.
pub fn day_start(date: NaiveDate) -> Ms {
    at(date, NaiveTime::default())
}

/// The whole of `date` as a span.
pub fn day_span(date: NaiveDate) -> Span {
    let start = day_start(date);
    Span::new(start, start + DAY_MS)
}

/// Calendar date an instant falls on. `None` outside chrono's range.
pub fn date_of(ms: Ms) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(ms).map(|dt| dt.date_naive())
}

/// The queue's recurring window materialized on `date`.
pub fn window_span(window: &ServiceWindow, date: NaiveDate) -> Span {
    Span::new(at(date, window.start), at(date, window.end))
}

/// A queue together with its blackout dates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueCalendar {
    pub queue: Queue,
    blackout: BTreeSet<NaiveDate>,
}

impl QueueCalendar {
    pub fn new(queue: Queue, blackout: BTreeSet<NaiveDate>) -> Self {
        Self { queue, blackout }
    }

    pub fn blackout_dates(&self) -> &BTreeSet<NaiveDate> {
        &self.blackout
    }
}

/// Reservations of one queue on one date, ordered by `span.start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaySchedule {
    pub date: NaiveDate,
    slots: Vec<ReservedSlot>,
}

impl DaySchedule {
    pub fn new(date: NaiveDate, mut slots: Vec<ReservedSlot>) -> Self {
        // Storage returns these sorted already; a stable sort of sorted input is linear.
        slots.sort_by_key(|s| s.span.start);
        Self { date, slots }
    }

    pub fn reserved_slots(&self) -> &[ReservedSlot] {
        &self.slots
    }

    pub fn into_slots(self) -> Vec<ReservedSlot> {
        self.slots
    }

    pub fn reserved_spans(&self) -> Vec<Span> {
        self.slots.iter().map(|s| s.span).collect()
    }

    /// Reservations whose span overlaps `query`.
    /// Uses binary search to skip slots starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &ReservedSlot> {
        let right_bound = self.slots.partition_point(|s| s.span.start < query.end);
        self.slots[..right_bound]
            .iter()
            .filter(move |s| s.span.end > query.start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn slot(start: Ms, end: Ms) -> ReservedSlot {
        ReservedSlot {
            token_no: Ulid::new(),
            queue_id: Ulid::nil(),
            span: Span::new(start, end),
            reserved_by: Customer::new("Amal", "0771234567", None),
            created_at: 0,
        }
    }

    #[test]
    fn at_and_date_of_agree() {
        let d = date("2024-01-10");
        let nine = at(d, hm(9, 0));
        assert_eq!(nine, 1_704_877_200_000);
        assert_eq!(date_of(nine), Some(d));
        assert_eq!(date_of(day_start(d) - 1), Some(date("2024-01-09")));
    }

    #[test]
    fn day_span_is_one_day() {
        let d = date("2024-02-29");
        let span = day_span(d);
        assert_eq!(span.duration_ms(), DAY_MS);
        assert_eq!(date_of(span.end), Some(date("2024-03-01")));
    }

    #[test]
    fn window_materializes_on_date() {
        let d = date("2024-01-10");
        let w = ServiceWindow::new(hm(9, 0), hm(12, 0));
        let span = window_span(&w, d);
        assert_eq!(span.start, at(d, hm(9, 0)));
        assert_eq!(span.duration_ms(), 3 * 3_600_000);
    }

    #[test]
    fn schedule_sorts_slots() {
        let schedule = DaySchedule::new(
            date("2024-01-10"),
            vec![slot(300, 400), slot(100, 200), slot(200, 300)],
        );
        let starts: Vec<Ms> = schedule.reserved_slots().iter().map(|s| s.span.start).collect();
        assert_eq!(starts, vec![100, 200, 300]);
    }

    #[test]
    fn overlapping_skips_past_and_future() {
        let schedule = DaySchedule::new(
            date("2024-01-10"),
            vec![slot(100, 200), slot(450, 600), slot(1000, 1100)],
        );
        let hits: Vec<_> = schedule.overlapping(&Span::new(500, 800)).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].span, Span::new(450, 600));
    }

    #[test]
    fn overlapping_adjacent_not_included() {
        let schedule = DaySchedule::new(date("2024-01-10"), vec![slot(100, 200)]);
        assert_eq!(schedule.overlapping(&Span::new(200, 300)).count(), 0);
        assert_eq!(schedule.overlapping(&Span::new(0, 100)).count(), 0);
    }

    #[test]
    fn overlapping_empty_schedule() {
        let schedule = DaySchedule::new(date("2024-01-10"), Vec::new());
        assert_eq!(schedule.overlapping(&Span::new(0, 1000)).count(), 0);
    }

    #[test]
    fn calendar_exposes_blackouts() {
        let queue = Queue {
            id: Ulid::new(),
            merchant_id: MerchantId::new("m-1"),
            name: "Clinic".into(),
            interval_minutes: 30,
            window: ServiceWindow::new(hm(9, 0), hm(12, 0)),
            is_available: true,
            created_at: 0,
        };
        let blackout: BTreeSet<_> = [date("2024-01-11")].into_iter().collect();
        let cal = QueueCalendar::new(queue, blackout);
        assert!(cal.blackout_dates().contains(&date("2024-01-11")));
        assert!(!cal.blackout_dates().contains(&date("2024-01-10")));
    }
}
