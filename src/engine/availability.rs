//! Availability policy: pure decisions over calendar projections, no I/O.
//!
//! Conflict detection only goes through [`DaySchedule::overlapping`], so the
//! schedule's backing structure can change (e.g. to an interval tree) without
//! touching the callers here.

use chrono::NaiveDate;

use crate::calendar::{DaySchedule, QueueCalendar, date_of, window_span};
use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// Turn raw bounds into a span. `start >= end` is malformed input; bounds
/// outside the supported range or longer than a day hit a limit.
pub fn validate_span(start: Ms, end: Ms) -> Result<Span, EngineError> {
    if start >= end {
        return Err(EngineError::InvalidInput("start must be before end"));
    }
    if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    let span = Span::new(start, end);
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("span too wide"));
    }
    Ok(span)
}

pub fn is_date_blacked(calendar: &QueueCalendar, date: NaiveDate) -> bool {
    calendar.blackout_dates().contains(&date)
}

/// True iff `span` lies inside the window as materialized on its start date.
pub fn within_window(queue: &Queue, span: &Span) -> bool {
    date_of(span.start).is_some_and(|date| window_span(&queue.window, date).contains_span(span))
}

/// First reservation overlapping `candidate`, if any.
pub fn conflicts(existing: &DaySchedule, candidate: &Span) -> Option<TokenNo> {
    existing.overlapping(candidate).next().map(|s| s.token_no)
}

/// The advertised slots of a date: the window stepped by the queue interval.
/// A trailing remainder shorter than one interval is not a slot.
pub fn slot_grid(queue: &Queue, date: NaiveDate) -> Vec<Span> {
    let window = window_span(&queue.window, date);
    let step = queue.interval_ms();
    if step <= 0 {
        return Vec::new();
    }
    let mut slots = Vec::new();
    let mut start = window.start;
    while start + step <= window.end {
        slots.push(Span::new(start, start + step));
        start += step;
    }
    slots
}

/// Grid slots that no reservation touches.
pub fn open_slots(queue: &Queue, day: &DaySchedule) -> Vec<Span> {
    slot_grid(queue, day.date)
        .into_iter()
        .filter(|slot| conflicts(day, slot).is_none())
        .collect()
}

/// The window of `day.date` minus its reservations, as disjoint spans.
pub fn free_spans(queue: &Queue, day: &DaySchedule) -> Vec<Span> {
    let window = [window_span(&queue.window, day.date)];
    subtract_intervals(&window, &day.reserved_spans())
}

/// Both inputs sorted by start; `to_remove` may overlap itself.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < b.end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < b.end {
            result.push(Span::new(current_start, b.end));
        }
    }

    result
}
