use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds (UTC). Every instant in the crate uses it.
pub type Ms = i64;

pub type QueueId = Ulid;

/// Reservation handle. Holding it is enough to cancel the reservation.
pub type TokenNo = Ulid;

/// Opaque merchant identifier, resolved by the identity port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MerchantId(pub String);

impl MerchantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MerchantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Recurring time-of-day window, `[start, end)`, applied to every date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl ServiceWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn is_valid(&self) -> bool {
        self.start < self.end
    }
}

/// A bookable resource owned by one merchant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Queue {
    pub id: QueueId,
    pub merchant_id: MerchantId,
    pub name: String,
    pub interval_minutes: u32,
    pub window: ServiceWindow,
    /// When false, no new reservations are accepted.
    pub is_available: bool,
    pub created_at: Ms,
}

impl Queue {
    pub fn interval_ms(&self) -> Ms {
        Ms::from(self.interval_minutes) * 60_000
    }
}

/// Queue definition as submitted by a merchant, before an id is assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQueue {
    pub merchant_id: MerchantId,
    pub name: String,
    pub interval_minutes: u32,
    pub window: ServiceWindow,
}

/// Customer details captured at reservation time. Never a live reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
}

impl Customer {
    pub fn new(name: impl Into<String>, phone: impl Into<String>, email: Option<String>) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            email,
        }
    }

    /// Exactly ten ASCII digits.
    pub fn has_valid_phone(&self) -> bool {
        self.phone.len() == 10 && self.phone.bytes().all(|b| b.is_ascii_digit())
    }
}

/// A confirmed booking. Reserved slots are never edited, only cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservedSlot {
    pub token_no: TokenNo,
    pub queue_id: QueueId,
    pub span: Span,
    pub reserved_by: Customer,
    pub created_at: Ms,
}

/// A reservation that passed the engine's checks and awaits a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    pub queue_id: QueueId,
    pub span: Span,
    pub reserved_by: Customer,
}

/// The event types, flat. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    QueueCreated {
        queue: Queue,
    },
    AvailabilitySet {
        queue_id: QueueId,
        available: bool,
    },
    BlackoutAdded {
        queue_id: QueueId,
        dates: Vec<NaiveDate>,
    },
    BlackoutRemoved {
        queue_id: QueueId,
        dates: Vec<NaiveDate>,
    },
    SlotReserved {
        slot: ReservedSlot,
    },
    SlotReleased {
        token_no: TokenNo,
        queue_id: QueueId,
    },
    QueueDeleted {
        queue_id: QueueId,
    },
}

impl Event {
    pub fn queue_id(&self) -> QueueId {
        match self {
            Event::QueueCreated { queue } => queue.id,
            Event::SlotReserved { slot } => slot.queue_id,
            Event::AvailabilitySet { queue_id, .. }
            | Event::BlackoutAdded { queue_id, .. }
            | Event::BlackoutRemoved { queue_id, .. }
            | Event::SlotReleased { queue_id, .. }
            | Event::QueueDeleted { queue_id } => *queue_id,
        }
    }
}
