use crate::model::Ms;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2100-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// A reservation never spans more than one day.
pub const MAX_SPAN_DURATION_MS: Ms = 86_400_000;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_EMAIL_LEN: usize = 320;
pub const MAX_INTERVAL_MINUTES: u32 = 24 * 60;
pub const MAX_BLACKOUT_DATES_PER_CALL: usize = 366;
pub const MAX_QUEUES_PER_MERCHANT: usize = 1_000;
pub const MAX_SLOTS_PER_QUEUE: usize = 1_000_000;
