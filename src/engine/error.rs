use chrono::NaiveDate;
use thiserror::Error;
use ulid::Ulid;

use crate::identity::IdentityError;
use crate::model::{MerchantId, QueueId, Span, TokenNo};
use crate::store::StoreError;

/// Every failure the engine reports. All are recoverable; only
/// `DependencyUnavailable` is worth retrying unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// Unknown queue or reservation token.
    #[error("not found: {0}")]
    NotFound(Ulid),
    #[error("queue {queue_id} is not owned by merchant {merchant_id}")]
    NotOwned { merchant_id: MerchantId, queue_id: QueueId },
    #[error("queue {0} is not accepting reservations")]
    QueueUnavailable(QueueId),
    #[error("{0} is blacked out")]
    DateBlacked(NaiveDate),
    #[error("{0} falls outside the queue's service window")]
    OutsideWindow(Span),
    #[error("conflict with reservation: {0}")]
    SlotConflict(TokenNo),
    #[error("unauthorized")]
    Unauthorized,
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),
}

impl EngineError {
    /// Short stable label, used as a metrics dimension.
    pub fn label(&self) -> &'static str {
        match self {
            EngineError::InvalidInput(_) => "invalid_input",
            EngineError::NotFound(_) => "not_found",
            EngineError::NotOwned { .. } => "not_owned",
            EngineError::QueueUnavailable(_) => "queue_unavailable",
            EngineError::DateBlacked(_) => "date_blacked",
            EngineError::OutsideWindow(_) => "outside_window",
            EngineError::SlotConflict(_) => "slot_conflict",
            EngineError::Unauthorized => "unauthorized",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::DependencyUnavailable(_) => "dependency_unavailable",
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => EngineError::NotFound(id),
            StoreError::Conflict(token) => EngineError::SlotConflict(token),
            StoreError::LimitExceeded(msg) => EngineError::LimitExceeded(msg),
            StoreError::Unavailable(msg) => EngineError::DependencyUnavailable(msg),
        }
    }
}

impl From<IdentityError> for EngineError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::Unauthorized => EngineError::Unauthorized,
            IdentityError::Unavailable(msg) => EngineError::DependencyUnavailable(msg),
        }
    }
}
