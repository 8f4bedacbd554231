use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    /// Ownership guard. Unknown queues are reported as `NotOwned` as well, so
    /// merchants cannot discover other merchants' queue ids.
    pub async fn verify_owner(&self, merchant_id: &MerchantId, queue_id: QueueId) -> Result<(), EngineError> {
        if self.store.is_owned_by(merchant_id, queue_id).await? {
            Ok(())
        } else {
            tracing::debug!("merchant {merchant_id} does not own queue {queue_id}");
            Err(not_owned(merchant_id, queue_id))
        }
    }
}

pub(super) fn not_owned(merchant_id: &MerchantId, queue_id: QueueId) -> EngineError {
    EngineError::NotOwned {
        merchant_id: merchant_id.clone(),
        queue_id,
    }
}
