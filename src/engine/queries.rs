use crate::model::*;

use super::{Engine, EngineError, validate_slot_id};

impl Engine {
    /// Slots matching `filter`, in seed order. Each slot's state was true at
    /// some point during the call; there is no cross-slot snapshot.
    pub async fn query(&self, filter: &SlotFilter) -> Result<Vec<Slot>, EngineError> {
        let mut slots = self.store.list_all().await?;
        slots.retain(|s| filter.matches(s));
        Ok(slots)
    }

    /// Ids of currently held slots, in seed order.
    pub async fn occupancy(&self) -> Result<Vec<String>, EngineError> {
        Ok(self
            .store
            .list_all()
            .await?
            .into_iter()
            .filter(|s| !s.state.is_free())
            .map(|s| s.id)
            .collect())
    }

    pub async fn get_slot(&self, slot_id: &str) -> Result<Slot, EngineError> {
        validate_slot_id(slot_id)?;
        Ok(self.store.get(slot_id).await?)
    }
}
