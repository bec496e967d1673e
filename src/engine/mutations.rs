use tracing::info;

use crate::model::*;
use crate::observability::{BOOKINGS_TOTAL, RELEASES_TOTAL, SLOTS_HELD};
use crate::store::StoreError;

use super::{Engine, EngineError, validate_duration, validate_holder, validate_slot_id};

impl Engine {
    /// Place a hold on a free slot. A lost race reports `AlreadyBooked`;
    /// retrying is the caller's decision.
    pub async fn book(
        &self,
        slot_id: &str,
        holder: &str,
        duration_hours: i64,
    ) -> Result<Reservation, EngineError> {
        let result = self.try_book(slot_id, holder, duration_hours).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        metrics::counter!(BOOKINGS_TOTAL, "outcome" => outcome).increment(1);
        result
    }

    async fn try_book(
        &self,
        slot_id: &str,
        holder: &str,
        duration_hours: i64,
    ) -> Result<Reservation, EngineError> {
        validate_slot_id(slot_id)?;
        validate_holder(holder)?;
        let duration_hours = validate_duration(duration_hours)?;

        let slot = self.store.get(slot_id).await?;
        if !slot.state.is_free() {
            return Err(EngineError::AlreadyBooked(slot_id.to_string()));
        }

        let reservation = Reservation::new(holder, self.now_ms(), duration_hours);
        self.store
            .compare_and_set(
                slot_id,
                &SlotState::Free,
                SlotState::Held(reservation.clone()),
            )
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => EngineError::AlreadyBooked(slot_id.to_string()),
                other => other.into(),
            })?;

        metrics::gauge!(SLOTS_HELD).increment(1.0);
        info!(
            "slot {slot_id} booked by {holder} for {duration_hours}h (reservation {})",
            reservation.id
        );
        Ok(reservation)
    }

    /// Free a slot held by `holder`. Ownership is identity match only.
    pub async fn release(&self, slot_id: &str, holder: &str) -> Result<(), EngineError> {
        let result = self.try_release(slot_id, holder).await;
        let outcome = match &result {
            Ok(()) => "ok",
            Err(e) => e.kind(),
        };
        metrics::counter!(RELEASES_TOTAL, "outcome" => outcome).increment(1);
        result
    }

    async fn try_release(&self, slot_id: &str, holder: &str) -> Result<(), EngineError> {
        validate_slot_id(slot_id)?;
        validate_holder(holder)?;

        let slot = self.store.get(slot_id).await?;
        let current = match &slot.state {
            SlotState::Free => return Err(EngineError::NotHeld(slot_id.to_string())),
            SlotState::Held(r) if r.holder != holder => {
                return Err(EngineError::NotOwner(slot_id.to_string()));
            }
            SlotState::Held(r) => r.id,
        };

        self.store
            .compare_and_set(slot_id, &slot.state, SlotState::Free)
            .await
            .map_err(|e| match e {
                // Expired or released between our read and write
                StoreError::Conflict(_) => EngineError::NotHeld(slot_id.to_string()),
                other => other.into(),
            })?;

        metrics::gauge!(SLOTS_HELD).decrement(1.0);
        info!("slot {slot_id} released by {holder} (reservation {current})");
        Ok(())
    }
}
