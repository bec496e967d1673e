mod error;
mod expiry;
mod mutations;
mod queries;

pub use error::EngineError;
pub use expiry::SweepReport;

use std::sync::Arc;

use crate::clock::Clock;
use crate::limits::*;
use crate::model::Ms;
use crate::store::SlotStore;

/// Booking protocol on top of a [`SlotStore`]. Every mutation goes through
/// `compare_and_set`; the engine itself holds no slot state.
pub struct Engine {
    store: Arc<dyn SlotStore>,
    clock: Arc<dyn Clock>,
}

impl Engine {
    pub fn new(store: Arc<dyn SlotStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &Arc<dyn SlotStore> {
        &self.store
    }

    pub fn now_ms(&self) -> Ms {
        self.clock.now_ms()
    }

    /// Publish the current held count to the gauge. Called once at startup;
    /// afterwards mutations adjust the gauge incrementally.
    pub async fn sync_held_gauge(&self) -> Result<usize, EngineError> {
        let held = self.occupancy().await?.len();
        metrics::gauge!(crate::observability::SLOTS_HELD).set(held as f64);
        Ok(held)
    }
}

pub(super) fn validate_slot_id(slot_id: &str) -> Result<(), EngineError> {
    if slot_id.is_empty() {
        return Err(EngineError::InvalidInput("slot id must not be empty".into()));
    }
    if slot_id.len() > MAX_SLOT_ID_LEN {
        return Err(EngineError::InvalidInput("slot id too long".into()));
    }
    Ok(())
}

pub(super) fn validate_holder(holder: &str) -> Result<(), EngineError> {
    if holder.is_empty() {
        return Err(EngineError::InvalidInput("holder must not be empty".into()));
    }
    if holder.len() > MAX_HOLDER_LEN {
        return Err(EngineError::InvalidInput("holder too long".into()));
    }
    Ok(())
}

pub(super) fn validate_duration(duration_hours: i64) -> Result<u32, EngineError> {
    if !(MIN_DURATION_HOURS..=MAX_DURATION_HOURS).contains(&duration_hours) {
        return Err(EngineError::InvalidInput(format!(
            "durationHours must be between {MIN_DURATION_HOURS} and {MAX_DURATION_HOURS}, got {duration_hours}"
        )));
    }
    Ok(duration_hours as u32)
}
