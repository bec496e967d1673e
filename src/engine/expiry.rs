use tracing::{debug, info, warn};

use crate::model::*;
use crate::observability::{SLOTS_HELD, SWEEP_FAILURES_TOTAL, SWEEP_RELEASED_TOTAL};
use crate::store::StoreError;

use super::{Engine, EngineError};

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Slots freed by this pass.
    pub released: Vec<String>,
    /// Expired holds that changed under us before the write; not an error.
    pub stale: usize,
    /// Expired holds left in place because the store refused the write.
    pub failed: usize,
}

impl Engine {
    /// Free every slot whose hold has reached `expires_at`. Uses the same
    /// conditional write as release, so a hold that was released or re-booked
    /// since the scan is left alone.
    pub async fn sweep_expired(&self) -> Result<SweepReport, EngineError> {
        let now = self.now_ms();
        let slots = self.store.list_all().await?;
        let mut report = SweepReport::default();

        for slot in slots {
            let expired = slot.state.reservation().is_some_and(|r| r.is_expired(now));
            if !expired {
                continue;
            }
            match self
                .store
                .compare_and_set(&slot.id, &slot.state, SlotState::Free)
                .await
            {
                Ok(()) => {
                    if let SlotState::Held(r) = &slot.state {
                        info!(
                            "expired hold on {} by {} (reservation {})",
                            slot.id, r.holder, r.id
                        );
                    }
                    report.released.push(slot.id);
                }
                Err(StoreError::Conflict(_)) | Err(StoreError::NotFound(_)) => {
                    debug!("sweeper skip {}: state changed since scan", slot.id);
                    report.stale += 1;
                }
                Err(e) => {
                    warn!("sweeper could not free {}: {e}", slot.id);
                    report.failed += 1;
                }
            }
        }

        if !report.released.is_empty() {
            let n = report.released.len();
            metrics::counter!(SWEEP_RELEASED_TOTAL).increment(n as u64);
            metrics::gauge!(SLOTS_HELD).decrement(n as f64);
        }
        if report.failed > 0 {
            metrics::counter!(SWEEP_FAILURES_TOTAL).increment(report.failed as u64);
        }
        Ok(report)
    }
}
