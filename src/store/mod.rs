mod error;
mod writer;

pub use error::StoreError;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};

use crate::limits::*;
use crate::model::*;
use crate::wal::Wal;

use writer::{WalCommand, wal_writer_loop};

pub type SharedSlot = Arc<RwLock<Slot>>;

/// Keyed slot storage with a single mutation primitive.
#[async_trait]
pub trait SlotStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Slot, StoreError>;

    /// Every slot, in seed order.
    async fn list_all(&self) -> Result<Vec<Slot>, StoreError>;

    /// Replace the state of `id` with `new` iff it currently equals `expected`.
    /// Fails with `Conflict` (and no effect) otherwise.
    async fn compare_and_set(
        &self,
        id: &str,
        expected: &SlotState,
        new: SlotState,
    ) -> Result<(), StoreError>;
}

/// In-memory slot table, optionally made durable by a group-committed WAL.
pub struct LogStore {
    slots: DashMap<String, SharedSlot>,
    order: Vec<String>,
    wal_tx: Option<mpsc::Sender<WalCommand>>,
    /// Shared by mutations, exclusive for compaction, so a compacted log
    /// never drops an acknowledged write.
    compaction: RwLock<()>,
}

impl LogStore {
    /// Store without a WAL. State is lost on drop.
    pub fn in_memory<S: AsRef<str>>(seed: &[S]) -> Result<Self, StoreError> {
        let slots = seed_slots(seed)?;
        Ok(Self::from_slots(slots, None))
    }

    /// Open the WAL at `wal_path` (cutting any torn tail), replay it over the
    /// seed set, and spawn the group-commit writer. Must be called inside a
    /// tokio runtime.
    pub fn open<S: AsRef<str>>(wal_path: &Path, seed: &[S]) -> Result<Self, StoreError> {
        let mut slots = seed_slots(seed)?;
        let (wal, events) =
            Wal::open(wal_path).map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let index: HashMap<String, usize> = slots
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();
        let mut skipped = 0usize;
        for event in &events {
            match index.get(event.slot_id()) {
                Some(&i) => slots[i].state = event.resulting_state(),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            tracing::warn!("WAL replay skipped {skipped} records for slots outside the seed set");
        }

        let (wal_tx, wal_rx) = mpsc::channel(WAL_CHANNEL_CAPACITY);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        tracing::info!(
            "slot store opened: {} slots, {} WAL records replayed",
            slots.len(),
            events.len()
        );
        Ok(Self::from_slots(slots, Some(wal_tx)))
    }

    fn from_slots(slots: Vec<Slot>, wal_tx: Option<mpsc::Sender<WalCommand>>) -> Self {
        let order = slots.iter().map(|s| s.id.clone()).collect();
        let map = DashMap::with_capacity(slots.len());
        for slot in slots {
            map.insert(slot.id.clone(), Arc::new(RwLock::new(slot)));
        }
        Self {
            slots: map,
            order,
            wal_tx,
            compaction: RwLock::new(()),
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn is_durable(&self) -> bool {
        self.wal_tx.is_some()
    }

    fn shared(&self, id: &str) -> Result<SharedSlot, StoreError> {
        self.slots
            .get(id)
            .map(|e| e.value().clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn wal_append(&self, event: Event) -> Result<(), StoreError> {
        let Some(wal_tx) = &self.wal_tx else {
            return Ok(());
        };
        let (tx, rx) = oneshot::channel();
        wal_tx
            .send(WalCommand::Append { event, response: tx })
            .await
            .map_err(|_| StoreError::Unavailable("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Unavailable("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    /// Rewrite the WAL as one record per currently held slot.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let Some(wal_tx) = &self.wal_tx else {
            return Ok(());
        };
        let _exclusive = self.compaction.write().await;

        let mut events = Vec::new();
        for id in &self.order {
            let slot = self.shared(id)?.read().await.clone();
            if let SlotState::Held(reservation) = slot.state {
                events.push(Event::Held {
                    slot_id: slot.id,
                    reservation,
                });
            }
        }
        let kept = events.len();

        let (tx, rx) = oneshot::channel();
        wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| StoreError::Unavailable("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Unavailable("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        tracing::info!("WAL compacted to {kept} records");
        Ok(())
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let Some(wal_tx) = &self.wal_tx else {
            return 0;
        };
        let (tx, rx) = oneshot::channel();
        if wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl SlotStore for LogStore {
    async fn get(&self, id: &str) -> Result<Slot, StoreError> {
        let shared = self.shared(id)?;
        let guard = shared.read().await;
        Ok(guard.clone())
    }

    async fn list_all(&self) -> Result<Vec<Slot>, StoreError> {
        let mut out = Vec::with_capacity(self.order.len());
        for id in &self.order {
            let shared = self.shared(id)?;
            out.push(shared.read().await.clone());
        }
        Ok(out)
    }

    async fn compare_and_set(
        &self,
        id: &str,
        expected: &SlotState,
        new: SlotState,
    ) -> Result<(), StoreError> {
        let shared = self.shared(id)?;
        let _mutation = self.compaction.read().await;
        let mut guard = shared.write().await;
        if guard.state != *expected {
            return Err(StoreError::Conflict(id.to_string()));
        }
        // Durable before visible: a failed append leaves the slot untouched.
        self.wal_append(Event::for_transition(id, &new)).await?;
        guard.state = new;
        Ok(())
    }
}

fn seed_slots<S: AsRef<str>>(seed: &[S]) -> Result<Vec<Slot>, StoreError> {
    if seed.is_empty() {
        return Err(StoreError::InvalidSeed("no slots".into()));
    }
    if seed.len() > MAX_SEED_SLOTS {
        return Err(StoreError::InvalidSeed(format!(
            "{} slots exceeds limit of {MAX_SEED_SLOTS}",
            seed.len()
        )));
    }
    let mut seen = std::collections::HashSet::with_capacity(seed.len());
    let mut slots = Vec::with_capacity(seed.len());
    for id in seed {
        let id = id.as_ref().trim();
        if id.is_empty() {
            return Err(StoreError::InvalidSeed("empty slot id".into()));
        }
        if id.len() > MAX_SLOT_ID_LEN {
            return Err(StoreError::InvalidSeed(format!("slot id too long: {id}")));
        }
        if !seen.insert(id.to_string()) {
            return Err(StoreError::InvalidSeed(format!("duplicate slot id: {id}")));
        }
        slots.push(Slot::new(id));
    }
    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("parkhold_test_store");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn held(holder: &str) -> SlotState {
        SlotState::Held(Reservation::new(holder, 0, 1))
    }

    #[tokio::test]
    async fn list_all_keeps_seed_order() {
        let store = LogStore::in_memory(&["C-1", "A-1", "B-1"]).unwrap();
        let ids: Vec<String> = store
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["C-1", "A-1", "B-1"]);
        assert_eq!(store.len(), 3);
        assert!(!store.is_durable());
    }

    #[tokio::test]
    async fn get_unknown_slot() {
        let store = LogStore::in_memory(DEFAULT_SEED).unwrap();
        assert_eq!(
            store.get("Z-9").await,
            Err(StoreError::NotFound("Z-9".into()))
        );
    }

    #[tokio::test]
    async fn seed_validation() {
        assert!(matches!(
            LogStore::in_memory::<&str>(&[]),
            Err(StoreError::InvalidSeed(_))
        ));
        assert!(matches!(
            LogStore::in_memory(&["A-1", "A-1"]),
            Err(StoreError::InvalidSeed(_))
        ));
        assert!(matches!(
            LogStore::in_memory(&["A-1", "  "]),
            Err(StoreError::InvalidSeed(_))
        ));
        let long = "x".repeat(MAX_SLOT_ID_LEN + 1);
        assert!(matches!(
            LogStore::in_memory(&[long.as_str()]),
            Err(StoreError::InvalidSeed(_))
        ));
    }

    #[tokio::test]
    async fn cas_applies_on_match_and_is_visible() {
        let store = LogStore::in_memory(&["A-1"]).unwrap();
        let state = held("u1");
        store
            .compare_and_set("A-1", &SlotState::Free, state.clone())
            .await
            .unwrap();
        assert_eq!(store.get("A-1").await.unwrap().state, state);
    }

    #[tokio::test]
    async fn cas_rejects_stale_expectation() {
        let store = LogStore::in_memory(&["A-1"]).unwrap();
        let first = held("u1");
        store
            .compare_and_set("A-1", &SlotState::Free, first.clone())
            .await
            .unwrap();

        // Second writer still believes the slot is free
        let result = store
            .compare_and_set("A-1", &SlotState::Free, held("u2"))
            .await;
        assert_eq!(result, Err(StoreError::Conflict("A-1".into())));
        assert_eq!(store.get("A-1").await.unwrap().state, first);

        // An old hold with the same shape is still a different hold
        let lookalike = held("u1");
        let result = store
            .compare_and_set("A-1", &lookalike, SlotState::Free)
            .await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn cas_unknown_slot() {
        let store = LogStore::in_memory(&["A-1"]).unwrap();
        let result = store
            .compare_and_set("B-1", &SlotState::Free, held("u1"))
            .await;
        assert_eq!(result, Err(StoreError::NotFound("B-1".into())));
    }

    #[tokio::test]
    async fn holds_survive_reopen() {
        let path = test_wal_path("reopen.wal");
        let state = held("u1");
        {
            let store = LogStore::open(&path, DEFAULT_SEED).unwrap();
            assert!(store.is_durable());
            store
                .compare_and_set("B-2", &SlotState::Free, state.clone())
                .await
                .unwrap();
            store
                .compare_and_set("A-1", &SlotState::Free, held("u2"))
                .await
                .unwrap();
            let a1 = store.get("A-1").await.unwrap().state;
            store
                .compare_and_set("A-1", &a1, SlotState::Free)
                .await
                .unwrap();
        }

        let store = LogStore::open(&path, DEFAULT_SEED).unwrap();
        assert_eq!(store.get("B-2").await.unwrap().state, state);
        assert_eq!(store.get("A-1").await.unwrap().state, SlotState::Free);
    }

    #[tokio::test]
    async fn replay_skips_slots_outside_seed() {
        let path = test_wal_path("outside_seed.wal");
        {
            let store = LogStore::open(&path, &["A-1", "Q-1"]).unwrap();
            store
                .compare_and_set("Q-1", &SlotState::Free, held("u1"))
                .await
                .unwrap();
        }
        let store = LogStore::open(&path, &["A-1"]).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get("A-1").await.unwrap().state.is_free());
    }

    #[tokio::test]
    async fn compact_preserves_state_and_shrinks_log() {
        let path = test_wal_path("compact.wal");
        let keeper = held("keeper");
        {
            let store = LogStore::open(&path, DEFAULT_SEED).unwrap();
            for i in 0..25 {
                let state = held(&format!("u{i}"));
                store
                    .compare_and_set("A-1", &SlotState::Free, state.clone())
                    .await
                    .unwrap();
                store
                    .compare_and_set("A-1", &state, SlotState::Free)
                    .await
                    .unwrap();
            }
            store
                .compare_and_set("D-2", &SlotState::Free, keeper.clone())
                .await
                .unwrap();
            assert_eq!(store.appends_since_compact().await, 51);

            let before = std::fs::metadata(&path).unwrap().len();
            store.compact().await.unwrap();
            let after = std::fs::metadata(&path).unwrap().len();
            assert!(after < before, "compacted WAL ({after}) should be smaller than {before}");
            assert_eq!(store.appends_since_compact().await, 0);

            // Appends after compaction land in the new file
            store
                .compare_and_set("C-1", &SlotState::Free, held("late"))
                .await
                .unwrap();
        }

        let store = LogStore::open(&path, DEFAULT_SEED).unwrap();
        assert!(store.get("A-1").await.unwrap().state.is_free());
        assert_eq!(store.get("D-2").await.unwrap().state, keeper);
        assert!(!store.get("C-1").await.unwrap().state.is_free());
    }

    #[tokio::test]
    async fn failed_write_is_not_replayed() {
        let path = test_wal_path("failed_write.wal");
        let hold = held("u1");
        let later = held("u2");
        {
            let store = LogStore::open(&path, DEFAULT_SEED).unwrap();
            store
                .compare_and_set("A-1", &SlotState::Free, hold.clone())
                .await
                .unwrap();

            crate::wal::failpoint::fail_next_commit(&path);
            let result = store
                .compare_and_set("A-1", &hold, SlotState::Free)
                .await;
            assert!(matches!(result, Err(StoreError::Unavailable(_))));
            assert_eq!(store.get("A-1").await.unwrap().state, hold);

            // The next batch must not drag the failed record along
            store
                .compare_and_set("A-2", &SlotState::Free, later.clone())
                .await
                .unwrap();
        }

        let store = LogStore::open(&path, DEFAULT_SEED).unwrap();
        assert_eq!(store.get("A-1").await.unwrap().state, hold);
        assert_eq!(store.get("A-2").await.unwrap().state, later);
    }

    #[tokio::test]
    async fn compact_in_memory_is_noop() {
        let store = LogStore::in_memory(&["A-1"]).unwrap();
        store.compact().await.unwrap();
        assert_eq!(store.appends_since_compact().await, 0);
    }
}
