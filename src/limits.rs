// Input bounds enforced at the engine boundary.

pub const MIN_DURATION_HOURS: i64 = 1;
pub const MAX_DURATION_HOURS: i64 = 12;

pub const MAX_HOLDER_LEN: usize = 256;
pub const MAX_SLOT_ID_LEN: usize = 64;
pub const MAX_SEED_SLOTS: usize = 10_000;

/// Sweeps further apart than this stretch the occupancy staleness bound.
pub const RECOMMENDED_MAX_SWEEP_SECS: u64 = 60;

pub const WAL_CHANNEL_CAPACITY: usize = 4096;
