#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    NotFound(String),
    /// The stored state did not match the caller's expectation.
    Conflict(String),
    Unavailable(String),
    InvalidSeed(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "slot not found: {id}"),
            StoreError::Conflict(id) => write!(f, "state of slot {id} changed concurrently"),
            StoreError::Unavailable(e) => write!(f, "slot store unavailable: {e}"),
            StoreError::InvalidSeed(e) => write!(f, "invalid seed set: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}
