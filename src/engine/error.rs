use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    InvalidInput(String),
    NotFound(String),
    AlreadyBooked(String),
    NotHeld(String),
    NotOwner(String),
    StoreUnavailable(String),
}

impl EngineError {
    /// Stable machine-readable name, used as the `kind` of API errors.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InvalidInput(_) => "InvalidInput",
            EngineError::NotFound(_) => "NotFound",
            EngineError::AlreadyBooked(_) => "AlreadyBooked",
            EngineError::NotHeld(_) => "NotHeld",
            EngineError::NotOwner(_) => "NotOwner",
            EngineError::StoreUnavailable(_) => "StoreUnavailable",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            EngineError::NotFound(id) => write!(f, "slot not found: {id}"),
            EngineError::AlreadyBooked(id) => write!(f, "slot {id} is already booked"),
            EngineError::NotHeld(id) => write!(f, "slot {id} is not held"),
            EngineError::NotOwner(id) => write!(f, "slot {id} is held by another user"),
            EngineError::StoreUnavailable(e) => write!(f, "store unavailable: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    /// `Conflict` defaults to `AlreadyBooked`; `release` maps it to `NotHeld` itself.
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => EngineError::NotFound(id),
            StoreError::Conflict(id) => EngineError::AlreadyBooked(id),
            StoreError::Unavailable(msg) => EngineError::StoreUnavailable(msg),
            StoreError::InvalidSeed(msg) => EngineError::InvalidInput(msg),
        }
    }
}
