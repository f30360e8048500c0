use ulid::Ulid;

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// Malformed input or an invariant the request itself would break.
    Validation(String),
    /// Overlaps this existing booking.
    Conflict(Ulid),
    /// Operation not allowed in the entity's current lifecycle state.
    State(String),
    /// Cantina subscription has no meals left.
    InsufficientCredits(Ulid),
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    pub(crate) fn state(msg: impl Into<String>) -> Self {
        EngineError::State(msg.into())
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::Validation(msg) => write!(f, "invalid request: {msg}"),
            EngineError::Conflict(id) => write!(f, "conflicts with booking {id}"),
            EngineError::State(msg) => write!(f, "not allowed: {msg}"),
            EngineError::InsufficientCredits(id) => {
                write!(f, "no meal credits left on subscription {id}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
