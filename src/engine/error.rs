use crate::model::PersonKey;

/// Kind of row an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Attendee,
    Booking,
    Artist,
    ArtistBooking,
    Assignment,
    Timeslot,
}

impl Entity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Entity::Attendee => "attendee",
            Entity::Booking => "booking",
            Entity::Artist => "artist",
            Entity::ArtistBooking => "artist booking",
            Entity::Assignment => "assignment",
            Entity::Timeslot => "timeslot",
        }
    }
}

#[derive(Debug)]
pub enum EngineError {
    NotFound(Entity, u64),
    /// An update would give a record the identity triple of another record.
    AlreadyExists(Entity, PersonKey),
    Invalid {
        field: &'static str,
        reason: String,
    },
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        EngineError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(entity, id) => write!(f, "{} not found: {id}", entity.as_str()),
            EngineError::AlreadyExists(entity, key) => write!(
                f,
                "{} already exists: {} {} <{}>",
                entity.as_str(),
                key.first_name,
                key.last_name,
                key.email
            ),
            EngineError::Invalid { field, reason } => write!(f, "invalid {field}: {reason}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
