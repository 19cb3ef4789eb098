use identity::NetworkId;
use space::SpaceError;

#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    #[error("entity {0} not found")]
    EntityNotFound(NetworkId),
    #[error("entity {0} is not a character")]
    NotACharacter(NetworkId),
    #[error("area '{0}' not found")]
    AreaNotFound(String),
    #[error("area '{area}' has no link named '{link}'")]
    LinkNotFound { area: String, link: String },
    #[error("unknown entity type '{0}'")]
    UnknownEntityType(String),
    #[error("unknown item '{0}'")]
    UnknownItem(String),
    /// A sequencing bug, e.g. damaging an entity that is already destroyed.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error("bad map data for '{area}': {reason}")]
    MapData { area: String, reason: String },
    #[error("catalog error: {0}")]
    Catalog(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Space(#[from] SpaceError),
}

impl WorldError {
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, WorldError::InvariantViolation(_))
    }
}
