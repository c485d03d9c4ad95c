use std::collections::BTreeMap;
use thiserror::Error;

/// Engine-level failure taxonomy. Validation and not-found conditions are
/// normally surfaced to callers as a [`MutationOutcome`] instead of an
/// error; the variants exist for paths that must propagate.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0:?}")]
    Validation(BTreeMap<String, String>),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("external service error: {0}")]
    ExternalService(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Structured result of a mutating operation. Validation and lookup
/// failures land here with a field-keyed error map; only infrastructure
/// failures become an `Err`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationOutcome {
    pub errors: BTreeMap<String, String>,
}

impl MutationOutcome {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn failure(field: &str, message: impl Into<String>) -> Self {
        let mut errors = BTreeMap::new();
        errors.insert(field.to_string(), message.into());
        Self { errors }
    }

    pub fn from_errors(errors: BTreeMap<String, String>) -> Self {
        Self { errors }
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}
