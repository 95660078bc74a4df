use thiserror::Error;

/// Reasons an effect descriptor is refused by the catalog.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("effect id must not be blank")]
    EmptyId,

    #[error("effect '{id}' must have a non-blank name")]
    EmptyName { id: String },

    #[error("effect id '{0}' is already registered")]
    DuplicateId(String),

    #[error("effect '{id}' declares invalid parameter name '{name}'")]
    InvalidParameterName { id: String, name: String },

    #[error("effect '{id}' parameter '{name}' default {value} is outside [0, 1]")]
    ParameterOutOfRange { id: String, name: String, value: f32 },

    #[error("effect '{id}' declares {count} parameters; at most {max} are supported")]
    TooManyParameters { id: String, count: usize, max: usize },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CatalogError {
    #[error("effect '{0}' not found")]
    NotFound(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}
