use thiserror::Error;

pub type ScoutResult<T> = std::result::Result<T, ScoutError>;

/// User-facing failures, one per feature entry point. Each variant is scoped to
/// the feature that raised it; nothing here should take the process down.
#[derive(Error, Debug)]
pub enum ScoutError {
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    #[error("no match found for '{0}'")]
    EntityNotFound(String),

    #[error("{service} failed: {source:#}")]
    ExternalService {
        service: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("unsupported question: {0}")]
    UnsupportedQuery(String),

    #[error("invalid selection: {0}")]
    InvalidSelection(String),
}

impl ScoutError {
    pub fn external(service: &'static str, source: anyhow::Error) -> Self {
        ScoutError::ExternalService { service, source }
    }

    pub fn data(source: anyhow::Error) -> Self {
        ScoutError::DataUnavailable(format!("{source:#}"))
    }

    /// Warnings are shown to the user but are not failures of the feature.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            ScoutError::EntityNotFound(_)
                | ScoutError::UnsupportedQuery(_)
                | ScoutError::InvalidSelection(_)
        )
    }
}
