use shared::error::ApiError;
use thiserror::Error;

/// Failure surface shared by the browser, detail loaders and forms.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("no listing found for slug '{slug}'")]
    NotFound { slug: String },
    #[error("server rejected request: {0}")]
    Api(ApiError),
    #[error("validation failed: {0}")]
    Validation(String),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
