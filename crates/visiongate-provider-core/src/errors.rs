pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("provider not registered: {0}")]
    NotRegistered(&'static str),
    #[error("{0}")]
    Other(String),
}
