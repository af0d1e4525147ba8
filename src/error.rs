use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompositeError {
    #[error("failed to load source image: {0}")]
    AssetLoad(String),

    #[error("source image was not ready after {0:?}")]
    AssetTimeout(Duration),

    #[error("failed to render composite: {0}")]
    Render(String),

    #[error("failed to encode composite: {0}")]
    Encode(String),
}
