use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CardError {
    #[error("failed to load card template {path}: {source}")]
    Template {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to encode card: {0}")]
    Encode(#[from] image::ImageError),
}

/// Problems that degrade the card without stopping it from being produced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CardWarning {
    #[error("Error processing photo: {0}")]
    PhotoDecode(String),
}
