use thiserror::Error;

/// A storage call failed. The variant says which step of the pipeline it
/// was; the source is whatever the store adapter reported.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to upload {key}")]
    Transfer {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to list objects under {prefix}")]
    Listing {
        prefix: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to read metadata of {key}")]
    Metadata {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to resolve download URL of {key}")]
    UrlResolution {
        key: String,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("another upload is already in progress")]
    Busy,

    #[error(transparent)]
    Store(#[from] StoreError),
}
