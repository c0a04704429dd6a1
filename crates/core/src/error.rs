/// Result alias that carries the custom [`SphereError`] type.
pub type Result<T> = std::result::Result<T, SphereError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum SphereError {
    /// Free-form message, used where no dedicated variant applies.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// JSON (de)serialisation failure outside of story validation.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// Caller supplied a value the subsystem cannot work with.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// A video, image or model asset could not be loaded.
    #[error("failed to load asset `{asset}`: {reason}")]
    AssetLoad { asset: String, reason: String },
    /// The generative API answered with a non-success status code.
    #[error("generative API returned {status}: {body}")]
    Http { status: u16, body: String },
    /// The generative API could not be reached at all.
    #[error("failed to reach generative API: {0}")]
    Transport(String),
    /// The generated story did not match the expected JSON template.
    #[error("malformed story response: {0}")]
    MalformedStory(String),
    /// The experience has been torn down and no longer accepts input.
    #[error("experience has been torn down")]
    TornDown,
}

impl SphereError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Builds a [`SphereError::AssetLoad`] for the given asset path.
    pub fn asset_load(asset: impl Into<String>, reason: impl ToString) -> Self {
        Self::AssetLoad {
            asset: asset.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<&str> for SphereError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for SphereError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
