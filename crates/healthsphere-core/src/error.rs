//! Error types for HealthSphere

/// Result type alias using HealthSphere's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for model provisioning and inference
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Requested logical model name is not configured
    #[error("unknown model type '{0}'")]
    UnknownModelType(String),

    /// Remote artifact source is unreachable or not registered
    #[error("artifact unavailable: {0}")]
    ArtifactUnavailable(String),

    /// Artifact failed structural or size validation
    #[error("artifact invalid: {0}")]
    ArtifactInvalid(String),

    /// Input image could not be decoded or resized
    #[error("preprocessing error: {0}")]
    Preprocessing(String),

    /// Loaded model failed while executing
    #[error("inference error: {0}")]
    Inference(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification of an [`Error`], used at the request boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnknownModelType,
    ArtifactUnavailable,
    ArtifactInvalid,
    Preprocessing,
    Inference,
    Internal,
}

impl ErrorKind {
    /// Stable snake_case name, used as a metrics label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownModelType => "unknown_model_type",
            Self::ArtifactUnavailable => "artifact_unavailable",
            Self::ArtifactInvalid => "artifact_invalid",
            Self::Preprocessing => "preprocessing",
            Self::Inference => "inference",
            Self::Internal => "internal",
        }
    }
}

impl Error {
    /// Create a new unknown model type error
    pub fn unknown_model(name: impl Into<String>) -> Self {
        Self::UnknownModelType(name.into())
    }

    /// Create a new artifact unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::ArtifactUnavailable(msg.into())
    }

    /// Create a new artifact invalid error
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::ArtifactInvalid(msg.into())
    }

    /// Create a new preprocessing error
    pub fn preprocessing(msg: impl Into<String>) -> Self {
        Self::Preprocessing(msg.into())
    }

    /// Create a new inference error
    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownModelType(_) => ErrorKind::UnknownModelType,
            Self::ArtifactUnavailable(_) => ErrorKind::ArtifactUnavailable,
            Self::ArtifactInvalid(_) => ErrorKind::ArtifactInvalid,
            Self::Preprocessing(_) => ErrorKind::Preprocessing,
            Self::Inference(_) => ErrorKind::Inference,
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the caller supplied bad input (as opposed to a server-side failure)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::UnknownModelType | ErrorKind::Preprocessing
        )
    }
}
