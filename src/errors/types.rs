//! # Error Types
//!
//! Error taxonomy for the provider using `thiserror`. Each stage of a mount
//! call has its own error type; [`HandlerError`] wraps them with the stage
//! that failed so the message returned to the driver names it.

use std::fmt;

/// Result type for process-level operations (startup, listeners).
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while turning request attributes into a [`MountConfig`].
///
/// Always reported before any network I/O and never retried.
///
/// [`MountConfig`]: crate::config::MountConfig
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The attributes blob is not a flat JSON object of strings.
    #[error("failed to unmarshal mount request attributes: {reason}")]
    MalformedAttributes { reason: String },

    /// The `objects` attribute does not follow the supported list syntax.
    #[error("malformed `objects` attribute at line {line}: {reason}")]
    MalformedObjects { line: usize, reason: String },

    /// A file permission could not be decoded into mode bits.
    #[error("invalid file permission '{value}': {reason}")]
    InvalidPermission { value: String, reason: String },

    #[error("missing target path field")]
    MissingTargetPath,

    #[error("missing API key - must be set via FORTANIX_API_KEY environment variable")]
    MissingCredential,

    #[error("missing DSM endpoint - set `dsmEndpoint` or FORTANIX_DSM_ENDPOINT")]
    MissingEndpoint,

    #[error("no secrets configured - the provider will not read any secret material")]
    NoSecrets,

    /// Every name that appears more than once, each listed once.
    #[error(
        "each `secretName` within a SecretProviderClass must be unique, but the following keys were duplicated: {}",
        .names.join(", ")
    )]
    DuplicateSecretNames { names: Vec<String> },

    /// A secret name cannot be used as a relative file path.
    #[error("secret name '{name}' is not a safe relative path: {reason}")]
    UnsafePath { name: String, reason: String },
}

impl ConfigError {
    pub fn malformed_attributes(reason: impl Into<String>) -> Self {
        Self::MalformedAttributes { reason: reason.into() }
    }

    pub fn malformed_objects(line: usize, reason: impl Into<String>) -> Self {
        Self::MalformedObjects { line, reason: reason.into() }
    }

    pub fn invalid_permission(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPermission { value: value.into(), reason: reason.into() }
    }

    pub fn unsafe_path(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsafePath { name: name.into(), reason: reason.into() }
    }
}

/// Errors raised while constructing a secret store client.
#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("could not find an endpoint")]
    MissingEndpoint,

    #[error("could not find an api key")]
    MissingCredential,

    /// The key is present but cannot be sent in an HTTP header.
    #[error("api key is malformed: {reason}")]
    InvalidCredential { reason: String },

    #[error("invalid DSM endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
}

/// Errors raised while fetching secret material.
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    /// The store has no object with this name, or the object has no value.
    #[error("secret '{name}' not found or has no value")]
    NotFound { name: String },

    /// The store rejected the credential for this object.
    #[error("access to secret '{name}' was denied: {message}")]
    Unauthorized { name: String, message: String },

    /// Network failure, unexpected status, or undecodable response.
    #[error("failed to fetch secret '{name}': {message}")]
    Transport { name: String, message: String },

    /// The call was cancelled or timed out before `name` was fetched.
    #[error("mount cancelled while fetching secret '{name}'")]
    Cancelled { name: String },
}

impl FetchError {
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    pub fn unauthorized(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unauthorized { name: name.into(), message: message.into() }
    }

    pub fn transport(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport { name: name.into(), message: message.into() }
    }

    pub fn cancelled(name: impl Into<String>) -> Self {
        Self::Cancelled { name: name.into() }
    }

    /// Name of the secret the error refers to.
    pub fn secret_name(&self) -> &str {
        match self {
            Self::NotFound { name }
            | Self::Unauthorized { name, .. }
            | Self::Transport { name, .. }
            | Self::Cancelled { name } => name,
        }
    }
}

/// Stages of a mount call, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountStage {
    ParseConfig,
    ValidateConfig,
    ConstructClient,
    FetchSecrets,
    AssembleResponse,
}

impl MountStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParseConfig => "parse_config",
            Self::ValidateConfig => "validate_config",
            Self::ConstructClient => "construct_client",
            Self::FetchSecrets => "fetch_secrets",
            Self::AssembleResponse => "assemble_response",
        }
    }
}

impl fmt::Display for MountStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Failure of a mount call, tagged with the stage that produced it.
#[derive(thiserror::Error, Debug)]
pub enum HandlerError {
    #[error("mount failed at {stage}: {source}")]
    Config {
        stage: MountStage,
        #[source]
        source: ConfigError,
    },

    #[error("mount failed at {}: {source}", MountStage::ConstructClient)]
    Auth {
        #[source]
        source: AuthError,
    },

    #[error("mount failed at {}: {source}", MountStage::FetchSecrets)]
    Fetch {
        #[source]
        source: FetchError,
        /// Set when the cancellation came from the per-call deadline.
        deadline_exceeded: bool,
    },
}

impl HandlerError {
    pub fn parse(source: ConfigError) -> Self {
        Self::Config { stage: MountStage::ParseConfig, source }
    }

    pub fn validate(source: ConfigError) -> Self {
        Self::Config { stage: MountStage::ValidateConfig, source }
    }

    pub fn stage(&self) -> MountStage {
        match self {
            Self::Config { stage, .. } => *stage,
            Self::Auth { .. } => MountStage::ConstructClient,
            Self::Fetch { .. } => MountStage::FetchSecrets,
        }
    }

    /// Mark a cancelled fetch as caused by the per-call deadline.
    pub fn with_deadline_exceeded(self) -> Self {
        match self {
            Self::Fetch { source: source @ FetchError::Cancelled { .. }, .. } => {
                Self::Fetch { source, deadline_exceeded: true }
            }
            other => other,
        }
    }
}

impl From<AuthError> for HandlerError {
    fn from(source: AuthError) -> Self {
        Self::Auth { source }
    }
}

impl From<FetchError> for HandlerError {
    fn from(source: FetchError) -> Self {
        Self::Fetch { source, deadline_exceeded: false }
    }
}

impl From<HandlerError> for tonic::Status {
    fn from(err: HandlerError) -> Self {
        let message = err.to_string();
        match &err {
            HandlerError::Config {
                source: ConfigError::MissingCredential | ConfigError::MissingEndpoint,
                ..
            } => tonic::Status::failed_precondition(message),
            HandlerError::Config { .. } => tonic::Status::invalid_argument(message),
            HandlerError::Auth { .. } => tonic::Status::failed_precondition(message),
            HandlerError::Fetch { source, deadline_exceeded } => match source {
                FetchError::NotFound { .. } => tonic::Status::not_found(message),
                FetchError::Unauthorized { .. } => tonic::Status::permission_denied(message),
                FetchError::Transport { .. } => tonic::Status::unavailable(message),
                FetchError::Cancelled { .. } if *deadline_exceeded => {
                    tonic::Status::deadline_exceeded(message)
                }
                FetchError::Cancelled { .. } => tonic::Status::cancelled(message),
            },
        }
    }
}

/// Process-level errors raised outside of a mount call.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Invalid startup configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// gRPC or HTTP listener failures
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("I/O error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into())
    }

    pub fn io<S: Into<String>>(context: S, source: std::io::Error) -> Self {
        Self::Io { context: context.into(), source }
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Config(errors.to_string())
    }
}
