//! # Error Handling
//!
//! This module provides error handling for the Headwater control plane.
//! It defines custom error types using `thiserror` for all operations.

use std::fmt;

/// Custom result type for Headwater operations
pub type Result<T> = std::result::Result<T, HeadwaterError>;

/// Main error type for the Headwater control plane
#[derive(thiserror::Error, Debug)]
pub enum HeadwaterError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Discovery request authentication errors
    #[error("Authentication error: {message}")]
    Auth { message: String, error_type: AuthErrorType },

    /// Resource not found errors
    #[error("Resource not found: {resource_type} '{id}'")]
    NotFound { resource_type: String, id: String },

    /// Template rendering errors
    #[error("Template render error: {message}")]
    TemplateRender {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Rendered template output that does not parse as a configuration document
    #[error("Configuration deserialize error: {context}")]
    ConfigDeserialize {
        context: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// Per-source refresh failures
    #[error("Source '{name}' error: {message}")]
    Source { name: String, message: String },

    /// Context provider evaluation failures
    #[error("Context provider '{name}' error: {message}")]
    Provider { name: String, message: String },

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        #[source]
        source: serde_json::Error,
        context: String,
    },

    /// Network transport errors
    #[error("Transport error: {0}")]
    Transport(String),

    /// Internal server errors
    #[error("Internal server error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Authentication error subtypes
#[derive(Debug, Clone, PartialEq)]
pub enum AuthErrorType {
    MissingToken,
    InvalidToken,
    InvalidClaims,
}

impl fmt::Display for AuthErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthErrorType::MissingToken => write!(f, "missing_token"),
            AuthErrorType::InvalidToken => write!(f, "invalid_token"),
            AuthErrorType::InvalidClaims => write!(f, "invalid_claims"),
        }
    }
}

/// Alias kept for signatures that want the short form
pub type Error = HeadwaterError;

impl HeadwaterError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create an authentication error
    pub fn auth<S: Into<String>>(message: S, error_type: AuthErrorType) -> Self {
        Self::Auth { message: message.into(), error_type }
    }

    /// Create a not found error
    pub fn not_found<R: Into<String>, I: Into<String>>(resource_type: R, id: I) -> Self {
        Self::NotFound { resource_type: resource_type.into(), id: id.into() }
    }

    /// Create a template render error
    pub fn template_render<S: Into<String>>(message: S) -> Self {
        Self::TemplateRender { message: message.into(), source: None }
    }

    /// Create a template render error with source
    pub fn template_render_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::TemplateRender { message: message.into(), source: Some(source) }
    }

    /// Create a source refresh error
    pub fn source<N: Into<String>, M: Into<String>>(name: N, message: M) -> Self {
        Self::Source { name: name.into(), message: message.into() }
    }

    /// Create a context provider error
    pub fn provider<N: Into<String>, M: Into<String>>(name: N, message: M) -> Self {
        Self::Provider { name: name.into(), message: message.into() }
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into())
    }

    /// Create an internal server error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Create a serialization error with custom context
    pub fn serialization<S: Into<String>>(source: serde_json::Error, context: S) -> Self {
        Self::Serialization { source, context: context.into() }
    }

    /// Get the HTTP status code that should be returned for this error
    pub fn status_code(&self) -> u16 {
        match self {
            HeadwaterError::Auth { .. } => 401,
            HeadwaterError::NotFound { .. } => 404,
            HeadwaterError::Config { .. } => 500,
            HeadwaterError::TemplateRender { .. } => 500,
            HeadwaterError::ConfigDeserialize { .. } => 500,
            HeadwaterError::Source { .. } => 500,
            HeadwaterError::Provider { .. } => 500,
            HeadwaterError::Io { .. } => 500,
            HeadwaterError::Serialization { .. } => 500,
            HeadwaterError::Transport(_) => 500,
            HeadwaterError::Internal { .. } => 500,
        }
    }

    /// Short error class name used in error response bodies and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            HeadwaterError::Auth { .. } => "AuthFailure",
            HeadwaterError::NotFound { .. } => "NotFound",
            HeadwaterError::Config { .. } => "ConfigError",
            HeadwaterError::TemplateRender { .. } => "TemplateRenderError",
            HeadwaterError::ConfigDeserialize { .. } => "ConfigDeserializeError",
            HeadwaterError::Source { .. } => "SourceRefreshError",
            HeadwaterError::Provider { .. } => "ProviderError",
            HeadwaterError::Io { .. } => "IoError",
            HeadwaterError::Serialization { .. } => "SerializationError",
            HeadwaterError::Transport(_) => "TransportError",
            HeadwaterError::Internal { .. } => "InternalError",
        }
    }

    /// Client-safe description. Details that could leak template or token
    /// internals are replaced with a generic message; the full error is
    /// logged server-side before this is called.
    pub fn public_description(&self) -> Option<String> {
        match self {
            HeadwaterError::Auth { .. } => Some("Discovery request authentication failed".into()),
            HeadwaterError::ConfigDeserialize { .. } => Some(
                "Failed to load configuration, there may be a syntax error \
                 in the configured templates"
                    .into(),
            ),
            HeadwaterError::TemplateRender { .. } => {
                Some("Failed to render the configured template".into())
            }
            HeadwaterError::NotFound { resource_type, id } => {
                Some(format!("{} '{}' not found", resource_type, id))
            }
            _ => None,
        }
    }
}

// Error conversions for common external error types
impl From<std::io::Error> for HeadwaterError {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<serde_json::Error> for HeadwaterError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization { source: error, context: "JSON serialization failed".to_string() }
    }
}

impl From<reqwest::Error> for HeadwaterError {
    fn from(error: reqwest::Error) -> Self {
        Self::Transport(error.to_string())
    }
}

impl From<validator::ValidationErrors> for HeadwaterError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::config(format!("Validation failed: {}", message))
    }
}
