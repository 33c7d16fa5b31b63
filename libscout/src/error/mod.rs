//! Error types for Scout
//!
//! Every failure in the resolution pipeline surfaces as a single [`ScoutError`].
//! The variant tells the caller what went wrong; the message and the optional
//! source tell it why. Only [`ScoutError::Transport`] is worth retrying.

use crate::reference::ParseError;
use thiserror::Error;


/// Boxed cause carried by transport, manifest and configuration errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for Scout operations
#[derive(Error, Debug)]
pub enum ScoutError {
    /// The image reference string could not be parsed
    #[error("Invalid image reference '{reference}': {source}")]
    InvalidReference {
        reference: String,
        #[source]
        source: ParseError,
    },

    /// No registry configuration exists for the image's registry host
    #[error("Could not find a registry configuration for: {registry_host}")]
    UnknownRegistry { registry_host: String },

    /// No authorizer was registered for the configured authorization type
    #[error("Could not find a registry authorizer of type: {authorization_type}")]
    NoAuthorizer { authorization_type: String },

    /// The authorizer declined to produce authorization headers
    #[error("Authorization failed: {message}")]
    AuthorizationFailed { message: String },

    /// The registry returned a manifest or config blob of unexpected shape
    #[error("Malformed manifest: {message}")]
    MalformedManifest {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Network, timeout or HTTP-level failures
    #[error("Transport error (status: {status_code:?}): {message}")]
    Transport {
        message: String,
        status_code: Option<u16>,
        #[source]
        source: Option<BoxError>,
    },

    /// Configuration errors (invalid config file, missing settings)
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<String>,
        #[source]
        source: Option<BoxError>,
    },
}

/// Result type alias for Scout operations
pub type Result<T> = std::result::Result<T, ScoutError>;

impl ScoutError {
    /// Creates a new invalid reference error.
    ///
    /// # Examples
    ///
    /// ```
    /// use libscout::error::ScoutError;
    /// use libscout::reference::ParseError;
    ///
    /// let err = ScoutError::invalid_reference("", ParseError::Empty);
    /// assert!(matches!(err, ScoutError::InvalidReference { .. }));
    /// ```
    pub fn invalid_reference<S: Into<String>>(reference: S, source: ParseError) -> Self {
        Self::InvalidReference {
            reference: reference.into(),
            source,
        }
    }

    /// Creates a new unknown registry error.
    pub fn unknown_registry<S: Into<String>>(registry_host: S) -> Self {
        Self::UnknownRegistry {
            registry_host: registry_host.into(),
        }
    }

    /// Creates a new missing authorizer error.
    pub fn no_authorizer<S: Into<String>>(authorization_type: S) -> Self {
        Self::NoAuthorizer {
            authorization_type: authorization_type.into(),
        }
    }

    /// Creates a new authorization failure.
    ///
    /// # Examples
    ///
    /// ```
    /// use libscout::error::ScoutError;
    ///
    /// let err = ScoutError::authorization_failed("no credentials configured");
    /// assert!(!err.is_retryable());
    /// ```
    pub fn authorization_failed<S: Into<String>>(message: S) -> Self {
        Self::AuthorizationFailed {
            message: message.into(),
        }
    }

    /// Creates a new malformed manifest error.
    pub fn malformed_manifest<S: Into<String>>(message: S) -> Self {
        Self::MalformedManifest {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new malformed manifest error with a source error.
    pub fn malformed_manifest_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::MalformedManifest {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new transport error.
    ///
    /// # Examples
    ///
    /// ```
    /// use libscout::error::ScoutError;
    ///
    /// let err = ScoutError::transport("connection refused", None);
    /// assert!(err.is_retryable());
    /// ```
    pub fn transport<S: Into<String>>(message: S, status_code: Option<u16>) -> Self {
        Self::Transport {
            message: message.into(),
            status_code,
            source: None,
        }
    }

    /// Creates a new transport error with a source error.
    ///
    /// # Examples
    ///
    /// ```
    /// use libscout::error::ScoutError;
    /// use std::io;
    ///
    /// let io_err = io::Error::new(io::ErrorKind::TimedOut, "timed out");
    /// let err = ScoutError::transport_with_source("request timed out", io_err);
    /// assert!(matches!(err, ScoutError::Transport { status_code: None, .. }));
    /// ```
    pub fn transport_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport {
            message: message.into(),
            status_code: None,
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new configuration error.
    ///
    /// # Examples
    ///
    /// ```
    /// use libscout::error::ScoutError;
    ///
    /// let err = ScoutError::config("invalid config file", Some("/etc/scout/config.yaml"));
    /// assert!(matches!(err, ScoutError::Config { .. }));
    /// ```
    pub fn config<S: Into<String>>(message: S, path: Option<S>) -> Self {
        Self::Config {
            message: message.into(),
            path: path.map(|p| p.into()),
            source: None,
        }
    }

    /// Creates a new configuration error with a source error.
    pub fn config_with_source<S, E>(message: S, path: Option<S>, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Config {
            message: message.into(),
            path: path.map(|p| p.into()),
            source: Some(Box::new(source)),
        }
    }

    /// Returns true when a caller may reasonably retry the failed call.
    ///
    /// Only transport failures qualify. Everything else is a permanent
    /// rejection until the input or the configuration changes.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Returns the HTTP status code attached to a transport error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Transport { status_code, .. } => *status_code,
            _ => None,
        }
    }
}

impl From<config::ConfigError> for ScoutError {
    fn from(err: config::ConfigError) -> Self {
        ScoutError::config_with_source("Failed to build configuration", None, err)
    }
}
