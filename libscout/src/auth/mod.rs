//! Authorization for container registries.
//!
//! A [`RegistryAuthorizer`] turns a registry configuration into the HTTP
//! headers a registry expects. One implementation exists per
//! [`AuthorizationType`]; [`Authorizers`] holds the installed set and is
//! consulted by the registry service with a plain equality lookup.

use crate::client::ClientPool;
use crate::config::{AuthorizationType, RegistryConfiguration};
use crate::error::{Result, ScoutError};
use crate::reference::ImageReference;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

mod anonymous;
mod basic;
#[cfg(feature = "aws")]
mod ecr;
mod oauth2;

pub use anonymous::AnonymousAuthorizer;
pub use basic::BasicAuthorizer;
#[cfg(feature = "aws")]
pub use ecr::AwsEcrAuthorizer;
pub use oauth2::{
    DOCKER_HUB_TOKEN_URI, DockerOAuth2Authorizer, REGISTRY_AUTH_URI_KEY, REPOSITORY_PLACEHOLDER,
    token_uri_template,
};


/// Produces authorization headers for one authorization scheme.
#[async_trait]
pub trait RegistryAuthorizer: Send + Sync {
    /// The scheme this authorizer handles. Constant per instance.
    fn authorization_type(&self) -> AuthorizationType;

    /// Returns the headers to send with manifest and blob requests for
    /// `image`.
    ///
    /// `Ok(None)` means the authorizer declined, typically because the
    /// configuration lacks what it needs. `Err` means it tried and failed.
    async fn authorization_headers(
        &self,
        image: &ImageReference,
        registry: &RegistryConfiguration,
    ) -> Result<Option<HeaderMap>>;
}

/// The installed authorizers, keyed by the scheme they handle.
#[derive(Clone, Default)]
pub struct Authorizers {
    by_type: HashMap<AuthorizationType, Arc<dyn RegistryAuthorizer>>,
}

impl Authorizers {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set with every built-in authorizer.
    pub fn with_defaults(pool: Arc<ClientPool>) -> Self {
        let mut authorizers = Self::new();
        authorizers.register(Arc::new(AnonymousAuthorizer));
        authorizers.register(Arc::new(BasicAuthorizer));
        authorizers.register(Arc::new(DockerOAuth2Authorizer::new(pool)));
        #[cfg(feature = "aws")]
        authorizers.register(Arc::new(AwsEcrAuthorizer::new()));
        authorizers
    }

    /// Installs `authorizer`, replacing and returning any previous one for
    /// the same scheme.
    pub fn register(
        &mut self,
        authorizer: Arc<dyn RegistryAuthorizer>,
    ) -> Option<Arc<dyn RegistryAuthorizer>> {
        self.by_type
            .insert(authorizer.authorization_type(), authorizer)
    }

    pub fn get(&self, authorization_type: AuthorizationType) -> Option<&Arc<dyn RegistryAuthorizer>> {
        self.by_type.get(&authorization_type)
    }

    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}

impl fmt::Debug for Authorizers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.by_type.keys()).finish()
    }
}

/// Credentials for registry authentication.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// No authentication required (anonymous access)
    Anonymous,

    /// HTTP Basic authentication with username and password
    Basic { username: String, password: String },

    /// Bearer token authentication (OAuth2-style)
    Bearer { token: String },

    /// A ready-made Basic credential, already base64 encoded.
    ///
    /// Amazon ECR hands out tokens in this form.
    EncodedBasic { token: String },
}

impl Credentials {
    pub fn anonymous() -> Self {
        Self::Anonymous
    }

    /// Creates Basic authentication credentials.
    ///
    /// # Examples
    ///
    /// ```
    /// use libscout::auth::Credentials;
    ///
    /// let creds = Credentials::basic("username", "password");
    /// assert_eq!(
    ///     creds.to_header_value().as_deref(),
    ///     Some("Basic dXNlcm5hbWU6cGFzc3dvcmQ=")
    /// );
    /// ```
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer {
            token: token.into(),
        }
    }

    pub fn encoded_basic(token: impl Into<String>) -> Self {
        Self::EncodedBasic {
            token: token.into(),
        }
    }

    /// Takes Basic credentials from a registry configuration, when it has both
    /// a user and a secret.
    pub fn from_registry(registry: &RegistryConfiguration) -> Option<Self> {
        registry
            .credentials()
            .map(|(user, secret)| Self::basic(user, secret))
    }

    /// Returns the Authorization header value for these credentials.
    pub fn to_header_value(&self) -> Option<String> {
        match self {
            Self::Anonymous => None,
            Self::Basic { username, password } => {
                use base64::{Engine as _, engine::general_purpose};
                let credentials = format!("{}:{}", username, password);
                let encoded = general_purpose::STANDARD.encode(credentials);
                Some(format!("Basic {}", encoded))
            }
            Self::Bearer { token } => Some(format!("Bearer {}", token)),
            Self::EncodedBasic { token } => Some(format!("Basic {}", token)),
        }
    }

    /// Returns a header map carrying these credentials. Anonymous credentials
    /// give an empty map.
    ///
    /// # Errors
    ///
    /// Fails if the credential contains bytes not allowed in a header.
    pub fn to_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(value) = self.to_header_value() {
            let mut value = HeaderValue::from_str(&value).map_err(|_| {
                ScoutError::authorization_failed("Credential is not a valid header value")
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("Anonymous"),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"****")
                .finish(),
            Self::Bearer { .. } => f.debug_struct("Bearer").field("token", &"****").finish(),
            Self::EncodedBasic { .. } => f
                .debug_struct("EncodedBasic")
                .field("token", &"****")
                .finish(),
        }
    }
}

/// Information parsed from a WWW-Authenticate header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    /// The authentication scheme (e.g., "Bearer")
    pub scheme: String,

    /// The authentication realm
    pub realm: String,

    /// The service identifier
    pub service: Option<String>,

    /// The scope being requested
    pub scope: Option<String>,
}

impl AuthChallenge {
    /// Parses a WWW-Authenticate header value.
    ///
    /// # Examples
    ///
    /// ```
    /// use libscout::auth::AuthChallenge;
    ///
    /// let header = r#"Bearer realm="https://auth.example.com/token",service="registry""#;
    /// let challenge = AuthChallenge::parse(header).unwrap();
    /// assert_eq!(challenge.scheme, "Bearer");
    /// assert!(challenge.is_bearer());
    /// ```
    pub fn parse(header: &str) -> Result<Self> {
        let header = header.trim();

        // Split scheme from parameters
        let (scheme, params) = header.split_once(' ').ok_or_else(|| {
            ScoutError::authorization_failed("Invalid WWW-Authenticate header format")
        })?;

        let mut realm = None;
        let mut service = None;
        let mut scope = None;

        for param in split_params(params) {
            if let Some((key, value)) = param.split_once('=') {
                let key = key.trim();
                let value = value.trim().trim_matches('"');

                match key {
                    "realm" => realm = Some(value.to_string()),
                    "service" => service = Some(value.to_string()),
                    "scope" => scope = Some(value.to_string()),
                    _ => {} // Ignore unknown parameters
                }
            }
        }

        let realm = realm.ok_or_else(|| {
            ScoutError::authorization_failed(
                "WWW-Authenticate header missing required 'realm' parameter",
            )
        })?;

        Ok(Self {
            scheme: scheme.to_string(),
            realm,
            service,
            scope,
        })
    }

    pub fn is_bearer(&self) -> bool {
        self.scheme.eq_ignore_ascii_case("bearer")
    }
}

/// Splits challenge parameters on commas outside quoted values.
///
/// Scopes such as `repository:a:pull,push` carry commas of their own.
fn split_params(params: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;

    for (i, c) in params.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(params[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(params[start..].trim());
    parts
}
