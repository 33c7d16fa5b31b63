//! Application configuration.
//!
//! This module manages configuration with sensible defaults, loading from a
//! YAML file and merging with `SCOUT__`-prefixed environment variables.
//! Registry configurations are declared under arbitrary names and looked up
//! at resolution time by their `registry_host`.

use crate::error::{Result, ScoutError};
use crate::reference::ParserDefaults;
use config::{Config as ConfigRs, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

pub mod docker_config;


/// Docker image manifest v2, schema 2.
pub const DOCKER_IMAGE_MANIFEST_MEDIA_TYPE: &str =
    "application/vnd.docker.distribution.manifest.v2+json";

/// OCI image manifest v1.
pub const OCI_IMAGE_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

/// Manifest media types the registry service knows how to read.
pub const SUPPORTED_MANIFEST_MEDIA_TYPES: [&str; 2] = [
    DOCKER_IMAGE_MANIFEST_MEDIA_TYPE,
    OCI_IMAGE_MANIFEST_MEDIA_TYPE,
];

const ENV_PREFIX: &str = "SCOUT";

/// Root configuration structure.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Config {
    /// Values substituted for the parts an image string leaves out.
    #[serde(default)]
    pub defaults: ParserDefaults,

    #[serde(default)]
    pub network: Network,

    #[serde(default)]
    pub http_proxy: Option<HttpProxy>,

    /// Registry configurations keyed by a free-form name.
    #[serde(default)]
    pub registries: HashMap<String, RegistryConfiguration>,

    #[serde(default)]
    pub docker_config: DockerConfigSecrets,
}

impl Config {
    /// Parses a `Config` from a YAML string.
    ///
    /// Environment variables are not consulted, which keeps this
    /// deterministic for tests and embedded configuration.
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let builder = ConfigRs::builder()
            // Add default values
            .add_source(ConfigRs::try_from(&Config::default())?)
            // Merge with YAML string
            .add_source(File::from_str(s, FileFormat::Yaml));

        Self::from_builder(builder, None)
    }

    /// Loads a `Config` from an optional file path, then applies overrides
    /// from `SCOUT__*` environment variables.
    ///
    /// A missing `path` yields defaults plus environment overrides. A path
    /// that does not exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ConfigRs::builder()
            // Add default values
            .add_source(ConfigRs::try_from(&Config::default())?);

        if let Some(p) = path {
            builder = builder.add_source(File::from(p).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        Self::from_builder(builder, path.map(|p| p.display().to_string()))
    }

    /// Creates a `Config` from a `config::ConfigBuilder`.
    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
        path: Option<String>,
    ) -> Result<Self> {
        builder
            .build()
            .and_then(|cfg| cfg.try_deserialize())
            .map_err(|e| {
                ScoutError::config_with_source(
                    "Failed to deserialize configuration".to_string(),
                    path,
                    e,
                )
            })
    }

    /// Returns the registry configurations keyed by registry host.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if two entries declare the same host.
    pub fn registry_configurations(&self) -> Result<HashMap<String, RegistryConfiguration>> {
        let mut by_host = HashMap::with_capacity(self.registries.len());
        for (name, registry) in &self.registries {
            if by_host
                .insert(registry.registry_host.clone(), registry.clone())
                .is_some()
            {
                return Err(ScoutError::config(
                    format!(
                        "Registry '{}' duplicates the registry host {}",
                        name, registry.registry_host
                    ),
                    None,
                ));
            }
        }
        Ok(by_host)
    }
}

/// Network settings.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Network {
    /// Whole-request timeout in seconds.
    #[serde(default = "default_network_timeout")]
    pub timeout: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    #[serde(default = "default_max_idle_per_host")]
    pub max_idle_per_host: usize,
}

impl Default for Network {
    fn default() -> Self {
        Self {
            timeout: default_network_timeout(),
            connect_timeout: default_connect_timeout(),
            max_idle_per_host: default_max_idle_per_host(),
        }
    }
}

fn default_network_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_max_idle_per_host() -> usize {
    10
}

/// HTTP proxy used by registries that set `use_http_proxy`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct HttpProxy {
    pub host: String,
    pub port: u16,
}

impl HttpProxy {
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Mounted `.dockerconfigjson` secrets to turn into registry configurations.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct DockerConfigSecrets {
    #[serde(default)]
    pub paths: Vec<String>,

    /// Map `docker.io` and `https://index.docker.io/v1/` to `registry-1.docker.io`.
    #[serde(default = "default_replace_default_registry_server")]
    pub replace_default_registry_server: bool,
}

impl Default for DockerConfigSecrets {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            replace_default_registry_server: default_replace_default_registry_server(),
        }
    }
}

fn default_replace_default_registry_server() -> bool {
    true
}

/// Registry authorization schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizationType {
    /// No credentials, empty authorization headers.
    Anonymous,

    /// HTTP Basic authentication with the configured user and secret.
    /// Works with Artifactory/JFrog and Azure Container Registry.
    BasicAuth,

    /// Bearer token obtained from the registry's token service.
    /// Works with Docker Hub and Harbor.
    DockerOAuth2,

    /// Amazon ECR. `user`/`secret` are the AWS access and secret keys and
    /// `extra.region` names the region.
    AwsEcr,
}

impl AuthorizationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::BasicAuth => "basicauth",
            Self::DockerOAuth2 => "dockeroauth2",
            Self::AwsEcr => "awsecr",
        }
    }
}

impl fmt::Display for AuthorizationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for a single container registry.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistryConfiguration {
    /// `host[:port]`; must be unique across configurations.
    pub registry_host: String,

    pub authorization_type: AuthorizationType,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub secret: Option<String>,

    #[serde(default = "default_manifest_media_type")]
    pub manifest_media_type: String,

    /// Accept self-signed certificates.
    #[serde(default)]
    pub disable_ssl_verification: bool,

    #[serde(default)]
    pub use_http_proxy: bool,

    /// Talk plain HTTP instead of HTTPS.
    #[serde(default)]
    pub insecure: bool,

    /// Authorizer specific settings, e.g. `region` for Amazon ECR.
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

fn default_manifest_media_type() -> String {
    DOCKER_IMAGE_MANIFEST_MEDIA_TYPE.to_string()
}

impl RegistryConfiguration {
    /// Creates a configuration with default settings for `registry_host`.
    ///
    /// # Examples
    ///
    /// ```
    /// use libscout::config::{AuthorizationType, RegistryConfiguration};
    ///
    /// let conf = RegistryConfiguration::new("harbor.example.com", AuthorizationType::BasicAuth)
    ///     .with_credentials("admin", "Harbor12345");
    /// assert_eq!(conf.user.as_deref(), Some("admin"));
    /// ```
    pub fn new(registry_host: impl Into<String>, authorization_type: AuthorizationType) -> Self {
        Self {
            registry_host: registry_host.into(),
            authorization_type,
            user: None,
            secret: None,
            manifest_media_type: default_manifest_media_type(),
            disable_ssl_verification: false,
            use_http_proxy: false,
            insecure: false,
            extra: HashMap::new(),
        }
    }

    pub fn with_credentials(mut self, user: impl Into<String>, secret: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.secret = Some(secret.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn with_manifest_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.manifest_media_type = media_type.into();
        self
    }

    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// URL scheme for requests against this registry.
    pub fn scheme(&self) -> &'static str {
        if self.insecure { "http" } else { "https" }
    }

    /// Returns the user and secret when both are present and non-empty.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.user.as_deref(), self.secret.as_deref()) {
            (Some(user), Some(secret)) if !user.is_empty() && !secret.is_empty() => {
                Some((user, secret))
            }
            _ => None,
        }
    }
}

impl fmt::Debug for RegistryConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryConfiguration")
            .field("registry_host", &self.registry_host)
            .field("authorization_type", &self.authorization_type)
            .field("user", &self.user)
            .field("secret", &self.secret.as_ref().map(|_| "****"))
            .field("manifest_media_type", &self.manifest_media_type)
            .field("disable_ssl_verification", &self.disable_ssl_verification)
            .field("use_http_proxy", &self.use_http_proxy)
            .field("insecure", &self.insecure)
            .field("extra", &self.extra)
            .finish()
    }
}
