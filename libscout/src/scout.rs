//! High-level API for the Scout library.
//!
//! [`Scout`] wires the parser, the HTTP client pool, the authorizers and
//! the registry configurations together from a single [`Config`]. It is the
//! recommended entry point for most users.
//!
//! # Examples
//!
//! ```no_run
//! use libscout::Scout;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let scout = Scout::builder()
//!         .with_config_file("/etc/scout/config.yaml")
//!         .build()
//!         .await?;
//!
//!     let labels = scout.resolve_labels("springcloud/spring-cloud-dataflow-server:2.11.0").await?;
//!     for (key, value) in labels {
//!         println!("{} = {}", key, value);
//!     }
//!
//!     Ok(())
//! }
//! ```

use crate::auth::{Authorizers, RegistryAuthorizer};
use crate::client::{ClientConfig, ClientPool};
use crate::config::Config;
use crate::config::docker_config::{
    merge_registry_configurations, registry_configurations_from_docker_config,
};
use crate::error::{Result, ScoutError};
use crate::reference::{ImageParser, ImageReference};
use crate::registry::ContainerRegistryService;
use crate::resolver::MetadataResolver;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Resolves image labels and lists registry content.
///
/// A `Scout` is cheap to clone and safe to share between tasks; all clones
/// use the same client pool and token caches.
///
/// # Examples
///
/// ```no_run
/// use libscout::{Config, Scout};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::from_yaml_str(r#"
/// registries:
///   hub:
///     registry_host: registry-1.docker.io
///     authorization_type: dockeroauth2
/// "#)?;
///     let scout = Scout::from_config(config).await?;
///
///     let tags = scout.list_tags("registry-1.docker.io", "library/alpine").await?;
///     println!("Found {} tags", tags.len());
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Scout {
    resolver: MetadataResolver,
}

impl Scout {
    /// Builds a `Scout` from an already loaded configuration.
    pub async fn from_config(config: Config) -> Result<Self> {
        ScoutBuilder::new().with_config(config).build().await
    }

    /// Create a builder for advanced configuration.
    pub fn builder() -> ScoutBuilder {
        ScoutBuilder::new()
    }

    /// Parses `raw` with the configured defaults.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use libscout::{Config, Scout};
    /// # async fn example() -> libscout::Result<()> {
    /// let scout = Scout::from_config(Config::default()).await?;
    /// let image = scout.parse("nginx")?;
    /// assert_eq!(image.to_string(), "registry-1.docker.io/library/nginx:latest");
    /// # Ok(())
    /// # }
    /// ```
    pub fn parse(&self, raw: &str) -> Result<ImageReference> {
        self.service()
            .parser()
            .parse(raw)
            .map_err(|e| ScoutError::invalid_reference(raw, e))
    }

    /// Returns the labels of the image named by `raw`.
    ///
    /// See [`MetadataResolver::resolve_labels`].
    pub async fn resolve_labels(&self, raw: &str) -> Result<HashMap<String, String>> {
        self.resolver.resolve_labels(raw).await
    }

    pub async fn list_tags(&self, registry_host: &str, repository: &str) -> Result<Vec<String>> {
        self.service().list_tags(registry_host, repository).await
    }

    pub async fn list_repositories(&self, registry_host: &str) -> Result<Vec<String>> {
        self.service().list_repositories(registry_host).await
    }

    pub fn resolver(&self) -> &MetadataResolver {
        &self.resolver
    }

    /// The lower-level registry service.
    pub fn service(&self) -> &ContainerRegistryService {
        self.resolver.service()
    }
}

/// Builder for [`Scout`].
///
/// Configuration comes from [`with_config`](Self::with_config), from
/// [`with_config_file`](Self::with_config_file) (plus `SCOUT__*` environment
/// overrides), or from defaults and the environment when neither is given.
#[derive(Default)]
pub struct ScoutBuilder {
    config: Option<Config>,
    config_path: Option<PathBuf>,
    authorizers: Vec<Arc<dyn RegistryAuthorizer>>,
    docker_configs: Vec<String>,
}

impl ScoutBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set configuration directly.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Load configuration from a YAML file when building.
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Installs an authorizer, replacing the built-in one of the same type.
    pub fn with_authorizer(mut self, authorizer: Arc<dyn RegistryAuthorizer>) -> Self {
        self.authorizers.push(authorizer);
        self
    }

    /// Adds the content of a `.dockerconfigjson` secret.
    pub fn with_docker_config(mut self, json: impl Into<String>) -> Self {
        self.docker_configs.push(json.into());
        self
    }

    /// Build the `Scout` instance.
    ///
    /// Docker config secrets, both those added here and those listed under
    /// `docker_config.paths`, are checked against their registries and
    /// merged under the explicitly configured registries.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the configuration file cannot be
    /// loaded, a docker config file cannot be read, or two registries share a
    /// host.
    pub async fn build(self) -> Result<Scout> {
        let config = match (self.config, self.config_path) {
            (Some(config), _) => config,
            (None, path) => Config::load(path.as_deref())?,
        };

        let pool = Arc::new(ClientPool::new(ClientConfig::from_config(&config)));
        let mut authorizers = Authorizers::with_defaults(Arc::clone(&pool));
        for authorizer in self.authorizers {
            authorizers.register(authorizer);
        }

        let configured = config.registry_configurations()?;

        let mut secrets = self.docker_configs;
        for path in &config.docker_config.paths {
            let json = std::fs::read_to_string(path).map_err(|e| {
                ScoutError::config_with_source(
                    format!("Failed to read docker config {}", path),
                    Some(path.clone()),
                    e,
                )
            })?;
            secrets.push(json);
        }

        let mut from_docker_config = HashMap::new();
        for json in &secrets {
            from_docker_config.extend(
                registry_configurations_from_docker_config(
                    json,
                    &config.docker_config,
                    &configured,
                    &pool,
                )
                .await,
            );
        }
        let registries = merge_registry_configurations(from_docker_config, configured);

        info!(
            registries = registries.len(),
            authorizers = authorizers.len(),
            "Scout configured"
        );

        let service = ContainerRegistryService::new(
            ImageParser::new(config.defaults),
            registries,
            authorizers,
            pool,
        );
        Ok(Scout {
            resolver: MetadataResolver::new(Arc::new(service)),
        })
    }
}

#[cfg(test)]
#[path = "scout_tests.rs"]
mod tests;
