//! Scout - Container Image Metadata Library
//!
//! Scout parses free-form container image references into a normalized
//! identity and resolves the labels an image carries by reading its manifest
//! and config blob from the origin registry.
//!
//! # Quick Start
//!
//! ```no_run
//! use libscout::{Config, Scout};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_yaml_str(r#"
//! registries:
//!   hub:
//!     registry_host: registry-1.docker.io
//!     authorization_type: dockeroauth2
//! "#)?;
//!     let scout = Scout::from_config(config).await?;
//!
//!     let labels = scout.resolve_labels("springcloud/spring-cloud-dataflow-server:2.11.0").await?;
//!     for (key, value) in labels {
//!         println!("{} = {}", key, value);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - **Reference parsing**: Docker-compatible image strings with configurable defaults
//! - **Label resolution**: manifest and config blob lookup over the registry v2 API
//! - **Pluggable authorization**: anonymous, Basic, Docker OAuth2 tokens and Amazon ECR
//! - **Docker config secrets**: registries discovered from `.dockerconfigjson` files
//!
//! # Main Types
//!
//! - [`Scout`] - Main entry point
//! - [`ScoutBuilder`] - Builder for advanced configuration
//! - [`ImageParser`] and [`ImageReference`] - Reference parsing
//! - [`MetadataResolver`] - Label resolution
//! - [`RegistryAuthorizer`] - Authorization strategy capability
//! - [`ScoutError`] - Error taxonomy
//!
//! Parsing is synchronous and needs no configuration:
//!
//! ```
//! use libscout::ImageReference;
//!
//! let image: ImageReference = "springcloud/scdf-app:1.0".parse().unwrap();
//! assert_eq!(image.registry_host(), "registry-1.docker.io");
//! assert_eq!(image.repository(), "springcloud/scdf-app");
//! assert_eq!(image.tag(), Some("1.0"));
//! ```

#![warn(clippy::all)]

/// Returns the libscout crate version.
///
/// # Examples
///
/// ```
/// let version = libscout::version();
/// assert!(!version.is_empty());
/// ```
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// High-level public API (main entry point)
mod scout;
pub use scout::{Scout, ScoutBuilder};

// Re-export commonly used types for convenience
pub use auth::{Authorizers, Credentials, RegistryAuthorizer};
pub use config::{AuthorizationType, Config, RegistryConfiguration};
pub use error::{Result, ScoutError};
pub use reference::{ImageParser, ImageReference, ParseError, ParserDefaults, ReferenceType};
pub use registry::ContainerRegistryService;
pub use resolver::MetadataResolver;

pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod reference;
pub mod registry;
pub mod resolver;
