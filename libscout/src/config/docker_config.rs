//! Registry configurations from `.dockerconfigjson` secrets.
//!
//! A docker config secret looks like
//! `{"auths":{"demo.goharbor.io":{"username":"admin","password":"Harbor12345","auth":"YWRtaW46SGFyYm9yMTIzNDU="}}}`.
//! Each entry becomes a [`RegistryConfiguration`] whose authorization type is
//! chosen by probing the registry's `/v2/` endpoint.

use super::{AuthorizationType, DockerConfigSecrets, RegistryConfiguration};
use crate::auth::{REGISTRY_AUTH_URI_KEY, token_uri_template};
use crate::client::{ApiVersionCheck, ClientPool};
use crate::reference::DOCKER_HUB_HOST;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Server name `docker login` records for Docker Hub.
pub const DOCKER_HUB_INDEX_URL: &str = "https://index.docker.io/v1/";

/// Short Docker Hub server name.
pub const DOCKER_IO: &str = "docker.io";

#[derive(Debug, Deserialize)]
struct DockerConfigJson {
    #[serde(default)]
    auths: HashMap<String, DockerAuthEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct DockerAuthEntry {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    /// base64("username:password")
    #[serde(default)]
    auth: Option<String>,
}

impl DockerAuthEntry {
    /// Explicit username and password win over the encoded `auth` field.
    fn credentials(&self) -> Option<(String, String)> {
        if let (Some(user), Some(secret)) = (&self.username, &self.password) {
            return Some((user.clone(), secret.clone()));
        }

        let decoded = STANDARD.decode(self.auth.as_deref()?.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (user, secret) = decoded.split_once(':')?;
        Some((user.to_string(), secret.to_string()))
    }
}

/// Converts a `.dockerconfigjson` document into registry configurations
/// keyed by registry host.
///
/// `known` holds the registries that are already configured; a secret for
/// one of those hosts inherits its transport settings (`insecure`,
/// `use_http_proxy`, `disable_ssl_verification`) for the version check and the
/// resulting configuration.
///
/// Malformed JSON yields an empty map. A registry that does not answer with
/// a Bearer challenge, or cannot be reached at all, gets Basic authorization
/// when the entry has credentials and anonymous access otherwise.
pub async fn registry_configurations_from_docker_config(
    json: &str,
    options: &DockerConfigSecrets,
    known: &HashMap<String, RegistryConfiguration>,
    pool: &ClientPool,
) -> HashMap<String, RegistryConfiguration> {
    if json.trim().is_empty() {
        return HashMap::new();
    }

    let docker_config: DockerConfigJson = match serde_json::from_str(json) {
        Ok(docker_config) => docker_config,
        Err(e) => {
            warn!(error = %e, "Failed to parse the docker config secret");
            return HashMap::new();
        }
    };

    let mut registries = HashMap::new();
    for (server, entry) in docker_config.auths {
        let registry_host = registry_host_for(&server, options.replace_default_registry_server);
        let registry = registry_from_entry(&registry_host, &entry, known, pool).await;

        info!(
            registry_host = %registry.registry_host,
            authorization_type = %registry.authorization_type,
            "Registry configuration from docker config"
        );
        registries.insert(registry_host, registry);
    }
    registries
}

async fn registry_from_entry(
    registry_host: &str,
    entry: &DockerAuthEntry,
    known: &HashMap<String, RegistryConfiguration>,
    pool: &ClientPool,
) -> RegistryConfiguration {
    let mut registry = RegistryConfiguration::new(registry_host, AuthorizationType::Anonymous);
    if let Some(existing) = known.get(registry_host) {
        registry.insecure = existing.insecure;
        registry.use_http_proxy = existing.use_http_proxy;
        registry.disable_ssl_verification = existing.disable_ssl_verification;
    }
    if let Some((user, secret)) = entry.credentials() {
        registry = registry.with_credentials(user, secret);
    }

    if let Some(token_uri) = discover_token_uri(&registry, pool).await {
        registry.authorization_type = AuthorizationType::DockerOAuth2;
        registry
            .extra
            .insert(REGISTRY_AUTH_URI_KEY.to_string(), token_uri);
    } else if registry.user.is_some() || registry.secret.is_some() {
        registry.authorization_type = AuthorizationType::BasicAuth;
    }
    registry
}

/// Merges docker config registries with explicitly configured ones.
///
/// Explicit configuration wins field by field: its credentials when both
/// are set, its authorization type, media type and transport flags. `extra`
/// entries are combined with the explicit ones taking precedence.
pub fn merge_registry_configurations(
    from_docker_config: HashMap<String, RegistryConfiguration>,
    configured: HashMap<String, RegistryConfiguration>,
) -> HashMap<String, RegistryConfiguration> {
    let mut merged = from_docker_config;
    for (registry_host, explicit) in configured {
        let registry = match merged.remove(&registry_host) {
            Some(secret) => merge_registry(secret, explicit),
            None => explicit,
        };
        merged.insert(registry_host, registry);
    }
    merged
}

fn merge_registry(
    secret: RegistryConfiguration,
    explicit: RegistryConfiguration,
) -> RegistryConfiguration {
    let (user, password) = match explicit.credentials() {
        Some(_) => (explicit.user.clone(), explicit.secret.clone()),
        None => (secret.user, secret.secret),
    };
    let mut extra = secret.extra;
    extra.extend(explicit.extra.clone());

    RegistryConfiguration {
        user,
        secret: password,
        extra,
        ..explicit
    }
}

/// Maps the Docker Hub server names `docker login` records to the registry
/// API host.
fn registry_host_for(server: &str, replace_default_registry_server: bool) -> String {
    if replace_default_registry_server && (server == DOCKER_IO || server == DOCKER_HUB_INDEX_URL) {
        DOCKER_HUB_HOST.to_string()
    } else {
        server.to_string()
    }
}

/// Returns the token endpoint template when the registry answers `/v2/`
/// with a Bearer challenge.
async fn discover_token_uri(registry: &RegistryConfiguration, pool: &ClientPool) -> Option<String> {
    let client = match pool.client(registry) {
        Ok(client) => client,
        Err(e) => {
            warn!(registry_host = %registry.registry_host, error = %e, "Cannot check registry");
            return None;
        }
    };

    match client.check_version().await {
        Ok(ApiVersionCheck::Challenge(challenge)) if challenge.is_bearer() => {
            let template = token_uri_template(&challenge);
            debug!(registry_host = %registry.registry_host, template = %template, "Registry issues bearer tokens");
            Some(template)
        }
        Ok(_) => None,
        Err(e) => {
            warn!(registry_host = %registry.registry_host, error = %e, "Registry version check failed");
            None
        }
    }
}

#[cfg(test)]
#[path = "docker_config_tests.rs"]
mod tests;
