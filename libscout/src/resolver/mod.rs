//! Image label resolution.
//!
//! [`MetadataResolver`] turns an image string into the label map stored in
//! the image's config blob. Each call parses the reference, authorizes
//! against the image's registry, fetches the manifest and then the config
//! blob it points at. Nothing is cached between calls.

use crate::error::{Result, ScoutError};
use crate::registry::ContainerRegistryService;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[cfg(test)]
mod tests;

/// Resolves image labels through a [`ContainerRegistryService`].
#[derive(Clone)]
pub struct MetadataResolver {
    service: Arc<ContainerRegistryService>,
}

impl MetadataResolver {
    pub fn new(service: Arc<ContainerRegistryService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &ContainerRegistryService {
        &self.service
    }

    /// Returns the labels of the image named by `raw`.
    ///
    /// An image whose config blob has no `config` object or no `Labels`
    /// entry resolves to an empty map.
    ///
    /// # Errors
    ///
    /// - `InvalidReference`, `UnknownRegistry`, `NoAuthorizer` and
    ///   `AuthorizationFailed` as described on
    ///   [`ContainerRegistryService::registry_request`]
    /// - `MalformedManifest` when the manifest has no `config.digest` or the
    ///   labels are not a map of strings
    /// - `Transport` for any failed HTTP call
    pub async fn resolve_labels(&self, raw: &str) -> Result<HashMap<String, String>> {
        let request = self.service.registry_request(raw).await?;
        let manifest = self.service.image_manifest(&request).await?;

        let digest = manifest
            .pointer("/config/digest")
            .and_then(Value::as_str)
            .filter(|digest| !digest.is_empty())
            .ok_or_else(|| {
                ScoutError::malformed_manifest(format!(
                    "Manifest for {} has no config digest",
                    request.image()
                ))
            })?;

        debug!(image = %request.image(), digest, "Fetching image config blob");
        let blob = self.service.image_blob(&request, digest).await?;

        extract_labels(&blob)
    }
}

/// Reads `config.Labels` from an image config blob.
fn extract_labels(blob: &Value) -> Result<HashMap<String, String>> {
    let labels = match blob.pointer("/config/Labels") {
        None | Some(Value::Null) => return Ok(HashMap::new()),
        Some(Value::Object(labels)) => labels,
        Some(_) => {
            return Err(ScoutError::malformed_manifest(
                "Image config Labels is not an object",
            ));
        }
    };

    labels
        .iter()
        .map(|(key, value)| match value {
            Value::String(value) => Ok((key.clone(), value.clone())),
            _ => Err(ScoutError::malformed_manifest(format!(
                "Image label '{}' is not a string",
                key
            ))),
        })
        .collect()
}
