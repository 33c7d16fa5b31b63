//! Container image reference parsing.
//!
//! Turns a free-form image string such as `nginx`, `test/image:latest` or
//! `registry.example.com:5000/team/app@sha256:...` into a normalized
//! [`ImageReference`]. The grammar is
//! `[registry-host[:port]/](namespace-component/)*name[:tag|@digest]`.
//!
//! The first path segment is only treated as a registry host when it contains
//! a `.` or a `:`, or is exactly `localhost`. Everything else is resolved
//! against the [`ParserDefaults`]. A bare name on the default registry host
//! gets the default namespace, so `nginx`, `docker.io/nginx` and
//! `registry-1.docker.io/nginx` all name `registry-1.docker.io/library/nginx`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;


/// Registry host used when the image string does not name one.
pub const DOCKER_HUB_HOST: &str = "registry-1.docker.io";

/// Tag used when the image string carries neither tag nor digest.
pub const DEFAULT_TAG: &str = "latest";

/// Namespace of the official Docker Hub images.
pub const DEFAULT_OFFICIAL_NAMESPACE: &str = "library";

const LOCALHOST_DOMAIN: &str = "localhost";

// Docker Hub spellings that resolve to the default registry host.
const DOCKER_HUB_ALIASES: [&str; 2] = ["docker.io", "index.docker.io"];

static COMPONENT_PATTERN: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^[a-z0-9]+(?:[._-][a-z0-9]+)*$").expect("valid component pattern")
});

static TAG_PATTERN: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").expect("valid tag pattern")
});

static HOSTNAME_PATTERN: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"^(?:(?:[A-Za-z0-9]|[A-Za-z0-9][A-Za-z0-9-]*[A-Za-z0-9])\.)*(?:[A-Za-z0-9]|[A-Za-z0-9][A-Za-z0-9-]*[A-Za-z0-9])$",
    )
    .expect("valid hostname pattern")
});

/// Reasons an image string is rejected. All of them are permanent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("image reference is empty")]
    Empty,

    #[error("invalid registry hostname: {host}")]
    InvalidHost { host: String },

    #[error("invalid registry port: {port}")]
    InvalidPort { port: String },

    #[error("invalid namespace path component: '{component}'")]
    InvalidNamespace { component: String },

    #[error("invalid repository name: '{name}'")]
    InvalidName { name: String },

    #[error("invalid repository tag: '{tag}'")]
    InvalidTag { tag: String },

    #[error("invalid repository digest: '{digest}'")]
    InvalidDigest { digest: String },
}

/// Which of tag or digest identifies the image within its repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceType {
    Tag,
    Digest,
}

/// Values substituted for the parts an image string leaves out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParserDefaults {
    /// Registry host, optionally with `:port`.
    #[serde(default = "default_registry_host")]
    pub registry_host: String,

    #[serde(default = "default_tag")]
    pub tag: String,

    /// Namespace given to bare names such as `nginx`.
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for ParserDefaults {
    fn default() -> Self {
        Self {
            registry_host: default_registry_host(),
            tag: default_tag(),
            namespace: default_namespace(),
        }
    }
}

fn default_registry_host() -> String {
    DOCKER_HUB_HOST.to_string()
}

fn default_tag() -> String {
    DEFAULT_TAG.to_string()
}

fn default_namespace() -> String {
    DEFAULT_OFFICIAL_NAMESPACE.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RepositoryReference {
    Tag(String),
    Digest(String),
}

/// A parsed, validated container image reference.
///
/// Exactly one of tag and digest is set. Hostname and repository name are
/// never empty. The canonical name re-parses to an equal value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    hostname: String,
    port: Option<String>,
    namespace: String,
    name: String,
    reference: RepositoryReference,
}

impl ImageReference {
    /// Registry hostname or IP address, without the port.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }

    /// Zero or more `/`-joined path components; empty when absent.
    pub fn repository_namespace(&self) -> &str {
        &self.namespace
    }

    pub fn repository_name(&self) -> &str {
        &self.name
    }

    pub fn reference_type(&self) -> ReferenceType {
        match self.reference {
            RepositoryReference::Tag(_) => ReferenceType::Tag,
            RepositoryReference::Digest(_) => ReferenceType::Digest,
        }
    }

    pub fn tag(&self) -> Option<&str> {
        match &self.reference {
            RepositoryReference::Tag(tag) => Some(tag),
            RepositoryReference::Digest(_) => None,
        }
    }

    pub fn digest(&self) -> Option<&str> {
        match &self.reference {
            RepositoryReference::Digest(digest) => Some(digest),
            RepositoryReference::Tag(_) => None,
        }
    }

    /// The tag or the full `algorithm:hex` digest, as used in manifest URLs.
    pub fn repository_reference(&self) -> &str {
        match &self.reference {
            RepositoryReference::Tag(value) | RepositoryReference::Digest(value) => value,
        }
    }

    /// `hostname[:port]`, the key used to look up registry configurations.
    pub fn registry_host(&self) -> String {
        match &self.port {
            Some(port) => format!("{}:{}", self.hostname, port),
            None => self.hostname.clone(),
        }
    }

    /// `[namespace/]name`, without tag or digest.
    pub fn repository(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.namespace, self.name)
        }
    }

    /// `registry-host/repository:tag` or `registry-host/repository@digest`.
    pub fn canonical_name(&self) -> String {
        let separator = match self.reference {
            RepositoryReference::Tag(_) => ':',
            RepositoryReference::Digest(_) => '@',
        };
        format!(
            "{}/{}{}{}",
            self.registry_host(),
            self.repository(),
            separator,
            self.repository_reference()
        )
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_name())
    }
}

/// Parses with Docker Hub defaults.
impl FromStr for ImageReference {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ImageParser::default().parse(s)
    }
}

impl Serialize for ImageReference {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.canonical_name())
    }
}

impl<'de> Deserialize<'de> for ImageReference {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Stateless image string parser bound to a set of defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageParser {
    defaults: ParserDefaults,
}

impl ImageParser {
    /// Creates a parser with the given defaults.
    ///
    /// # Examples
    ///
    /// ```
    /// use libscout::reference::{ImageParser, ParserDefaults};
    ///
    /// let parser = ImageParser::new(ParserDefaults {
    ///     registry_host: "test-domain.io".to_string(),
    ///     tag: "tag654".to_string(),
    ///     namespace: "official-repo-name".to_string(),
    /// });
    /// let image = parser.parse("simple-repo-name").unwrap();
    /// assert_eq!(
    ///     image.canonical_name(),
    ///     "test-domain.io/official-repo-name/simple-repo-name:tag654"
    /// );
    /// ```
    pub fn new(defaults: ParserDefaults) -> Self {
        Self { defaults }
    }

    pub fn defaults(&self) -> &ParserDefaults {
        &self.defaults
    }

    /// Parses `raw` into an [`ImageReference`].
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] naming the first malformed part. No partial
    /// result is ever produced.
    pub fn parse(&self, raw: &str) -> Result<ImageReference, ParseError> {
        if raw.is_empty() {
            return Err(ParseError::Empty);
        }

        let (registry_host, remainder, default_namespace) = self.split_registry_host(raw);
        self.parse_parts(registry_host, remainder, default_namespace)
    }

    /// Parses `repository[:tag|@digest]` as living on `registry_host`.
    ///
    /// Unlike [`parse`](Self::parse), a single-component repository is taken
    /// as is and never receives the default namespace.
    pub fn parse_in_registry(
        &self,
        registry_host: &str,
        repository: &str,
    ) -> Result<ImageReference, ParseError> {
        self.parse_parts(registry_host, repository, false)
    }

    fn parse_parts(
        &self,
        registry_host: &str,
        remainder: &str,
        default_namespace: bool,
    ) -> Result<ImageReference, ParseError> {
        let (hostname, port) = split_host_and_port(registry_host)?;

        let mut segments: Vec<&str> = remainder.split('/').collect();
        // split always yields at least one item
        let tail = segments.pop().unwrap_or_default();

        if let Some(component) = segments.iter().find(|c| !COMPONENT_PATTERN.is_match(c)) {
            return Err(ParseError::InvalidNamespace {
                component: component.to_string(),
            });
        }
        let namespace = if segments.is_empty() && default_namespace {
            self.defaults.namespace.clone()
        } else {
            segments.join("/")
        };

        let (name, reference) = self.split_reference(tail)?;
        if !COMPONENT_PATTERN.is_match(name) {
            return Err(ParseError::InvalidName {
                name: name.to_string(),
            });
        }

        Ok(ImageReference {
            hostname,
            port,
            namespace,
            name: name.to_string(),
            reference,
        })
    }

    /// Returns `(registry_host, remainder, default_namespace)`. The default
    /// namespace applies when the host is the default one, whether it was
    /// left out, spelled out or given as a Docker Hub alias.
    fn split_registry_host<'a>(&'a self, raw: &'a str) -> (&'a str, &'a str, bool) {
        match raw.split_once('/') {
            Some((first, rest)) if is_registry_host(first) => {
                if DOCKER_HUB_ALIASES.contains(&first) {
                    (self.defaults.registry_host.as_str(), rest, true)
                } else {
                    (first, rest, first == self.defaults.registry_host)
                }
            }
            _ => (self.defaults.registry_host.as_str(), raw, true),
        }
    }

    fn split_reference<'a>(
        &self,
        tail: &'a str,
    ) -> Result<(&'a str, RepositoryReference), ParseError> {
        if let Some((name, digest)) = tail.split_once('@') {
            let well_formed = digest
                .split_once(':')
                .is_some_and(|(algorithm, hex)| !algorithm.is_empty() && !hex.is_empty())
                && !digest.contains('@');
            if !well_formed {
                return Err(ParseError::InvalidDigest {
                    digest: digest.to_string(),
                });
            }
            return Ok((name, RepositoryReference::Digest(digest.to_string())));
        }

        let (name, tag) = match tail.rsplit_once(':') {
            Some((name, tag)) => (name, tag),
            None => (tail, self.defaults.tag.as_str()),
        };
        if !TAG_PATTERN.is_match(tag) {
            return Err(ParseError::InvalidTag {
                tag: tag.to_string(),
            });
        }
        Ok((name, RepositoryReference::Tag(tag.to_string())))
    }
}

/// Host detection heuristic used by the Docker tooling itself.
fn is_registry_host(segment: &str) -> bool {
    segment.contains('.') || segment.contains(':') || segment == LOCALHOST_DOMAIN
}

fn split_host_and_port(registry_host: &str) -> Result<(String, Option<String>), ParseError> {
    let (hostname, port) = match registry_host.split_once(':') {
        Some((hostname, port)) => (hostname, Some(port)),
        None => (registry_host, None),
    };

    if let Some(port) = port {
        let numeric = !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit());
        if !numeric || port.parse::<u16>().is_err() {
            return Err(ParseError::InvalidPort {
                port: port.to_string(),
            });
        }
    }

    if !HOSTNAME_PATTERN.is_match(hostname) {
        return Err(ParseError::InvalidHost {
            host: hostname.to_string(),
        });
    }

    Ok((hostname.to_string(), port.map(str::to_string)))
}
