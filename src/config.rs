use std::fs;
use std::path::{Path, PathBuf};

use fancy_regex::Regex;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use url::Url;

use crate::input::{classify_input, is_network_scheme, ResolvedSource};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no document source: supply an input string or one of html, url, file")]
    MissingSource,
    #[error("no completion callback: supply created or done")]
    MissingCallback,
    #[error("invalid url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("unsupported document url scheme: {0}")]
    UnsupportedScheme(String),
    #[error("invalid SkipExternalResources pattern: {0}")]
    InvalidSkipPattern(String),
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Resource categories the feature flags talk about. Only `script` drives the pipeline;
/// the rest are accepted so existing configs keep parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Script,
    Link,
    Img,
    Css,
    Iframe,
    Frame,
}

const ALL_KINDS: [ResourceKind; 6] = [
    ResourceKind::Script,
    ResourceKind::Link,
    ResourceKind::Img,
    ResourceKind::Css,
    ResourceKind::Iframe,
    ResourceKind::Frame,
];

#[derive(Deserialize)]
#[serde(untagged)]
enum KindsRepr {
    Flag(bool),
    Kinds(Vec<ResourceKind>),
}

/// `false` or a list of resource kinds.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "KindsRepr")]
pub struct ResourceKinds(Vec<ResourceKind>);

impl From<KindsRepr> for ResourceKinds {
    fn from(repr: KindsRepr) -> Self {
        match repr {
            KindsRepr::Flag(false) => Self::none(),
            KindsRepr::Flag(true) => Self(ALL_KINDS.to_vec()),
            KindsRepr::Kinds(kinds) => Self(kinds),
        }
    }
}

impl ResourceKinds {
    pub fn none() -> Self {
        Self(Vec::new())
    }

    pub fn only(kinds: &[ResourceKind]) -> Self {
        Self(kinds.to_vec())
    }

    pub fn contains(&self, kind: ResourceKind) -> bool {
        self.0.contains(&kind)
    }
}

/// Per-resource-type policy flags.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Features {
    pub fetch_external_resources: ResourceKinds,
    pub process_external_resources: ResourceKinds,
    /// Regular expression; external scripts whose URL matches are dropped.
    #[serde(deserialize_with = "skip_pattern")]
    pub skip_external_resources: Option<String>,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            fetch_external_resources: ResourceKinds::only(&[ResourceKind::Script]),
            process_external_resources: ResourceKinds::only(&[ResourceKind::Script]),
            skip_external_resources: None,
        }
    }
}

fn skip_pattern<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Flag(bool),
        Pattern(String),
    }

    Ok(match Repr::deserialize(deserializer)? {
        Repr::Flag(_) => None,
        Repr::Pattern(pattern) => Some(pattern),
    })
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Repr::deserialize(deserializer)? {
        Repr::One(value) => vec![value],
        Repr::Many(values) => values,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DocumentOptions {
    pub referrer: Option<String>,
    /// `Set-Cookie` strings applied to the document before scripts run.
    #[serde(deserialize_with = "one_or_many")]
    pub cookie: Vec<String>,
}

/// Declarative part of an environment description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EnvOptions {
    /// Positional input, classified as URL, file or markup when no explicit source is set.
    pub input: Option<String>,
    pub html: Option<String>,
    pub url: Option<String>,
    pub file: Option<PathBuf>,
    /// External scripts (URLs or paths), run in order after the document's own scripts.
    #[serde(deserialize_with = "one_or_many")]
    pub scripts: Vec<String>,
    /// Inline script sources, run after `scripts`.
    #[serde(deserialize_with = "one_or_many")]
    pub src: Vec<String>,
    pub document: DocumentOptions,
    pub features: Features,
}

impl EnvOptions {
    /// Load options from a YAML or JSON file (chosen by extension, YAML otherwise).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&contents),
            _ => Self::from_yaml_str(&contents),
        }
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn from_json_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(contents)?)
    }
}

/// Compiled form of [`Features`] as far as scripts are concerned.
#[derive(Debug, Clone)]
pub struct ScriptPolicy {
    fetch: bool,
    process: bool,
    skip: Option<Regex>,
}

impl ScriptPolicy {
    pub fn from_features(features: &Features) -> Result<Self, ConfigError> {
        let skip = features
            .skip_external_resources
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|err| ConfigError::InvalidSkipPattern(err.to_string()))?;
        Ok(Self {
            fetch: features
                .fetch_external_resources
                .contains(ResourceKind::Script),
            process: features
                .process_external_resources
                .contains(ResourceKind::Script),
            skip,
        })
    }

    pub fn allows_inline(&self) -> bool {
        self.process
    }

    pub fn allows_external(&self, locator: &str) -> bool {
        if !(self.fetch && self.process) {
            return false;
        }
        match &self.skip {
            Some(pattern) => !pattern.is_match(locator).unwrap_or(false),
            None => true,
        }
    }
}

impl Default for ScriptPolicy {
    fn default() -> Self {
        Self {
            fetch: true,
            process: true,
            skip: None,
        }
    }
}

/// Canonical construction parameters.
#[derive(Debug, Clone)]
pub struct NormalizedConfig {
    pub source: ResolvedSource,
    /// Explicit document location; overrides whatever the source implies.
    pub location: Option<Url>,
    pub referrer: String,
    pub cookies: Vec<String>,
    pub scripts: Vec<String>,
    pub src: Vec<String>,
    pub policy: ScriptPolicy,
}

/// Validate `options` and derive construction parameters. `options` is left untouched.
///
/// Source precedence is `html`, then `file`, then `url`; the positional `input` is only
/// classified when none of them is set.
pub fn normalize(options: &EnvOptions) -> Result<NormalizedConfig, ConfigError> {
    let location = options.url.as_deref().map(parse_document_url).transpose()?;

    let source = if let Some(html) = &options.html {
        ResolvedSource::InlineHtml(html.clone())
    } else if let Some(file) = &options.file {
        ResolvedSource::LocalFile(file.clone())
    } else if let Some(url) = &location {
        if !is_network_scheme(url.scheme()) {
            return Err(ConfigError::UnsupportedScheme(url.scheme().to_string()));
        }
        ResolvedSource::RemoteUrl(url.clone())
    } else if let Some(input) = &options.input {
        classify_input(input)
    } else {
        return Err(ConfigError::MissingSource);
    };

    Ok(NormalizedConfig {
        source,
        location,
        referrer: options.document.referrer.clone().unwrap_or_default(),
        cookies: options.document.cookie.clone(),
        scripts: options.scripts.clone(),
        src: options.src.clone(),
        policy: ScriptPolicy::from_features(&options.features)?,
    })
}

fn parse_document_url(raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|source| ConfigError::InvalidUrl {
        url: raw.to_string(),
        source,
    })
}
