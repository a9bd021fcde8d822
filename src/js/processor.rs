use std::path::PathBuf;

use kuchiki::NodeRef;
use tracing::debug;
use url::Url;

use super::script::{ScriptDescriptor, ScriptInput, ScriptKind, ScriptSource};
use crate::config::ScriptPolicy;
use crate::input::{existing_path, is_network_scheme, parse_network_url};
use crate::net::resolve_url;

/// A `<script>` element found in parsed markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementScript {
    pub kind: ScriptKind,
    pub input: ScriptInput,
}

/// Collect `<script>` elements in document order. Empty inline scripts are skipped.
pub fn collect_scripts(document: &NodeRef) -> Vec<ElementScript> {
    let mut collected = Vec::new();
    let Ok(selector) = document.select("script") else {
        return collected;
    };

    for script in selector {
        let attributes = script.attributes.borrow();
        let kind = classify_kind(attributes.get("type"));

        if let Some(src) = attributes
            .get("src")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
        {
            collected.push(ElementScript {
                kind,
                input: ScriptInput::External(src.to_string()),
            });
            continue;
        }

        drop(attributes);
        let code = script.text_contents();
        if code.trim().is_empty() {
            continue;
        }
        collected.push(ElementScript {
            kind,
            input: ScriptInput::Inline(code),
        });
    }

    collected
}

fn classify_kind(script_type: Option<&str>) -> ScriptKind {
    match script_type {
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "" | "text/javascript" | "application/javascript" | "text/ecmascript"
            | "application/ecmascript" => ScriptKind::Classic,
            "module" => ScriptKind::Module,
            _ => ScriptKind::Unknown,
        },
        None => ScriptKind::Classic,
    }
}

/// Classify a caller-supplied external script: absolute `http(s)` URL, then an existing
/// path, then a reference relative to the document URL. Anything left over is taken as a
/// local path that will fail to load.
pub fn classify_external(locator: &str, base: &Url) -> ScriptSource {
    if let Some(url) = parse_network_url(locator) {
        return ScriptSource::Remote { url };
    }
    if let Some(path) = existing_path(locator) {
        return ScriptSource::LocalPath { path };
    }
    resolve_reference(locator, base)
}

/// Resolve a `src` attribute against the document URL.
pub fn resolve_reference(locator: &str, base: &Url) -> ScriptSource {
    match resolve_url(locator, base) {
        Some(url) if is_network_scheme(url.scheme()) => ScriptSource::Remote { url },
        Some(url) if url.scheme() == "file" => match url.to_file_path() {
            Ok(path) => ScriptSource::LocalPath { path },
            Err(()) => ScriptSource::LocalPath {
                path: PathBuf::from(locator),
            },
        },
        _ => ScriptSource::LocalPath {
            path: PathBuf::from(locator),
        },
    }
}

/// Turns discovered scripts into indexed descriptors, applying the feature policy.
///
/// Indices keep increasing across calls so late discoveries order after earlier ones.
pub struct DescriptorBuilder<'a> {
    base: &'a Url,
    policy: &'a ScriptPolicy,
    next_index: usize,
}

impl<'a> DescriptorBuilder<'a> {
    pub fn new(base: &'a Url, policy: &'a ScriptPolicy) -> Self {
        Self {
            base,
            policy,
            next_index: 0,
        }
    }

    /// Descriptor for a `<script>` element, or `None` when it is not run.
    pub fn element(&mut self, script: ElementScript) -> Option<ScriptDescriptor> {
        if script.kind != ScriptKind::Classic {
            debug!(target: "script_pipeline", kind = ?script.kind, "skipping non-classic script");
            return None;
        }
        let source = match script.input {
            ScriptInput::Inline(code) => ScriptSource::Inline { code },
            ScriptInput::External(src) => resolve_reference(&src, self.base),
        };
        self.admit(source)
    }

    /// Descriptor for a script supplied by the caller or inserted at runtime.
    pub fn input(&mut self, input: ScriptInput) -> Option<ScriptDescriptor> {
        let source = match input {
            ScriptInput::Inline(code) => ScriptSource::Inline { code },
            ScriptInput::External(locator) => classify_external(&locator, self.base),
        };
        self.admit(source)
    }

    fn admit(&mut self, source: ScriptSource) -> Option<ScriptDescriptor> {
        let allowed = match &source {
            ScriptSource::Inline { .. } => self.policy.allows_inline(),
            ScriptSource::Remote { url } => self.policy.allows_external(url.as_str()),
            ScriptSource::LocalPath { path } => {
                self.policy.allows_external(&path.display().to_string())
            }
        };
        if !allowed {
            debug!(target: "script_pipeline", source = ?source, "script disabled by features");
            return None;
        }

        let descriptor = ScriptDescriptor {
            index: self.next_index,
            kind: ScriptKind::Classic,
            source,
        };
        self.next_index += 1;
        Some(descriptor)
    }
}

/// Initial descriptor list: document scripts, then `scripts`, then `src`.
pub fn build_descriptors(
    builder: &mut DescriptorBuilder<'_>,
    element_scripts: Vec<ElementScript>,
    scripts: &[String],
    src: &[String],
) -> Vec<ScriptDescriptor> {
    let elements = element_scripts
        .into_iter()
        .filter_map(|script| builder.element(script))
        .collect::<Vec<_>>();
    let external = scripts
        .iter()
        .filter_map(|locator| builder.input(ScriptInput::External(locator.clone())))
        .collect::<Vec<_>>();
    let inline = src
        .iter()
        .filter_map(|code| builder.input(ScriptInput::Inline(code.clone())))
        .collect::<Vec<_>>();

    elements.into_iter().chain(external).chain(inline).collect()
}
