use std::path::PathBuf;

use url::Url;

/// Minimal classification of the script language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScriptKind {
    /// Traditional classic scripts (JavaScript).
    #[default]
    Classic,
    /// `<script type="module">`.
    Module,
    /// Unknown/unsupported type; preserved for completeness.
    Unknown,
}

/// Origin tag of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptOrigin {
    Inline,
    Remote,
    LocalPath,
}

/// Where the script body comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    Inline { code: String },
    Remote { url: Url },
    LocalPath { path: PathBuf },
}

/// A script waiting to be discovered by the pipeline, as a caller or a running script
/// declared it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptInput {
    Inline(String),
    /// URL or filesystem path, classified against the document URL.
    External(String),
}

/// One acquisition/execution unit. `index` is the declaration position and defines
/// execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptDescriptor {
    pub index: usize,
    pub kind: ScriptKind,
    pub source: ScriptSource,
}

impl ScriptDescriptor {
    pub fn inline(index: usize, code: String) -> Self {
        Self {
            index,
            kind: ScriptKind::Classic,
            source: ScriptSource::Inline { code },
        }
    }

    pub fn origin(&self) -> ScriptOrigin {
        match self.source {
            ScriptSource::Inline { .. } => ScriptOrigin::Inline,
            ScriptSource::Remote { .. } => ScriptOrigin::Remote,
            ScriptSource::LocalPath { .. } => ScriptOrigin::LocalPath,
        }
    }

    /// Human-readable locator used in diagnostics and as the evaluated file name.
    pub fn locator(&self) -> String {
        match &self.source {
            ScriptSource::Inline { .. } => format!("inline-script-{}.js", self.index),
            ScriptSource::Remote { url } => url.to_string(),
            ScriptSource::LocalPath { path } => path.display().to_string(),
        }
    }
}

/// A descriptor whose body is available.
#[derive(Debug, Clone)]
pub struct LoadedScript {
    pub index: usize,
    pub name: String,
    pub source: String,
}
