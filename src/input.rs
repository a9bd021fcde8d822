use std::path::{Path, PathBuf};

use url::Url;

/// Where the primary document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedSource {
    InlineHtml(String),
    RemoteUrl(Url),
    LocalFile(PathBuf),
}

/// Schemes that are fetched over the network rather than read from disk.
pub fn is_network_scheme(scheme: &str) -> bool {
    matches!(scheme, "http" | "https")
}

/// Classify a positional input string. First match wins:
/// an absolute `http(s)` URL, then an existing filesystem entry, then inline markup.
///
/// Never fails: anything unrecognised (including the empty string) is markup.
pub fn classify_input(raw: &str) -> ResolvedSource {
    if let Some(url) = parse_network_url(raw) {
        return ResolvedSource::RemoteUrl(url);
    }

    if let Some(path) = existing_path(raw) {
        return ResolvedSource::LocalFile(path);
    }

    ResolvedSource::InlineHtml(raw.to_string())
}

pub(crate) fn parse_network_url(raw: &str) -> Option<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Url::parse(trimmed)
        .ok()
        .filter(|url| is_network_scheme(url.scheme()) && url.has_host())
}

pub(crate) fn existing_path(raw: &str) -> Option<PathBuf> {
    // Markup never names a file; skip the filesystem lookup for obvious cases.
    if raw.is_empty() || raw.contains('\0') || raw.contains('<') || raw.contains('\n') {
        return None;
    }
    let path = Path::new(raw);
    path.is_file().then(|| path.to_path_buf())
}
