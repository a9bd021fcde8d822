use std::path::{Path, PathBuf};

use url::Url;

use crate::input::ResolvedSource;
use crate::net::{CookieJar, DefaultFetcher, FetchError};

/// Markup for the primary document plus the location it implies.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    /// `None` for inline markup; the response URL or `file:` URL otherwise.
    pub base_url: Option<Url>,
    pub contents: String,
}

/// Acquire the primary document. Only `RemoteUrl` and `LocalFile` can fail, and only when
/// the source cannot be fetched or opened; undecodable bytes are replaced.
///
/// `cookies` are sent with a remote request when they belong to its origin.
pub async fn load_primary(
    source: &ResolvedSource,
    fetcher: &DefaultFetcher,
    cookies: &CookieJar,
) -> Result<FetchedDocument, FetchError> {
    match source {
        ResolvedSource::InlineHtml(html) => Ok(FetchedDocument {
            base_url: None,
            contents: html.clone(),
        }),
        ResolvedSource::RemoteUrl(url) => {
            let cookie = cookies.cookie_string(url);
            let body = fetcher.fetch_document(url, Some(cookie.as_str())).await?;
            tracing::debug!(target: "env", url = %body.url, "fetched primary document");
            Ok(FetchedDocument {
                base_url: Some(body.url),
                contents: body.text,
            })
        }
        ResolvedSource::LocalFile(path) => {
            let (_, url) = file_url(path)?;
            let body = fetcher.fetch_document(&url, None).await?;
            Ok(FetchedDocument {
                base_url: Some(url),
                contents: body.text,
            })
        }
    }
}

/// Absolute form of `path` and its `file:` URL.
pub fn file_url(path: &Path) -> Result<(PathBuf, Url), FetchError> {
    let absolute = std::path::absolute(path).map_err(|source| FetchError::File {
        path: path.to_path_buf(),
        source,
    })?;
    let url = Url::from_file_path(&absolute).map_err(|_| FetchError::File {
        path: absolute.clone(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "invalid file path"),
    })?;
    Ok((absolute, url))
}
