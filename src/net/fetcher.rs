use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use reqwest::header::COOKIE;
use reqwest::Client;
use thiserror::Error;
use tokio::sync::RwLock;
use url::Url;

use super::loader::ResourceCallback;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: Url },
    #[error("file error: {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("resource at {0} is not valid UTF-8")]
    Utf8(Url),
    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
    #[error("{0}")]
    Loader(String),
    #[error("fetch task ended without a result")]
    Interrupted,
}

impl FetchError {
    /// Error value for resource-loader hooks that reject a request themselves.
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Loader(message.into())
    }
}

/// Body of a fetched resource together with the URL it was finally served from.
#[derive(Debug, Clone)]
pub struct FetchedBody {
    pub url: Url,
    pub text: String,
}

/// How response bytes become text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decoding {
    /// Invalid UTF-8 is an error. Used for scripts.
    Strict,
    /// Invalid sequences become U+FFFD. Used for the primary document.
    Lossy,
}

#[derive(Debug, Clone)]
struct RawBody {
    url: Url,
    bytes: Vec<u8>,
}

/// Responses depend on the `Cookie` header, so it is part of the key.
type CacheKey = (Url, Option<String>);

/// Fetches `http(s)` and `file` URLs, caching successful bodies per URL and cookie.
///
/// One fetcher serves one construction; clones share the client and the cache.
#[derive(Clone)]
pub struct DefaultFetcher {
    client: Client,
    cache: Arc<RwLock<HashMap<CacheKey, RawBody>>>,
}

impl DefaultFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            cache: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Fetch `url` as script text, attaching `cookie` as the `Cookie` header for
    /// `http(s)` requests.
    pub async fn fetch(&self, url: &Url, cookie: Option<&str>) -> Result<FetchedBody, FetchError> {
        self.fetch_decoded(url, cookie, Decoding::Strict).await
    }

    /// Fetch a document. Undecodable bytes are replaced rather than rejected.
    pub async fn fetch_document(
        &self,
        url: &Url,
        cookie: Option<&str>,
    ) -> Result<FetchedBody, FetchError> {
        self.fetch_decoded(url, cookie, Decoding::Lossy).await
    }

    async fn fetch_decoded(
        &self,
        url: &Url,
        cookie: Option<&str>,
        decoding: Decoding,
    ) -> Result<FetchedBody, FetchError> {
        let raw = self.fetch_raw(url, cookie).await?;
        let text = match decoding {
            Decoding::Strict => {
                String::from_utf8(raw.bytes).map_err(|_| FetchError::Utf8(url.clone()))?
            }
            Decoding::Lossy => String::from_utf8_lossy(&raw.bytes).into_owned(),
        };
        Ok(FetchedBody { url: raw.url, text })
    }

    async fn fetch_raw(&self, url: &Url, cookie: Option<&str>) -> Result<RawBody, FetchError> {
        let header = cookie
            .filter(|value| !value.is_empty() && is_network_url(url))
            .map(str::to_string);
        let key = (url.clone(), header);

        {
            let cache_read = self.cache.read().await;
            if let Some(cached) = cache_read.get(&key) {
                tracing::debug!(target: "script_fetch", url = %url, "cache hit");
                return Ok(cached.clone());
            }
        }

        tracing::debug!(target: "script_fetch", url = %url, "fetching");
        let body = match url.scheme() {
            "http" | "https" => self.fetch_from_network(url, key.1.as_deref()).await?,
            "file" => fetch_from_file(url).await?,
            other => return Err(FetchError::UnsupportedScheme(other.to_string())),
        };

        {
            let mut cache_write = self.cache.write().await;
            cache_write.insert(key, body.clone());
        }

        Ok(body)
    }

    /// Run [`DefaultFetcher::fetch`] on its own task and hand the outcome to `callback`.
    pub fn spawn_fetch(&self, url: Url, cookie: Option<String>, callback: ResourceCallback) {
        let fetcher = self.clone();
        tokio::spawn(async move {
            let result = fetcher
                .fetch(&url, cookie.as_deref())
                .await
                .map(|body| body.text);
            callback(result);
        });
    }

    async fn fetch_from_network(
        &self,
        url: &Url,
        cookie: Option<&str>,
    ) -> Result<RawBody, FetchError> {
        let mut request = self.client.get(url.clone());
        if let Some(cookie) = cookie {
            request = request.header(COOKIE, cookie);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.clone(),
            });
        }

        let final_url = response.url().clone();
        let bytes = response.bytes().await?;

        Ok(RawBody {
            url: final_url,
            bytes: bytes.to_vec(),
        })
    }
}

fn is_network_url(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

async fn fetch_from_file(url: &Url) -> Result<RawBody, FetchError> {
    let path = url
        .to_file_path()
        .map_err(|_| FetchError::UnsupportedScheme(format!("non-local file URL {url}")))?;

    if path.is_dir() {
        return Err(FetchError::File {
            path,
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "path is a directory"),
        });
    }

    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(RawBody {
            url: url.clone(),
            bytes,
        }),
        Err(source) => Err(FetchError::File { path, source }),
    }
}

/// Turn a script locator into an absolute URL.
///
/// Absolute URLs are used as-is; relative ones are joined onto `base` when it is an
/// `http(s)` or `file` URL. Returns `None` when there is nothing to join against.
pub fn resolve_url(locator: &str, base: &Url) -> Option<Url> {
    if let Ok(url) = Url::parse(locator) {
        return Some(url);
    }

    match base.scheme() {
        "http" | "https" | "file" => base.join(locator).ok(),
        _ => None,
    }
}
