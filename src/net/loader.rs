use std::fmt;

use url::Url;

use super::fetcher::{DefaultFetcher, FetchError};

/// Completion for one resource request. Must be called exactly once.
pub type ResourceCallback = Box<dyn FnOnce(Result<String, FetchError>) + Send + 'static>;

/// A single external fetch offered to a [`ResourceLoader`].
///
/// Fields may be rewritten before calling [`Resource::default_fetch`], which performs the
/// standard fetch against whatever `url` and `cookie` hold at that point. The request
/// borrows the construction's fetcher, so it cannot outlive the hook call it was given to.
pub struct Resource<'a> {
    pub url: Url,
    /// Cookie header value for this request; empty for cross-origin requests.
    pub cookie: String,
    pub base_url: Url,
    fetcher: &'a DefaultFetcher,
}

impl<'a> Resource<'a> {
    pub(crate) fn new(url: Url, cookie: String, base_url: Url, fetcher: &'a DefaultFetcher) -> Self {
        Self {
            url,
            cookie,
            base_url,
            fetcher,
        }
    }

    /// Perform the unmodified fetch and forward the result to `callback`.
    ///
    /// `callback` may be the hook's own callback or a continuation that transforms the body
    /// before settling it.
    pub fn default_fetch(self, callback: ResourceCallback) {
        let cookie = if self.url.origin() == self.base_url.origin() {
            Some(self.cookie)
        } else {
            None
        };
        self.fetcher.spawn_fetch(self.url, cookie, callback);
    }
}

impl fmt::Debug for Resource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("url", &self.url.as_str())
            .field("cookie", &self.cookie)
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

/// Interception point for every external script fetch made during construction.
///
/// Implementations must eventually settle `callback`, either directly or through
/// [`Resource::default_fetch`]. A request that is never settled keeps its script pending
/// and construction never reaches `done`.
pub trait ResourceLoader: Send + Sync {
    fn load(&self, resource: Resource<'_>, callback: ResourceCallback);
}

/// Adapter so plain closures can be used as loaders. Build it with [`loader_fn`].
pub struct FnLoader<F>(F);

pub fn loader_fn<F>(f: F) -> FnLoader<F>
where
    F: Fn(Resource<'_>, ResourceCallback) + Send + Sync,
{
    FnLoader(f)
}

impl<F> ResourceLoader for FnLoader<F>
where
    F: Fn(Resource<'_>, ResourceCallback) + Send + Sync,
{
    fn load(&self, resource: Resource<'_>, callback: ResourceCallback) {
        (self.0)(resource, callback)
    }
}
