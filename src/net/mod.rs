pub mod cookies;
pub mod fetcher;
pub mod loader;

pub use cookies::CookieJar;
pub use fetcher::{resolve_url, DefaultFetcher, FetchError, FetchedBody};
pub use loader::{loader_fn, Resource, ResourceCallback, ResourceLoader};
