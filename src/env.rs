use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{normalize, ConfigError, EnvOptions, Features, NormalizedConfig};
use crate::console::VirtualConsole;
use crate::input::ResolvedSource;
use crate::js::executor::{QuickJsExecutor, ScriptExecutor};
use crate::js::pipeline::{Acquirer, ScriptPipeline};
use crate::js::processor::{build_descriptors, collect_scripts, DescriptorBuilder};
use crate::lifecycle::LifecycleLatch;
use crate::navigation::load_primary;
use crate::net::{loader_fn, CookieJar, DefaultFetcher, FetchError, Resource, ResourceCallback, ResourceLoader};
use crate::window::{DocumentParser, Window, WindowBuilder};

/// Fatal construction failure. Non-fatal problems go to the virtual console instead.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] FetchError),
    #[error("failed to load {location}: {source}")]
    Load {
        location: String,
        #[source]
        source: FetchError,
    },
    #[error("failed to create window: {0:#}")]
    Window(#[source] anyhow::Error),
}

pub type CreatedCallback = Box<dyn FnOnce(Result<&Window, &EnvError>)>;
pub type OnloadCallback = Box<dyn FnOnce(&Window)>;
pub type DoneCallback = Box<dyn FnOnce(Result<&Window, &EnvError>)>;

/// Everything one construction needs: declarative options plus the collaborator and
/// callback slots that cannot be deserialized.
#[derive(Default)]
pub struct EnvConfig {
    options: EnvOptions,
    resource_loader: Option<Arc<dyn ResourceLoader>>,
    virtual_console: Option<VirtualConsole>,
    executor: Option<Box<dyn ScriptExecutor>>,
    parser: Option<Arc<dyn DocumentParser>>,
    created: Option<CreatedCallback>,
    onload: Option<OnloadCallback>,
    done: Option<DoneCallback>,
}

impl EnvConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Positional input, classified as URL, existing file or markup.
    pub fn from_input(input: impl Into<String>) -> Self {
        Self::from_options(EnvOptions {
            input: Some(input.into()),
            ..Default::default()
        })
    }

    pub fn from_options(options: EnvOptions) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }

    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.options.html = Some(html.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.options.url = Some(url.into());
        self
    }

    pub fn file(mut self, file: impl Into<PathBuf>) -> Self {
        self.options.file = Some(file.into());
        self
    }

    /// Append an external script (URL or path).
    pub fn script(mut self, locator: impl Into<String>) -> Self {
        self.options.scripts.push(locator.into());
        self
    }

    /// Append an inline script source.
    pub fn src(mut self, code: impl Into<String>) -> Self {
        self.options.src.push(code.into());
        self
    }

    pub fn referrer(mut self, referrer: impl Into<String>) -> Self {
        self.options.document.referrer = Some(referrer.into());
        self
    }

    /// Add a `Set-Cookie` string applied to the document.
    pub fn cookie(mut self, cookie: impl Into<String>) -> Self {
        self.options.document.cookie.push(cookie.into());
        self
    }

    pub fn features(mut self, features: Features) -> Self {
        self.options.features = features;
        self
    }

    pub fn resource_loader<L>(mut self, loader: L) -> Self
    where
        L: ResourceLoader + 'static,
    {
        self.resource_loader = Some(Arc::new(loader));
        self
    }

    pub fn resource_loader_fn<F>(self, f: F) -> Self
    where
        F: Fn(Resource<'_>, ResourceCallback) + Send + Sync + 'static,
    {
        self.resource_loader(loader_fn(f))
    }

    pub fn virtual_console(mut self, console: VirtualConsole) -> Self {
        self.virtual_console = Some(console);
        self
    }

    pub fn executor<E>(mut self, executor: E) -> Self
    where
        E: ScriptExecutor + 'static,
    {
        self.executor = Some(Box::new(executor));
        self
    }

    pub fn parser(mut self, parser: Arc<dyn DocumentParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn created<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Result<&Window, &EnvError>) + 'static,
    {
        self.created = Some(Box::new(f));
        self
    }

    pub fn onload<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&Window) + 'static,
    {
        self.onload = Some(Box::new(f));
        self
    }

    pub fn done<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Result<&Window, &EnvError>) + 'static,
    {
        self.done = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for EnvConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvConfig")
            .field("options", &self.options)
            .field("resource_loader", &self.resource_loader.is_some())
            .field("virtual_console", &self.virtual_console.is_some())
            .field("executor", &self.executor.is_some())
            .field("created", &self.created.is_some())
            .field("onload", &self.onload.is_some())
            .field("done", &self.done.is_some())
            .finish_non_exhaustive()
    }
}

/// Validate that `config` can report its outcome and hand back a runnable construction.
///
/// Only a missing callback is reported here; every other configuration problem reaches
/// `created`/`done` once [`Construction::run`] starts.
pub fn env(config: EnvConfig) -> Result<Construction, ConfigError> {
    if config.created.is_none() && config.done.is_none() {
        return Err(ConfigError::MissingCallback);
    }
    Ok(Construction { config })
}

/// Positional form: classify `input` and report completion to `done`.
pub fn env_with_input<F>(input: impl Into<String>, done: F) -> Result<Construction, ConfigError>
where
    F: FnOnce(Result<&Window, &EnvError>) + 'static,
{
    env(EnvConfig::from_input(input).done(done))
}

/// A validated construction waiting to run.
#[derive(Debug)]
pub struct Construction {
    config: EnvConfig,
}

impl Construction {
    /// Build the window, run its scripts and fire the lifecycle callbacks.
    ///
    /// Resolves once `done` has fired. A resource loader that never settles a request keeps
    /// this future pending.
    pub async fn run(self) -> Result<Window, EnvError> {
        let EnvConfig {
            options,
            resource_loader,
            virtual_console,
            executor,
            parser,
            created,
            onload,
            done,
        } = self.config;

        let latch = LifecycleLatch::new();
        let console = virtual_console.unwrap_or_default();

        let (window, normalized, fetcher) = match prepare(&options, parser, console).await {
            Ok(prepared) => prepared,
            Err(err) => return Err(fail(&latch, created, done, err)),
        };

        if latch.mark_created() {
            if let Some(created) = created {
                created(Ok(&window));
            }
        }

        let executor = executor.unwrap_or_else(|| Box::new(QuickJsExecutor));
        let base = window.location().clone();
        let mut builder = DescriptorBuilder::new(&base, &normalized.policy);
        let descriptors = build_descriptors(
            &mut builder,
            collect_scripts(window.document().tree()),
            &normalized.scripts,
            &normalized.src,
        );
        debug!(target: "env", scripts = descriptors.len(), "collected scripts");

        let acquirer = Acquirer::new(
            &fetcher,
            resource_loader.as_deref(),
            &base,
            window.document().cookie_jar(),
        );
        let summary = ScriptPipeline::new(&window, &*executor, acquirer, &latch)
            .run(
                &mut builder,
                descriptors,
                move |window: &Window| {
                    if let Some(onload) = onload {
                        onload(window);
                    }
                },
                move |window: &Window| {
                    if let Some(done) = done {
                        done(Ok(window));
                    }
                },
            )
            .await;

        info!(
            target: "env",
            location = %window.location(),
            executed = summary.executed,
            failed_loads = summary.failed_loads,
            failed_runs = summary.failed_runs,
            "construction finished"
        );

        Ok(window)
    }
}

async fn prepare(
    options: &EnvOptions,
    parser: Option<Arc<dyn DocumentParser>>,
    console: VirtualConsole,
) -> Result<(Window, NormalizedConfig, DefaultFetcher), EnvError> {
    let normalized = normalize(options)?;
    let fetcher = DefaultFetcher::new().map_err(EnvError::Client)?;

    let mut request_cookies = CookieJar::new();
    let cookie_base = normalized.location.as_ref().or(match &normalized.source {
        ResolvedSource::RemoteUrl(url) => Some(url),
        _ => None,
    });
    if let Some(base) = cookie_base {
        for raw in &normalized.cookies {
            request_cookies.set(raw, base);
        }
    }

    let fetched = load_primary(&normalized.source, &fetcher, &request_cookies)
        .await
        .map_err(|source| EnvError::Load {
            location: describe(&normalized.source),
            source,
        })?;

    let mut builder = WindowBuilder::new(fetched.contents)
        .referrer(normalized.referrer.clone())
        .cookies(normalized.cookies.clone())
        .console(console);
    if let Some(location) = normalized.location.clone().or(fetched.base_url) {
        builder = builder.location(location);
    }
    if let Some(parser) = parser {
        builder = builder.parser(parser);
    }
    let window = builder.build().map_err(EnvError::Window)?;

    Ok((window, normalized, fetcher))
}

fn fail(
    latch: &LifecycleLatch,
    created: Option<CreatedCallback>,
    done: Option<DoneCallback>,
    err: EnvError,
) -> EnvError {
    warn!(target: "env", error = %err, "construction failed");
    if latch.mark_created() {
        if let Some(created) = created {
            created(Err(&err));
        }
    }
    if latch.mark_failed() {
        if let Some(done) = done {
            done(Err(&err));
        }
    }
    err
}

fn describe(source: &ResolvedSource) -> String {
    match source {
        ResolvedSource::InlineHtml(_) => "inline markup".to_string(),
        ResolvedSource::RemoteUrl(url) => url.to_string(),
        ResolvedSource::LocalFile(path) => path.display().to_string(),
    }
}
