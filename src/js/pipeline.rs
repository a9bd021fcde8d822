use std::collections::VecDeque;

use tokio::sync::oneshot;
use tracing::{debug, warn};
use url::Url;

use super::executor::ScriptExecutor;
use super::processor::DescriptorBuilder;
use super::script::{LoadedScript, ScriptDescriptor, ScriptSource};
use crate::input::is_network_scheme;
use crate::lifecycle::LifecycleLatch;
use crate::navigation::file_url;
use crate::net::{CookieJar, DefaultFetcher, FetchError, Resource, ResourceCallback, ResourceLoader};
use crate::window::Window;

/// Starts body acquisition for external descriptors, through the caller's loader when one
/// is configured.
pub struct Acquirer<'a> {
    fetcher: &'a DefaultFetcher,
    loader: Option<&'a dyn ResourceLoader>,
    base_url: &'a Url,
    cookies: &'a CookieJar,
}

impl<'a> Acquirer<'a> {
    pub fn new(
        fetcher: &'a DefaultFetcher,
        loader: Option<&'a dyn ResourceLoader>,
        base_url: &'a Url,
        cookies: &'a CookieJar,
    ) -> Self {
        Self {
            fetcher,
            loader,
            base_url,
            cookies,
        }
    }

    fn start(&self, descriptor: &ScriptDescriptor) -> Body {
        match &descriptor.source {
            ScriptSource::Inline { code } => Body::Ready(code.clone()),
            ScriptSource::Remote { url } => self.request(url.clone()),
            ScriptSource::LocalPath { path } => match file_url(path) {
                Ok((_, url)) => self.request(url),
                Err(err) => Body::Failed(err),
            },
        }
    }

    fn request(&self, url: Url) -> Body {
        let (tx, rx) = oneshot::channel();
        let callback: ResourceCallback = Box::new(move |result| {
            let _ = tx.send(result);
        });

        let cookie = if is_network_scheme(url.scheme()) && url.origin() == self.base_url.origin() {
            self.cookies.cookie_string(&url)
        } else {
            String::new()
        };

        let via_loader = self.loader.is_some();
        match self.loader {
            Some(loader) => {
                debug!(target: "script_fetch", url = %url, "handing request to resource loader");
                loader.load(
                    Resource::new(url, cookie, self.base_url.clone(), self.fetcher),
                    callback,
                );
            }
            None => self.fetcher.spawn_fetch(url, Some(cookie), callback),
        }

        Body::Pending { rx, via_loader }
    }
}

enum Body {
    Ready(String),
    Pending {
        rx: oneshot::Receiver<Result<String, FetchError>>,
        via_loader: bool,
    },
    Failed(FetchError),
}

impl Body {
    async fn resolve(self, locator: &str) -> Result<String, FetchError> {
        match self {
            Body::Ready(source) => Ok(source),
            Body::Failed(err) => Err(err),
            Body::Pending { rx, via_loader } => match rx.await {
                Ok(result) => result,
                Err(_) if via_loader => {
                    // A loader that drops its callback never settles the request.
                    warn!(
                        target: "script_fetch",
                        locator,
                        "resource loader dropped its callback; script stays pending"
                    );
                    std::future::pending().await
                }
                Err(_) => Err(FetchError::Interrupted),
            },
        }
    }
}

struct Scheduled {
    descriptor: ScriptDescriptor,
    body: Body,
    initial: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSummary {
    pub executed: usize,
    pub failed_loads: usize,
    pub failed_runs: usize,
}

/// Acquires script bodies concurrently and executes them strictly in declaration order.
pub struct ScriptPipeline<'a> {
    window: &'a Window,
    executor: &'a dyn ScriptExecutor,
    acquirer: Acquirer<'a>,
    latch: &'a LifecycleLatch,
}

impl<'a> ScriptPipeline<'a> {
    pub fn new(
        window: &'a Window,
        executor: &'a dyn ScriptExecutor,
        acquirer: Acquirer<'a>,
        latch: &'a LifecycleLatch,
    ) -> Self {
        Self {
            window,
            executor,
            acquirer,
            latch,
        }
    }

    /// Run `initial` plus anything inserted into the window before the queue drains.
    ///
    /// `onload` fires once every initially known script has settled. Scripts inserted
    /// later (while executing, or from `onload` itself) are tracked by the latch and run
    /// after everything already queued. `done` fires on the settle that drains the latch.
    pub async fn run<F, G>(
        self,
        builder: &mut DescriptorBuilder<'_>,
        initial: Vec<ScriptDescriptor>,
        onload: F,
        done: G,
    ) -> PipelineSummary
    where
        F: FnOnce(&Window),
        G: FnOnce(&Window),
    {
        let mut summary = PipelineSummary::default();
        let mut queue = VecDeque::new();
        let mut onload = Some(onload);
        let mut done = Some(done);

        let initial = initial.into_iter().chain(self.discover(builder));
        for descriptor in initial {
            self.schedule(descriptor, true, &mut queue);
        }
        let mut initial_remaining = queue.len();
        debug!(target: "script_pipeline", scripts = initial_remaining, "scheduled initial scripts");

        if initial_remaining == 0 {
            self.fire_onload(&mut onload, builder, &mut queue);
            if queue.is_empty() {
                self.fire_done(&mut done);
            }
        }

        while let Some(Scheduled {
            descriptor,
            body,
            initial,
        }) = queue.pop_front()
        {
            let locator = descriptor.locator();
            match body.resolve(&locator).await {
                Ok(source) => {
                    let script = LoadedScript {
                        index: descriptor.index,
                        name: locator.clone(),
                        source,
                    };
                    match self.executor.execute(self.window, &script) {
                        Ok(()) => {
                            summary.executed += 1;
                            debug!(target: "script_pipeline", index = descriptor.index, %locator, "executed script");
                        }
                        Err(err) => {
                            summary.failed_runs += 1;
                            self.window.virtual_console().jsdom_error(
                                format!("Error running script: \"{locator}\""),
                                Some(err.to_string()),
                            );
                        }
                    }
                }
                Err(err) => {
                    summary.failed_loads += 1;
                    self.window.virtual_console().jsdom_error(
                        format!("Could not load script: \"{locator}\""),
                        Some(err.to_string()),
                    );
                }
            }

            for discovered in self.discover(builder) {
                self.schedule(discovered, false, &mut queue);
            }
            let drained = self.latch.settle(descriptor.index);

            if initial {
                initial_remaining -= 1;
                if initial_remaining == 0 {
                    self.fire_onload(&mut onload, builder, &mut queue);
                }
            }
            if drained && queue.is_empty() {
                self.fire_done(&mut done);
            }
        }

        summary
    }

    fn fire_onload<F>(
        &self,
        onload: &mut Option<F>,
        builder: &mut DescriptorBuilder<'_>,
        queue: &mut VecDeque<Scheduled>,
    ) where
        F: FnOnce(&Window),
    {
        if let Some(callback) = onload.take() {
            if self.latch.mark_onload() {
                callback(self.window);
            }
        }
        for discovered in self.discover(builder) {
            self.schedule(discovered, false, queue);
        }
    }

    fn fire_done<G>(&self, done: &mut Option<G>)
    where
        G: FnOnce(&Window),
    {
        if !self.latch.mark_done() {
            return;
        }
        if let Some(callback) = done.take() {
            callback(self.window);
        }
    }

    fn discover(&self, builder: &mut DescriptorBuilder<'_>) -> Vec<ScriptDescriptor> {
        self.window
            .take_inserted_scripts()
            .into_iter()
            .filter_map(|input| builder.input(input))
            .collect()
    }

    fn schedule(&self, descriptor: ScriptDescriptor, initial: bool, queue: &mut VecDeque<Scheduled>) {
        if !self.latch.track(descriptor.index) {
            debug!(target: "script_pipeline", index = descriptor.index, "not tracking late script");
            return;
        }
        debug!(
            target: "script_pipeline",
            index = descriptor.index,
            origin = ?descriptor.origin(),
            "scheduling script"
        );
        let body = self.acquirer.start(&descriptor);
        queue.push_back(Scheduled {
            descriptor,
            body,
            initial,
        });
    }
}
