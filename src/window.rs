use std::cell::RefCell;
use std::sync::Arc;

use anyhow::Result;
use kuchiki::traits::*;
use kuchiki::{ElementData, NodeDataRef, NodeRef};
use serde_json::json;
use url::Url;

use crate::console::VirtualConsole;
use crate::js::runtime::QuickJsEngine;
use crate::js::script::ScriptInput;
use crate::net::CookieJar;

pub const ABOUT_BLANK: &str = "about:blank";

/// HTML parsing collaborator. Parsing must be forgiving: malformed markup still
/// produces a tree.
pub trait DocumentParser: Send + Sync {
    fn parse(&self, html: &str) -> NodeRef;
}

/// html5ever-backed parser via kuchiki.
#[derive(Debug, Default, Clone, Copy)]
pub struct Html5everParser;

impl DocumentParser for Html5everParser {
    fn parse(&self, html: &str) -> NodeRef {
        kuchiki::parse_html().one(html)
    }
}

pub struct Document {
    tree: NodeRef,
    url: Url,
    referrer: String,
    cookies: CookieJar,
}

impl Document {
    pub fn tree(&self) -> &NodeRef {
        &self.tree
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn referrer(&self) -> &str {
        &self.referrer
    }

    /// `document.cookie`: the `name=value` pairs visible to the document URL.
    pub fn cookie(&self) -> String {
        self.cookies.cookie_string(&self.url)
    }

    pub(crate) fn cookie_jar(&self) -> &CookieJar {
        &self.cookies
    }

    pub fn query_selector(&self, selector: &str) -> Option<NodeDataRef<ElementData>> {
        self.tree.select_first(selector).ok()
    }

    /// Serialize the tree back to markup.
    pub fn to_html(&self) -> String {
        self.tree.to_string()
    }
}

/// A constructed page context: location, document and script globals.
pub struct Window {
    location: Url,
    document: Document,
    engine: QuickJsEngine,
    console: VirtualConsole,
    inserted_scripts: RefCell<Vec<ScriptInput>>,
}

impl Window {
    pub fn location(&self) -> &Url {
        &self.location
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn virtual_console(&self) -> &VirtualConsole {
        &self.console
    }

    /// Evaluate `source` in this window's global scope.
    pub fn eval(&self, source: &str, filename: &str) -> Result<()> {
        self.engine.eval(source, filename)
    }

    pub fn eval_with<V>(&self, source: &str, filename: &str) -> Result<V>
    where
        V: for<'js> rquickjs::FromJs<'js>,
    {
        self.engine.eval_with(source, filename)
    }

    /// Queue an inline script discovered after construction started. It runs after every
    /// script already queued, provided construction has not finished.
    pub fn add_inline_script(&self, code: impl Into<String>) {
        self.inserted_scripts
            .borrow_mut()
            .push(ScriptInput::Inline(code.into()));
    }

    /// Queue an external script (URL or path) discovered after construction started.
    pub fn add_external_script(&self, locator: impl Into<String>) {
        self.inserted_scripts
            .borrow_mut()
            .push(ScriptInput::External(locator.into()));
    }

    pub(crate) fn take_inserted_scripts(&self) -> Vec<ScriptInput> {
        std::mem::take(&mut *self.inserted_scripts.borrow_mut())
    }
}

/// Builds a [`Window`] synchronously from markup and location parameters.
pub struct WindowBuilder {
    html: String,
    location: Option<Url>,
    referrer: String,
    cookies: Vec<String>,
    console: VirtualConsole,
    parser: Arc<dyn DocumentParser>,
}

impl WindowBuilder {
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            location: None,
            referrer: String::new(),
            cookies: Vec::new(),
            console: VirtualConsole::new(),
            parser: Arc::new(Html5everParser),
        }
    }

    pub fn location(mut self, location: Url) -> Self {
        self.location = Some(location);
        self
    }

    pub fn referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = referrer.into();
        self
    }

    pub fn cookies(mut self, cookies: Vec<String>) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn console(mut self, console: VirtualConsole) -> Self {
        self.console = console;
        self
    }

    pub fn parser(mut self, parser: Arc<dyn DocumentParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn build(self) -> Result<Window> {
        let location = match self.location {
            Some(location) => location,
            None => Url::parse(ABOUT_BLANK)?,
        };

        let mut cookies = CookieJar::new();
        for raw in &self.cookies {
            cookies.set(raw, &location);
        }

        let document = Document {
            tree: self.parser.parse(&self.html),
            url: location.clone(),
            referrer: self.referrer,
            cookies,
        };

        let engine = QuickJsEngine::new(self.console.clone())?;
        engine.set_global_json("location", &location_json(&location).to_string())?;
        engine.set_global_json(
            "document",
            &json!({
                "URL": location.as_str(),
                "referrer": document.referrer(),
                "cookie": document.cookie(),
            })
            .to_string(),
        )?;

        tracing::debug!(target: "env", location = %location, "window created");

        Ok(Window {
            location,
            document,
            engine,
            console: self.console,
            inserted_scripts: RefCell::new(Vec::new()),
        })
    }
}

fn location_json(url: &Url) -> serde_json::Value {
    let host = match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        _ => String::new(),
    };
    json!({
        "href": url.as_str(),
        "origin": url.origin().ascii_serialization(),
        "protocol": format!("{}:", url.scheme()),
        "host": host,
        "hostname": url.host_str().unwrap_or(""),
        "port": url.port().map(|port| port.to_string()).unwrap_or_default(),
        "pathname": url.path(),
        "search": url.query().map(|query| format!("?{query}")).unwrap_or_default(),
        "hash": url.fragment().map(|fragment| format!("#{fragment}")).unwrap_or_default(),
    })
}
