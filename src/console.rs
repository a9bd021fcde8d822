use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde::Serialize;

/// Channel carrying non-fatal environment errors (unreachable scripts, script exceptions).
pub const JSDOM_ERROR: &str = "jsdomError";

/// Payload of a `jsdomError` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JsdomError {
    pub message: String,
    pub detail: Option<String>,
}

impl fmt::Display for JsdomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{} ({})", self.message, detail),
            None => f.write_str(&self.message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "channel", rename_all = "camelCase")]
pub enum ConsoleEvent {
    JsdomError(JsdomError),
    /// `console.*` output from a script; `level` is the method name (`log`, `warn`, ...).
    Script { level: String, message: String },
}

impl ConsoleEvent {
    pub fn jsdom_error(message: impl Into<String>, detail: Option<String>) -> Self {
        Self::JsdomError(JsdomError {
            message: message.into(),
            detail,
        })
    }

    pub fn channel(&self) -> &str {
        match self {
            Self::JsdomError(_) => JSDOM_ERROR,
            Self::Script { level, .. } => level,
        }
    }
}

type Listener = Arc<dyn Fn(&ConsoleEvent) + Send + Sync>;

/// Out-of-band event sink for a constructed environment.
///
/// Cloning is cheap and clones share listeners, so one console can be handed to many
/// concurrent constructions. Every event is logged through `tracing` before listeners run,
/// which keeps errors visible when nobody subscribed.
#[derive(Clone, Default)]
pub struct VirtualConsole {
    listeners: Arc<RwLock<HashMap<String, Vec<Listener>>>>,
}

impl VirtualConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for events on `channel` (`"jsdomError"`, `"log"`, `"warn"`, ...).
    pub fn on<F>(&self, channel: &str, listener: F) -> &Self
    where
        F: Fn(&ConsoleEvent) + Send + Sync + 'static,
    {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        listeners
            .entry(channel.to_string())
            .or_default()
            .push(Arc::new(listener));
        self
    }

    /// Convenience wrapper over [`VirtualConsole::on`] for the `jsdomError` channel.
    pub fn on_jsdom_error<F>(&self, listener: F) -> &Self
    where
        F: Fn(&JsdomError) + Send + Sync + 'static,
    {
        self.on(JSDOM_ERROR, move |event| {
            if let ConsoleEvent::JsdomError(error) = event {
                listener(error);
            }
        })
    }

    pub fn emit(&self, event: ConsoleEvent) {
        match &event {
            ConsoleEvent::JsdomError(error) => {
                tracing::warn!(
                    target: "virtual_console",
                    message = %error.message,
                    detail = error.detail.as_deref().unwrap_or(""),
                    "jsdomError"
                );
            }
            ConsoleEvent::Script { level, message } => {
                tracing::info!(target: "virtual_console", level = %level, message = %message);
            }
        }

        // Snapshot so listeners may register further listeners without deadlocking.
        let listeners: Vec<Listener> = {
            let guard = self
                .listeners
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.get(event.channel()).cloned().unwrap_or_default()
        };
        for listener in listeners {
            listener(&event);
        }
    }

    pub fn jsdom_error(&self, message: impl Into<String>, detail: Option<String>) {
        self.emit(ConsoleEvent::jsdom_error(message, detail));
    }
}

impl fmt::Debug for VirtualConsole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channels = self
            .listeners
            .read()
            .map(|listeners| listeners.len())
            .unwrap_or(0);
        f.debug_struct("VirtualConsole")
            .field("channels", &channels)
            .finish()
    }
}
