use anyhow::{Context as AnyhowContext, Result};
use rquickjs::{Context, Ctx, Error as JsError, Function, Runtime, Value};

use crate::console::{ConsoleEvent, VirtualConsole};

/// JavaScript runtime backed by QuickJS.
///
/// Each window owns one engine. `window` and `self` alias the global object, and the
/// `console` methods forward to the window's [`VirtualConsole`].
pub struct QuickJsEngine {
    runtime: Runtime,
    context: Context,
}

impl QuickJsEngine {
    pub fn new(console: VirtualConsole) -> Result<Self> {
        let runtime = Runtime::new().context("failed to create QuickJS runtime")?;
        let context = Context::full(&runtime).context("failed to create QuickJS context")?;
        let engine = Self { runtime, context };
        engine.init_globals(console)?;
        Ok(engine)
    }

    /// Evaluate a script and discard the result.
    pub fn eval(&self, source: &str, filename: &str) -> Result<()> {
        self.eval_with::<()>(source, filename)
    }

    /// Evaluate a script and convert the result into `V`.
    pub fn eval_with<V>(&self, source: &str, filename: &str) -> Result<V>
    where
        V: for<'js> rquickjs::FromJs<'js>,
    {
        let script = Self::with_source_url(source, filename);
        let eval_result = self.context.with(|ctx| ctx.eval::<V, _>(script));

        let value = match eval_result {
            Ok(value) => Ok(value),
            Err(JsError::Exception) => {
                let message = self
                    .context
                    .with(|ctx| capture_exception_message(&ctx))
                    .unwrap_or_else(|| "QuickJS exception".to_string());
                Err(anyhow::anyhow!(message))
            }
            Err(err) => Err(anyhow::Error::from(err)),
        }?;

        self.execute_pending_jobs();

        Ok(value)
    }

    /// Install a global named `name` from a JSON document.
    pub fn set_global_json(&self, name: &str, json: &str) -> Result<()> {
        self.with_context(|ctx| {
            let value = ctx.json_parse(json.as_bytes())?;
            ctx.globals().set(name, value)
        })
        .with_context(|| format!("failed to install global {name}"))
    }

    /// Provide access to the underlying QuickJS context for advanced integrations.
    pub fn with_context<T, F>(&self, f: F) -> Result<T>
    where
        F: for<'js> FnOnce(Ctx<'js>) -> rquickjs::Result<T>,
    {
        self.context.with(f).map_err(anyhow::Error::from)
    }

    /// Drain promise continuations queued by the last evaluation.
    fn execute_pending_jobs(&self) {
        let mut job_count = 0;
        const MAX_JOBS: usize = 1000;

        while self.runtime.is_job_pending() {
            match self.runtime.execute_pending_job() {
                Ok(true) => {
                    job_count += 1;
                    if job_count >= MAX_JOBS {
                        tracing::warn!(
                            target: "quickjs",
                            "stopped processing jobs after {} iterations",
                            MAX_JOBS
                        );
                        break;
                    }
                }
                Ok(false) => break,
                Err(job_exception) => {
                    tracing::error!(target: "quickjs", "job execution error: {:?}", job_exception);
                    break;
                }
            }
        }

        if job_count > 0 {
            tracing::debug!(target: "quickjs", "executed {} pending jobs", job_count);
        }
    }

    fn init_globals(&self, console: VirtualConsole) -> Result<()> {
        self.context
            .with(|ctx| {
                let global = ctx.globals();
                global.set("window", global.clone())?;
                global.set("self", global.clone())?;

                let sink = console.clone();
                let console_fn = Function::new(
                    ctx.clone(),
                    move |level: String, message: String| -> rquickjs::Result<()> {
                        sink.emit(ConsoleEvent::Script { level, message });
                        Ok(())
                    },
                )?
                .with_name("__domenv_console")?;
                global.set("__domenv_console", console_fn)?;

                ctx.eval::<(), _>(CONSOLE_BOOTSTRAP.as_bytes())
            })
            .map_err(anyhow::Error::from)
    }

    fn with_source_url(source: &str, filename: &str) -> Vec<u8> {
        let mut script = String::with_capacity(source.len() + filename.len() + 32);
        script.push_str(source);
        if !source.ends_with('\n') {
            script.push('\n');
        }
        script.push_str("//# sourceURL=");
        script.push_str(filename);
        script.push('\n');
        script.into_bytes()
    }
}

fn capture_exception_message(ctx: &Ctx<'_>) -> Option<String> {
    let exception: Value = ctx.catch();

    if let Some(obj) = exception.as_object() {
        if let Ok(message) = obj.get::<_, String>("message") {
            return Some(message);
        }
    }
    if let Some(text) = exception.as_string().and_then(|s| s.to_string().ok()) {
        return Some(text);
    }

    Some(format!("{:?}", exception))
}

const CONSOLE_BOOTSTRAP: &str = r#"
(() => {
    const global = globalThis;
    const sink = global.__domenv_console;
    const stringify = (value) => {
        try {
            if (typeof value === 'string') {
                return value;
            }
            if (value === undefined) {
                return 'undefined';
            }
            if (value === null) {
                return 'null';
            }
            return String(value);
        } catch (err) {
            return '[unprintable]';
        }
    };

    const forward = (level) => (...args) => {
        try {
            sink(level, args.map(stringify).join(' '));
        } catch (err) {
            // console must never throw
        }
    };

    if (typeof global.console !== 'object' || global.console === null) {
        global.console = {};
    }

    for (const level of ['log', 'info', 'warn', 'error', 'debug']) {
        global.console[level] = forward(level);
    }
})();
"#;
