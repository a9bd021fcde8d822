// Library exports for testing

pub mod config;
pub mod console;
pub mod env;
pub mod input;
pub mod js;
pub mod lifecycle;
pub mod navigation;
pub mod net;
pub mod window;

// Re-export commonly used types for tests
pub use config::{ConfigError, EnvOptions, Features, ResourceKind, ResourceKinds};
pub use console::{ConsoleEvent, JsdomError, VirtualConsole, JSDOM_ERROR};
pub use env::{env, env_with_input, Construction, EnvConfig, EnvError};
pub use js::executor::{QuickJsExecutor, ScriptExecutor};
pub use js::script::LoadedScript;
pub use net::{loader_fn, FetchError, Resource, ResourceCallback, ResourceLoader};
pub use window::{Document, DocumentParser, Window};
