use anyhow::Result;

use super::script::LoadedScript;
use crate::window::Window;

/// Script-execution collaborator. Execution is synchronous from the pipeline's view;
/// an `Err` is reported to the virtual console and does not stop the pipeline.
pub trait ScriptExecutor {
    fn execute(&self, window: &Window, script: &LoadedScript) -> Result<()>;
}

/// Runs scripts in the window's QuickJS context.
#[derive(Debug, Default, Clone, Copy)]
pub struct QuickJsExecutor;

impl ScriptExecutor for QuickJsExecutor {
    fn execute(&self, window: &Window, script: &LoadedScript) -> Result<()> {
        window.eval(&script.source, &script.name)
    }
}
