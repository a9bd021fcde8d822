pub mod executor;
pub mod pipeline;
pub mod processor;
pub mod runtime;
pub mod script;
