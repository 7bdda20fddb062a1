//! Tools the model can call, and the executor that runs them.

pub mod arguments;
pub mod executor;
pub mod registry;
pub mod tool;
pub mod types;

pub use arguments::ToolArguments;
pub use executor::{ExecutionReport, ToolCallExecutor, ToolExecution};
pub use registry::ToolRegistry;
pub use tool::{FnTool, Tool, ToolOutput};
pub use types::{ParameterBuilder, ToolParameters};
