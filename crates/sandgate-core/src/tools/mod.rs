//! Schema-described tool registry and the built-in sandbox tools.
//!
//! Tools are string-keyed: clients send a [`ToolCall`] naming a registered
//! tool, the capability gate validates its arguments, and the handler runs
//! against the [`ToolHost`]. Every call produces exactly one [`ToolResult`].

pub mod builtin;
pub mod error;
pub mod host;
pub mod registry;

pub use builtin::builtin_registry;
pub use error::{ToolError, ToolOutcome};
pub use host::{CommandOutput, DirEntryInfo, FetchedPage, ToolHost};
pub use registry::{HandlerFuture, ToolCall, ToolHandler, ToolRegistry, ToolResult, ToolSpec};
