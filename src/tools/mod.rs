//! Tools the model can call: the `Tool` trait, per-turn tool handles,
//! the WASM provider sandbox and the MCP client.

pub mod builtin;
pub mod handle;
pub mod mcp;
mod tool;
pub mod wasm;

pub use handle::{LocalToolHandle, RemoteToolHandle, ToolHandle};
pub use tool::{Tool, ToolOutput};
