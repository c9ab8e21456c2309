// DAP client library
//
// Drives an external DAP-speaking debugger (netcoredbg by default) over
// the child process's stdio

pub mod client;
pub mod commands;
pub mod protocol;
pub mod types;

pub use client::{DapClient, DapEvent};
pub use protocol::{DapError, DapResult};

/// Command line used when no explicit debugger binary is configured.
pub const DEFAULT_DEBUGGER_COMMAND: &str = "netcoredbg";
pub const DEFAULT_DEBUGGER_ARGS: &[&str] = &["--interpreter=vscode"];
