//! Agent-side function dispatch for DataMap tools
//!
//! An agent describes its functions as SWAIG definitions. The ones carrying a
//! `data_map` never run developer code: the platform evaluates them. This
//! crate registers those definitions and routes `(function, args)` calls into
//! the local DataMap interpreter so they can be exercised without the
//! platform.
//!
//! # Key Types
//!
//! - `Tool` - async callable keyed by function name
//! - `DataMapTool` - a `Tool` backed by a DataMap definition
//! - `ToolRegistry` - name → tool lookup and dispatch
//! - `AgentRuntime` - call entry point that shapes results for the caller

pub mod runtime;
pub mod tools;
