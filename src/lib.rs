//! Tether - remote command and telemetry framework.
//!
//! A hierarchy of named modules, each exposing callable functions, served
//! over a newline-delimited TCP protocol, plus a cooperative script runtime
//! that sequences blocking and asynchronous calls against the same tree.
//!
//! # Architecture
//!
//! - **Module** - command-tree node: adopted children, registered
//!   functions, telemetry variables
//! - **Server / Client** - TCP accept loop and per-connection handlers
//! - **ScriptRuntime** - queue-based scheduler, driven by the host's tick
//! - **Robot** - turnkey assembly of the above for a single device
//!
//! Remote consoles and scripts funnel through one dispatch routine
//! ([`dispatch::dispatch_line`]), so both observe identical resolution and
//! call semantics.
//!
//! # Modules
//!
//! - [`module`] - the command tree
//! - [`protocol`] - wire codec for the line protocol
//! - [`script`] - the script engine
//! - [`server`] - TCP front end
//! - [`device`] / [`robot`] - device capabilities and turnkey assembly

// Library modules
pub mod constants;
pub mod device;
pub mod dispatch;
pub mod function;
pub mod module;
pub mod protocol;
pub mod robot;
pub mod script;
pub mod server;

// Re-export commonly used types
pub use dispatch::dispatch_line;
pub use function::{CallOutcome, Function, Outcome};
pub use module::Module;
pub use robot::Robot;
pub use script::ScriptRuntime;
pub use server::Server;
