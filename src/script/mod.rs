//! Script engine: a queue-based cooperative scheduler over the command tree.
//!
//! A script is plain text, one call per line:
//!
//! ```text
//! // zero the arm, then settle while the intake spins up
//! s robot timer reset
//! a robot sleep 2000
//! s robot log settled
//! ```
//!
//! Every line starts with a type token. A line whose *first character* is
//! `a` is asynchronous; anything else is blocking (`s` by convention). The
//! type token is stripped before dispatch, so it must always be present.
//!
//! Lines flow through three queues, advanced one tick at a time:
//!
//! ```text
//!   awaiting -----> (head only, one per tick)
//!      |                blocking: run, keep at head until finished
//!      |                blank/comment: drop
//!      |  async head
//!      v
//!   asynchronous --> every entry runs every tick, completions leave
//!      |
//!      v
//!   finished
//! ```
//!
//! The scheduler never runs on its own; a host calls
//! [`ScriptRuntime::next`] at its control-loop cadence and reads progress
//! from the runtime module's telemetry keys.

pub mod runtime;

pub use runtime::ScriptRuntime;
