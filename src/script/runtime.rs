//! The script scheduler and its backing queues.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};

use crate::dispatch::dispatch_line;
use crate::function::{CallOutcome, Outcome};
use crate::module::Module;

/// Telemetry key: overall script state, `loaded`, `finished` or
/// `not-finished`.
pub const STATE_KEY: &str = "state";
/// Telemetry key: description of the last script error. Sticky; neither a
/// later successful tick nor a reload clears it.
pub const ERROR_KEY: &str = "error";
/// Telemetry key: the blocking line most recently executed.
pub const CURRENT_BLOCK_KEY: &str = "current_block";
/// Telemetry key: the asynchronous lines still pending after the last
/// async pass, `", "`-joined. Only written on ticks where a pass ran.
pub const CURRENT_ASYNC_KEY: &str = "current_async";

/// Lines starting with this run nothing and are consumed from the head.
pub const COMMENT_MARKER: &str = "//";
/// A line whose first character is this goes to the asynchronous lane.
pub const ASYNC_MARKER: char = 'a';

/// Separator for the `current_async` telemetry listing.
const LIST_SEPARATOR: &str = ", ";

/// Id the runtime's module answers to in the tree.
const RUNTIME_ID: &str = "runtime";

#[derive(Debug, Default)]
struct Queues {
    awaiting: VecDeque<String>,
    asynchronous: Vec<String>,
    finished: Vec<String>,
}

/// Cooperative script scheduler bound to a command tree.
///
/// The runtime owns a [`Module`] (id `runtime`) exposing the remotely
/// callable `load` function and the telemetry keys; callers adopt that
/// module into the tree and then drive the runtime by calling [`next`]
/// periodically.
///
/// Cheap to clone; clones share the queues and the module.
///
/// # Deadlock Prevention
///
/// The queue mutex is never held while a call line runs. A dispatched call
/// can therefore reach back into the runtime, and a script can legally
/// reload its own runtime (`s runtime load ...`); queue moves decided
/// before such a call are re-validated against the live queue afterward
/// and dropped if the queue changed underneath them.
///
/// [`next`]: ScriptRuntime::next
#[derive(Debug, Clone)]
pub struct ScriptRuntime {
    module: Module,
    root: Module,
    queues: Arc<Mutex<Queues>>,
}

impl ScriptRuntime {
    /// Create a runtime whose call lines resolve against `root`. The
    /// returned runtime's module is not adopted anywhere automatically.
    pub fn new(root: &Module) -> Self {
        let module = Module::with_kind(RUNTIME_ID, "ScriptRuntime");
        let queues = Arc::new(Mutex::new(Queues::default()));

        let load_queues = Arc::clone(&queues);
        let weak = module.downgrade();
        module.register("load", move |parameter: Option<&str>| {
            let script = parameter.context("load requires a script body")?;
            let module = weak.upgrade().context("module dropped")?;
            {
                let mut queues = load_queues.lock().expect("Queues mutex poisoned");
                queues.awaiting.clear();
                queues.asynchronous.clear();
                queues.finished.clear();
                queues.awaiting.extend(script.lines().map(str::to_owned));
            }
            module.set(STATE_KEY, "loaded");
            Ok(Outcome::finished("Script loaded"))
        });

        Self { module, root: root.clone(), queues }
    }

    /// The runtime's own module, carrying `load` and the telemetry keys.
    /// Adopt it into the tree to make the runtime remotely reachable.
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Append one call line to the tail of the awaiting queue.
    pub fn enqueue(&self, call: impl Into<String>) {
        let mut queues = self.queues.lock().expect("Queues mutex poisoned");
        queues.awaiting.push_back(call.into());
    }

    /// Advance the script by one tick: at most one head line from the
    /// awaiting queue, then every line in the asynchronous lane.
    ///
    /// A failure anywhere (malformed line, unknown function, failing
    /// function body) aborts the rest of the tick; the description lands in
    /// the `error` telemetry key and queue moves already applied stay
    /// applied. The next tick starts fresh from the same queues.
    pub fn next(&self) {
        if let Err(error) = self.tick() {
            log::warn!("[Runtime] Script error: {error:#}");
            self.module.set(ERROR_KEY, format!("{error:#}"));
        }
    }

    fn tick(&self) -> Result<()> {
        self.step_head()?;
        self.step_asynchronous()?;

        // State reflects the queues only on ticks that ran to completion.
        let drained = {
            let queues = self.queues.lock().expect("Queues mutex poisoned");
            queues.awaiting.is_empty() && queues.asynchronous.is_empty()
        };
        self.module.set(STATE_KEY, if drained { "finished" } else { "not-finished" });
        Ok(())
    }

    /// Inspect the head of the awaiting queue. Blank and comment lines are
    /// consumed without running; an async line moves to the asynchronous
    /// lane (it will already run in this tick's pass); a blocking line runs
    /// and leaves the head only once it reports finished.
    fn step_head(&self) -> Result<()> {
        let block = {
            let mut queues = self.queues.lock().expect("Queues mutex poisoned");
            let head = queues.awaiting.front().cloned();
            match head {
                None => None,
                Some(line) if line.is_empty() || line.starts_with(COMMENT_MARKER) => {
                    queues.awaiting.pop_front();
                    None
                }
                Some(line) if line.starts_with(ASYNC_MARKER) => {
                    queues.awaiting.pop_front();
                    queues.asynchronous.push(line);
                    None
                }
                Some(line) => Some(line),
            }
        };

        let Some(line) = block else {
            return Ok(());
        };

        self.module.set(CURRENT_BLOCK_KEY, line.clone());
        let outcome = self.perform(&line)?;
        if outcome.is_finished() {
            let mut queues = self.queues.lock().expect("Queues mutex poisoned");
            // The call may have reloaded the script; only move the line if
            // it is still the head.
            if queues.awaiting.front() == Some(&line) {
                queues.awaiting.pop_front();
                queues.finished.push(line);
            }
        }
        Ok(())
    }

    /// Run every line admitted to the asynchronous lane by the start of
    /// this pass, against a snapshot so completions cannot shift entries
    /// out from under the iteration. Completions collected before a
    /// failure are still applied.
    fn step_asynchronous(&self) -> Result<()> {
        let snapshot = {
            let queues = self.queues.lock().expect("Queues mutex poisoned");
            queues.asynchronous.clone()
        };
        if snapshot.is_empty() {
            return Ok(());
        }

        let mut completed: Vec<String> = Vec::new();
        let mut failure = None;
        for line in &snapshot {
            match self.perform(line) {
                Ok(outcome) if outcome.is_finished() => completed.push(line.clone()),
                Ok(_) => {}
                Err(error) => {
                    failure = Some(error);
                    break;
                }
            }
        }

        let remaining = {
            let mut queues = self.queues.lock().expect("Queues mutex poisoned");
            for line in &completed {
                // Skip entries a reload removed in the meantime.
                if let Some(position) = queues.asynchronous.iter().position(|entry| entry == line)
                {
                    queues.asynchronous.remove(position);
                    queues.finished.push(line.clone());
                }
            }
            queues.asynchronous.join(LIST_SEPARATOR)
        };

        if let Some(error) = failure {
            return Err(error);
        }
        self.module.set(CURRENT_ASYNC_KEY, remaining);
        Ok(())
    }

    /// Strip the type token and run the rest of the line against the tree.
    ///
    /// An unresolved module id *finishes* the line with `Module not found`;
    /// the script moves on. An unknown function or a failing body is a
    /// script error. The wire handler answers not-finished for the same
    /// module miss; the two call sites deliberately disagree.
    fn perform(&self, line: &str) -> Result<Outcome> {
        let (_, call) = line
            .split_once(' ')
            .context("malformed script line: missing call after type token")?;
        match dispatch_line(&self.root, call) {
            CallOutcome::Finished(payload) => Ok(Outcome::finished(payload)),
            CallOutcome::Pending(payload) => Ok(Outcome::pending(payload)),
            CallOutcome::ModuleNotFound => Ok(Outcome::finished("Module not found")),
            CallOutcome::FunctionNotFound { module, function } => {
                bail!("no function \"{function}\" on module \"{module}\"")
            }
            CallOutcome::Failed(description) => bail!(description),
        }
    }

    /// Snapshot of the awaiting queue, head first.
    pub fn awaiting(&self) -> Vec<String> {
        let queues = self.queues.lock().expect("Queues mutex poisoned");
        queues.awaiting.iter().cloned().collect()
    }

    /// Snapshot of the asynchronous lane, admission order.
    pub fn asynchronous(&self) -> Vec<String> {
        let queues = self.queues.lock().expect("Queues mutex poisoned");
        queues.asynchronous.clone()
    }

    /// Snapshot of the finished queue, completion order.
    pub fn finished(&self) -> Vec<String> {
        let queues = self.queues.lock().expect("Queues mutex poisoned");
        queues.finished.clone()
    }
}
