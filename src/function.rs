//! Callable capabilities and their results.
//!
//! A [`Function`] is anything a module can expose by name: given an optional
//! parameter string it either completes, reports that it needs more time, or
//! fails. Plain closures implement it via a blanket impl; capabilities that
//! carry state between invocations (a deadline, a stopwatch) implement it on
//! an explicit struct so the state has a home and a lock.
//!
//! [`Outcome`] is what a function body reports. [`CallOutcome`] is the result
//! of a *whole* dispatch cycle (parse, resolve, invoke) and is what the wire
//! handler and the script runtime consume; the extra variants carry the
//! failure modes the body itself never sees.

use anyhow::Result;

/// A named capability registered on a module.
///
/// Implementations must be cheap to call repeatedly with the same parameter:
/// a caller that receives a pending [`Outcome`] is expected to retry the
/// identical call until it finishes.
pub trait Function: Send + Sync {
    /// Invoke the capability. `parameter` is `None` when the call line
    /// carried no parameter text after the function name.
    fn call(&self, parameter: Option<&str>) -> Result<Outcome>;
}

impl<F> Function for F
where
    F: Fn(Option<&str>) -> Result<Outcome> + Send + Sync,
{
    fn call(&self, parameter: Option<&str>) -> Result<Outcome> {
        self(parameter)
    }
}

/// What a function body reports: a completion flag plus a payload string.
///
/// `finished == false` means the call was accepted but is not complete yet;
/// the payload then describes the in-progress state (`"Sleeping"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    finished: bool,
    payload: String,
}

impl Outcome {
    /// A completed call with its final payload.
    pub fn finished(payload: impl Into<String>) -> Self {
        Self { finished: true, payload: payload.into() }
    }

    /// An accepted but incomplete call. The caller should repeat the same
    /// call to make progress.
    pub fn pending(payload: impl Into<String>) -> Self {
        Self { finished: false, payload: payload.into() }
    }

    /// Whether the call completed.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The payload text.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Consume the outcome, keeping only the payload.
    pub fn into_payload(self) -> String {
        self.payload
    }
}

/// Result of one full dispatch cycle against the module tree.
///
/// Every way a call line can end is a variant here; each front end maps the
/// variants to its own wire or scheduling policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    /// The function ran and completed.
    Finished(String),
    /// The function ran and wants to be called again with the same line.
    Pending(String),
    /// No module in the tree answered to the requested id.
    ModuleNotFound,
    /// The module exists but has no function registered under this name.
    FunctionNotFound {
        /// Id of the module that was resolved.
        module: String,
        /// Function name that was not registered on it.
        function: String,
    },
    /// The function body failed; the string is the rendered error chain.
    Failed(String),
}

impl From<Outcome> for CallOutcome {
    fn from(outcome: Outcome) -> Self {
        if outcome.is_finished() {
            CallOutcome::Finished(outcome.into_payload())
        } else {
            CallOutcome::Pending(outcome.into_payload())
        }
    }
}
