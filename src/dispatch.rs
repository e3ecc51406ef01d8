//! The dispatch cycle shared by the connection handler and the script
//! runtime: parse a call line, resolve the target module from a root,
//! invoke the function, report a [`CallOutcome`].
//!
//! Both front ends funnel through [`dispatch_line`] so there is exactly one
//! resolution algorithm, but each keeps its own policy for the non-success
//! variants. Notably, an unresolved module id ends a script line as if it
//! had finished, while on the wire it answers `false:Module not found`; the
//! two behaviors are long-observed protocol surface and are deliberately
//! not unified here.

use crate::function::CallOutcome;
use crate::module::Module;
use crate::protocol::split_call;

/// Run one call line against the tree under `root`.
///
/// A line that does not parse maps to [`CallOutcome::Failed`] with the
/// parse failure's description, the same lane a failing function body
/// takes; the caller cannot tell them apart, and does not need to.
pub fn dispatch_line(root: &Module, line: &str) -> CallOutcome {
    let call = match split_call(line) {
        Ok(call) => call,
        Err(error) => return CallOutcome::Failed(format!("{error:#}")),
    };
    let Some(module) = root.resolve(call.module) else {
        return CallOutcome::ModuleNotFound;
    };
    module.dispatch(call.function, call.parameter)
}
