//! The command tree.
//!
//! A [`Module`] is one named node in the tree the wire protocol and the
//! script runtime dispatch into. Each node owns an ordered list of adopted
//! children, a registry of named [`Function`]s, and a string key/value store
//! used for telemetry:
//!
//! ```text
//!   robot (Device)
//!   ├── functions: help, log, sleep, timer
//!   ├── variables: {}
//!   └── runtime (ScriptRuntime)
//!       ├── functions: help, log, load
//!       └── variables: {state, error, current_block, current_async}
//! ```
//!
//! `Module` is a cheap-clone handle over shared state; clones refer to the
//! same node. One mutex per node guards its three tables, so mutating one
//! subtree never serializes against unrelated subtrees.
//!
//! # Deadlock Prevention
//!
//! The node lock is never held while user code runs: [`Module::dispatch`]
//! clones the function handle out of the registry and releases the lock
//! before invoking it, and [`Module::resolve`] snapshots the child list
//! before descending. A function is therefore free to call back into its
//! own module (the `help` built-in reads the very tables of the node it is
//! registered on).

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use anyhow::Context;

use crate::function::{CallOutcome, Function, Outcome};

/// Reserved id for a tree root. A module carrying this id answers *every*
/// resolution addressed to it or to any of its descendants with itself; the
/// target id and the children are never consulted. Remote consoles rely on
/// this: anything sent at the master goes to the master.
pub const ROOT_ID: &str = "master";

/// Line terminator used by the `help` built-in. Consoles expect
/// CRLF-terminated listings.
const HELP_SEPARATOR: &str = "\r\n";

/// One named node of the command tree. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Module {
    inner: Arc<Inner>,
}

struct Inner {
    id: String,
    kind: String,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    children: Vec<Module>,
    functions: HashMap<String, Arc<dyn Function>>,
    variables: HashMap<String, String>,
}

/// Non-owning handle used by functions that live on the module they refer
/// to. Registered functions are reachable from the node's own tables, so a
/// strong handle there would keep the node alive through itself.
#[derive(Debug, Clone)]
pub(crate) struct WeakModule {
    inner: Weak<Inner>,
}

impl WeakModule {
    /// Recover a full handle, `None` once the node has been dropped.
    pub(crate) fn upgrade(&self) -> Option<Module> {
        self.inner.upgrade().map(|inner| Module { inner })
    }
}

impl Module {
    /// Create a node with the default kind label `Module`.
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_kind(id, "Module")
    }

    /// Create a node with an explicit kind label. The label only shows up
    /// in `help` output next to the id.
    pub fn with_kind(id: impl Into<String>, kind: impl Into<String>) -> Self {
        let module = Self {
            inner: Arc::new(Inner {
                id: id.into(),
                kind: kind.into(),
                state: Mutex::new(State::default()),
            }),
        };
        module.register_builtins();
        module
    }

    /// The node's id, fixed at construction.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// The node's kind label, fixed at construction.
    pub fn kind(&self) -> &str {
        &self.inner.kind
    }

    /// Whether two handles refer to the same node.
    pub fn same(&self, other: &Module) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn downgrade(&self) -> WeakModule {
        WeakModule { inner: Arc::downgrade(&self.inner) }
    }

    /// Find the node answering to `id`, searching self first, then the
    /// children depth-first in adoption order. Matching ignores ASCII case.
    ///
    /// A node whose own id is [`ROOT_ID`] short-circuits: it returns itself
    /// for any requested id, shadowing its entire subtree.
    pub fn resolve(&self, id: &str) -> Option<Module> {
        if self.inner.id.eq_ignore_ascii_case(id) {
            return Some(self.clone());
        }
        if self.inner.id.eq_ignore_ascii_case(ROOT_ID) {
            return Some(self.clone());
        }
        // Snapshot so no lock is held while descending.
        let children = {
            let state = self.inner.state.lock().expect("Module state mutex poisoned");
            state.children.clone()
        };
        children.iter().find_map(|child| child.resolve(id))
    }

    /// Invoke a function registered on this node (own registry only, never
    /// the children's). The registry lock is released before the function
    /// body runs; a body failure is returned as [`CallOutcome::Failed`]
    /// carrying the rendered error chain.
    pub fn dispatch(&self, function_name: &str, parameter: Option<&str>) -> CallOutcome {
        let function = {
            let state = self.inner.state.lock().expect("Module state mutex poisoned");
            match state.functions.get(function_name) {
                Some(function) => Arc::clone(function),
                None => {
                    return CallOutcome::FunctionNotFound {
                        module: self.inner.id.clone(),
                        function: function_name.to_owned(),
                    }
                }
            }
        };
        match function.call(parameter) {
            Ok(outcome) => outcome.into(),
            Err(error) => CallOutcome::Failed(format!("{error:#}")),
        }
    }

    /// Register a function under `name` if the name is free. Returns whether
    /// the registry changed; an existing registration is never overwritten.
    pub fn register(&self, name: impl Into<String>, function: impl Function + 'static) -> bool {
        let name = name.into();
        let mut state = self.inner.state.lock().expect("Module state mutex poisoned");
        if state.functions.contains_key(&name) {
            return false;
        }
        state.functions.insert(name, Arc::new(function));
        true
    }

    /// Remove the function registered under `name`, if any. Returns whether
    /// the registry changed.
    pub fn unregister(&self, name: &str) -> bool {
        let mut state = self.inner.state.lock().expect("Module state mutex poisoned");
        state.functions.remove(name).is_some()
    }

    /// Adopt `child` if this exact node (pointer identity, not id) is not
    /// already a child. Returns whether the child list changed. Children
    /// keep no handle to their parent, and nothing enforces a single parent.
    pub fn adopt(&self, child: &Module) -> bool {
        let mut state = self.inner.state.lock().expect("Module state mutex poisoned");
        if state.children.iter().any(|existing| existing.same(child)) {
            return false;
        }
        state.children.push(child.clone());
        true
    }

    /// Drop `child` (pointer identity) from the child list. Returns whether
    /// the child list changed.
    pub fn abandon(&self, child: &Module) -> bool {
        let mut state = self.inner.state.lock().expect("Module state mutex poisoned");
        let before = state.children.len();
        state.children.retain(|existing| !existing.same(child));
        state.children.len() != before
    }

    /// Write a telemetry value, overwriting any previous value.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut state = self.inner.state.lock().expect("Module state mutex poisoned");
        state.variables.insert(key.into(), value.into());
    }

    /// Read a telemetry value.
    pub fn get(&self, key: &str) -> Option<String> {
        let state = self.inner.state.lock().expect("Module state mutex poisoned");
        state.variables.get(key).cloned()
    }

    /// Built-ins every node carries: `help` (enumerate this node) and `log`
    /// (write the parameter to the diagnostic log). Both hold only a weak
    /// handle to the node they describe.
    fn register_builtins(&self) {
        let weak = self.downgrade();
        self.register("help", move |_parameter: Option<&str>| {
            let module = weak.upgrade().context("module dropped")?;
            Ok(Outcome::finished(module.render_help()))
        });

        let weak = self.downgrade();
        self.register("log", move |parameter: Option<&str>| {
            let module = weak.upgrade().context("module dropped")?;
            log::info!("[{}] {}", module.id(), parameter.unwrap_or(""));
            Ok(Outcome::finished("Logged"))
        });
    }

    /// The `help` payload: functions (sorted for stable output), then
    /// children as `id(kind)`, every line terminated with `\r\n`.
    fn render_help(&self) -> String {
        let state = self.inner.state.lock().expect("Module state mutex poisoned");
        let mut listing = format!("Showing help for module \"{}\"{HELP_SEPARATOR}", self.inner.id);
        listing.push_str("Available functions:");
        listing.push_str(HELP_SEPARATOR);
        let mut names: Vec<&String> = state.functions.keys().collect();
        names.sort();
        for name in names {
            listing.push_str(name);
            listing.push_str(HELP_SEPARATOR);
        }
        listing.push_str("Adopted children:");
        listing.push_str(HELP_SEPARATOR);
        for child in &state.children {
            listing.push_str(child.id());
            listing.push('(');
            listing.push_str(child.kind());
            listing.push(')');
            listing.push_str(HELP_SEPARATOR);
        }
        listing
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .finish_non_exhaustive()
    }
}
