//! Variable views over the parked VM.
//!
//! Nothing is cached from the VM itself: every request walks the live
//! frames again. The only state here is the reference registry, which maps
//! the opaque integers handed to the client back onto scope/path positions.
//! Ids are never reused within an attachment, so a reference that survived
//! a resume dereferences to nothing instead of aliasing a fresh one.

use crate::debugger::error::Error;
use crate::vm::{Value, VmInspect};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Locals,
    Upvalues,
}

impl ScopeKind {
    pub fn title(self) -> &'static str {
        match self {
            ScopeKind::Locals => "Locals",
            ScopeKind::Upvalues => "Upvalues",
        }
    }

    fn list(self, vm: &mut dyn VmInspect, frame: u32) -> Vec<(String, Value)> {
        match self {
            ScopeKind::Locals => vm.locals(frame),
            ScopeKind::Upvalues => vm.upvalues(frame),
        }
    }
}

/// What a handed-out reference points at.
#[derive(Debug, Clone)]
enum Slot {
    Scope {
        frame: u32,
        kind: ScopeKind,
    },
    /// A table reached from a scope root through `path` keys; `path[0]` is
    /// the root variable name.
    Node {
        frame: u32,
        kind: ScopeKind,
        path: Vec<String>,
    },
}

/// A child entry ready for the wire.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub value: String,
    pub type_name: &'static str,
    /// Non-zero when the client may expand this entry further.
    pub reference: i64,
}

#[derive(Default)]
pub struct StackModel {
    next_ref: i64,
    slots: HashMap<i64, Slot>,
    sources: HashMap<i64, String>,
}

impl StackModel {
    pub fn new() -> StackModel {
        StackModel {
            next_ref: 1,
            slots: HashMap::new(),
            sources: HashMap::new(),
        }
    }

    /// Invalidate everything handed out during the current stop. Called on
    /// every resume; `next_ref` keeps counting so stale ids stay dead.
    pub fn invalidate(&mut self) {
        self.slots.clear();
        self.sources.clear();
    }

    /// Full reset for `close()`: observable numbering restarts as after a
    /// fresh attach.
    pub fn reset(&mut self) {
        self.invalidate();
        self.next_ref = 1;
    }

    fn mint(&mut self, slot: Slot) -> i64 {
        let id = self.next_ref;
        self.next_ref += 1;
        self.slots.insert(id, slot);
        id
    }

    pub fn scope_ref(&mut self, frame: u32, kind: ScopeKind) -> i64 {
        self.mint(Slot::Scope { frame, kind })
    }

    /// Reference for an in-memory chunk listed in a stack trace.
    pub fn source_ref(&mut self, source_id: &str) -> i64 {
        let id = self.next_ref;
        self.next_ref += 1;
        self.sources.insert(id, source_id.to_string());
        id
    }

    pub fn source_id(&self, reference: i64) -> Result<&str, Error> {
        self.sources
            .get(&reference)
            .map(String::as_str)
            .ok_or(Error::InvalidReference(reference))
    }

    /// Children of a reference, minting references for expandable entries.
    pub fn variables(
        &mut self,
        vm: &mut dyn VmInspect,
        reference: i64,
    ) -> Result<Vec<Variable>, Error> {
        let slot = self
            .slots
            .get(&reference)
            .cloned()
            .ok_or(Error::InvalidReference(reference))?;

        match slot {
            Slot::Scope { frame, kind } => {
                let entries = kind.list(vm, frame);
                Ok(entries
                    .into_iter()
                    .map(|(name, value)| self.child(frame, kind, vec![name.clone()], name, value))
                    .collect())
            }
            Slot::Node { frame, kind, path } => {
                let value = self.resolve(vm, frame, kind, &path, reference)?;
                let Value::Table(pairs) = value else {
                    return Ok(Vec::new());
                };
                Ok(pairs
                    .into_iter()
                    .map(|(key, value)| {
                        let mut child_path = path.clone();
                        child_path.push(key.clone());
                        self.child(frame, kind, child_path, key, value)
                    })
                    .collect())
            }
        }
    }

    /// Write through a scope-level reference and echo the stored value.
    /// Members of expanded tables are read-only views.
    pub fn set_variable(
        &mut self,
        vm: &mut dyn VmInspect,
        reference: i64,
        name: &str,
        value: &str,
    ) -> Result<Variable, Error> {
        let slot = self
            .slots
            .get(&reference)
            .cloned()
            .ok_or(Error::InvalidReference(reference))?;

        match slot {
            Slot::Scope { frame, kind } => {
                let written = match kind {
                    ScopeKind::Locals => vm.set_local(frame, name, value),
                    ScopeKind::Upvalues => vm.set_upvalue(frame, name, value),
                }
                .map_err(Error::SetVariable)?;
                Ok(self.child(frame, kind, vec![name.to_string()], name.to_string(), written))
            }
            Slot::Node { .. } => Err(Error::SetVariable(format!(
                "`{name}` is a table member and cannot be modified"
            ))),
        }
    }

    fn child(
        &mut self,
        frame: u32,
        kind: ScopeKind,
        path: Vec<String>,
        name: String,
        value: Value,
    ) -> Variable {
        let reference = if value.expandable() {
            self.mint(Slot::Node { frame, kind, path })
        } else {
            0
        };
        Variable {
            name,
            value: value.render(),
            type_name: value.type_name(),
            reference,
        }
    }

    fn resolve(
        &self,
        vm: &mut dyn VmInspect,
        frame: u32,
        kind: ScopeKind,
        path: &[String],
        reference: i64,
    ) -> Result<Value, Error> {
        let (root, rest) = path.split_first().ok_or(Error::InvalidReference(reference))?;

        let mut current = kind
            .list(vm, frame)
            .into_iter()
            .find_map(|(name, value)| (name == *root).then_some(value))
            .ok_or(Error::InvalidReference(reference))?;

        for key in rest {
            let Value::Table(pairs) = current else {
                return Err(Error::InvalidReference(reference));
            };
            current = pairs
                .into_iter()
                .find_map(|(name, value)| (name == *key).then_some(value))
                .ok_or(Error::InvalidReference(reference))?;
        }
        Ok(current)
    }
}
