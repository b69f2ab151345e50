//! Session lifecycle and stepping state.

use crate::vm::VmHandle;
use std::fmt;

/// Lifecycle of a debug session.
///
/// `Stepping` covers both "parked at a stop" and "resumed with a pending
/// step predicate": the VM leaves the state only through `continue` or
/// `disconnect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Birth,
    Initialized,
    Running,
    Stepping,
    Terminated,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Birth => "birth",
            State::Initialized => "initialized",
            State::Running => "running",
            State::Stepping => "stepping",
            State::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Granularity of the pending step. Meaningful only in [`State::Stepping`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMode {
    In,
    Over,
    Out,
}

/// Captured when a step begins; the step predicate decides against it.
///
/// The handle component keeps stepping from crossing a coroutine switch:
/// line events on another handle never satisfy the predicate.
#[derive(Debug, Clone, Copy)]
pub struct StepAnchor {
    pub vm: VmHandle,
    pub level: i64,
}

impl StepAnchor {
    /// True when a line event at `(vm, level)` completes the step.
    pub fn matches(&self, mode: StepMode, vm: VmHandle, level: i64) -> bool {
        match mode {
            StepMode::In => true,
            StepMode::Over => vm == self.vm && level <= self.level,
            StepMode::Out => vm == self.vm && level < self.level,
        }
    }
}
