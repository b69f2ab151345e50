//! The VM hook: breakpoint/step decisions on every line event, and the
//! loop that parks the VM at a stop.

use crate::dap::protocol::Request;
use crate::debugger::Debugger;
use crate::debugger::command::{Route, route};
use crate::debugger::error::Error;
use crate::debugger::state::{State, StepMode};
use crate::vm::{HookKind, VmActivation};
use serde_json::json;
use std::time::Duration;

/// Idle sleep while parked. Bounds CPU, not the stop: the VM stays parked
/// until an explicit resume.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(10);

impl Debugger {
    /// Entry point for every VM hook event. Lies on the VM's critical
    /// execution path: CALL/RET only maintain the depth counter, and a
    /// line event without breakpoints or a pending step returns without
    /// touching the VM's frame info.
    pub fn hook(&mut self, vm: &mut dyn VmActivation, event: HookKind) {
        match event {
            HookKind::Call => self.stack_level += 1,
            HookKind::Return => self.stack_level -= 1,
            HookKind::Line { line } => self.on_line(vm, line),
        }
    }

    fn on_line(&mut self, vm: &mut dyn VmActivation, line: u32) {
        let bp = match self.state {
            State::Birth | State::Initialized | State::Terminated => return,
            State::Running => {
                let hit = self.breakpoint_hit(vm, line);
                if !hit && !self.pause_pending {
                    return;
                }
                hit
            }
            State::Stepping => match self.step {
                // A pending step-in stops on any line event.
                StepMode::In => false,
                // A pause requested while the step is in flight stops here
                // too, even short of the anchor.
                StepMode::Over | StepMode::Out => {
                    let hit = self.breakpoint_hit(vm, line);
                    if !hit && !self.pause_pending && !self.step_completed(vm) {
                        return;
                    }
                    hit
                }
            },
        };

        let reason = if bp {
            "breakpoint"
        } else if self.pause_pending {
            "pause"
        } else {
            "step"
        };
        self.pause_pending = false;
        self.state = State::Stepping;

        log::debug!(target: "debugger", "stopped ({reason}) at line {line}, depth {}", self.stack_level);
        let event_result = self.chan().event(
            "stopped",
            Some(json!({
                "reason": reason,
                "threadId": 1,
                "allThreadsStopped": true,
            })),
        );
        if let Err(err) = event_result {
            log::warn!(target: "debugger", "stopped event failed: {err:#}");
            self.state = State::Terminated;
            return;
        }

        self.stop_loop(vm);
    }

    fn breakpoint_hit(&self, vm: &dyn VmActivation, line: u32) -> bool {
        if self.breakpoints.is_empty() {
            return false;
        }
        let Some(frame) = vm.frame(0) else {
            return false;
        };
        self.breakpoints
            .contains(&self.sourcemap.key_for_vm(&frame.source), line)
    }

    /// Step predicate for `over`/`out`; `in` stops on any line event.
    fn step_completed(&self, vm: &dyn VmActivation) -> bool {
        match self.anchor {
            Some(anchor) => anchor.matches(self.step, vm.handle(), self.stack_level),
            // No anchor means the stop was never resumed with a step
            // request; treat the event as a completed step-in.
            None => true,
        }
    }

    /// Park the VM until a resume-class command arrives.
    fn stop_loop(&mut self, vm: &mut dyn VmActivation) {
        self.policy.on_stop();

        let mut quit = false;
        while !quit {
            self.policy.update_stop();

            let poll_result = self.chan().poll();
            if let Err(err) = poll_result {
                log::warn!(target: "debugger", "transport failed while parked: {err:#}");
                self.state = State::Terminated;
                break;
            }

            let Some(msg) = self.chan().input() else {
                std::thread::sleep(STOP_POLL_INTERVAL);
                continue;
            };
            if msg.get("type").and_then(serde_json::Value::as_str) != Some("request") {
                continue;
            }
            let req = match Request::from_value(msg) {
                Ok(req) => req,
                Err(err) => {
                    log::warn!(target: "debugger", "request dropped: {err}");
                    continue;
                }
            };

            let dispatched = match route(&req.command) {
                Route::Main(cmd) => self.dispatch_main(&req, cmd),
                Route::Hook(cmd) => self.dispatch_hook(vm, &req, cmd),
                Route::Unknown => self
                    .chan()
                    .respond_error(&req, Error::NotImplemented(req.command.clone()).to_string())
                    .map(|()| false),
            };

            match dispatched {
                Ok(resume) => quit = resume,
                Err(err) => {
                    log::warn!(target: "debugger", "transport failed while parked: {err:#}");
                    self.state = State::Terminated;
                    quit = true;
                }
            }
        }

        // References handed out during this stop die with it.
        self.stack.invalidate();
        log::debug!(target: "debugger", "resuming VM <{}>", self.state);
    }
}
