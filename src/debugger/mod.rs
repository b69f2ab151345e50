//! The debugger core: lifecycle state machine, request dispatch and the
//! VM hook.
//!
//! One `Debugger` serves one VM attachment. The VM thread owns all mutation
//! while it is inside [`Debugger::hook`]; the host drives
//! [`Debugger::update`] on the same thread between top-level VM
//! invocations. The transport is shared between those two call sites and is
//! therefore kept behind a mutex.

pub mod breakpoint;
pub mod command;
pub mod error;
pub mod sourcemap;
pub mod stack;
pub mod state;

mod channel;
mod hook;
mod requests;

use crate::dap::protocol::Request;
use crate::dap::transport::{TcpTransport, Transport};
use crate::debugger::breakpoint::BreakpointSet;
use crate::debugger::channel::Channel;
use crate::debugger::command::{Route, route};
use crate::debugger::error::Error;
use crate::debugger::sourcemap::SourceMap;
use crate::debugger::stack::StackModel;
use crate::debugger::state::{State, StepAnchor, StepMode};
use crate::vm::HostAdapter;
use serde_json::json;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Embedder housekeeping invoked while the VM is parked.
///
/// The default policy does nothing; a host that must keep painting or
/// pumping its own event loop during a stop installs its own via
/// [`Debugger::set_custom`].
pub trait StopPolicy: Send {
    /// Called once when a stop begins, before the request loop.
    fn on_stop(&mut self) {}

    /// Called on every iteration of the stop loop.
    fn update_stop(&mut self) {}
}

/// No-op policy used unless the host overrides it.
struct DefaultPolicy;

impl StopPolicy for DefaultPolicy {}

/// Category of an [`Debugger::output`] event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputCategory {
    Stdout,
    Stderr,
    Console,
}

impl OutputCategory {
    fn as_str(self) -> &'static str {
        match self {
            OutputCategory::Stdout => "stdout",
            OutputCategory::Stderr => "stderr",
            OutputCategory::Console => "console",
        }
    }
}

/// A DAP debugging session attached to one embedded VM.
pub struct Debugger {
    adapter: Box<dyn HostAdapter>,
    channel: Mutex<Channel>,
    state: State,
    step: StepMode,
    anchor: Option<StepAnchor>,
    pause_pending: bool,
    stack_level: i64,
    breakpoints: BreakpointSet,
    sourcemap: SourceMap,
    workingdir: String,
    stack: StackModel,
    policy: Box<dyn StopPolicy>,
    norepl: bool,
    hook_installed: bool,
}

impl Debugger {
    /// Construct a debugger listening for a DAP client on `(ip, port)`.
    pub fn attach(adapter: Box<dyn HostAdapter>, ip: &str, port: u16) -> anyhow::Result<Debugger> {
        let transport = TcpTransport::bind(ip, port)?;
        Ok(Debugger::attach_with_transport(adapter, Box::new(transport)))
    }

    /// Construct against an arbitrary transport (in-process channels,
    /// pipes). Used by hosts with their own framing and by tests.
    pub fn attach_with_transport(
        adapter: Box<dyn HostAdapter>,
        transport: Box<dyn Transport>,
    ) -> Debugger {
        Debugger {
            adapter,
            channel: Mutex::new(Channel::new(transport)),
            state: State::Birth,
            step: StepMode::In,
            anchor: None,
            pause_pending: false,
            stack_level: 0,
            breakpoints: BreakpointSet::default(),
            sourcemap: SourceMap::default(),
            workingdir: String::new(),
            stack: StackModel::new(),
            policy: Box::new(DefaultPolicy),
            norepl: false,
            hook_installed: false,
        }
    }

    /// Install the VM hook with a CALL|LINE|RET mask.
    ///
    /// `stack_level` starts at 0 even when the VM is already several frames
    /// deep; a step-out from the initial frame may then never fire. The
    /// host can avoid this by opening before running any chunk.
    pub fn open(&mut self) -> anyhow::Result<()> {
        self.adapter.install_hook()?;
        self.hook_installed = true;
        self.stack_level = 0;
        log::info!(target: "debugger", "hook installed");
        Ok(())
    }

    /// Uninstall the hook and reset every externally observable piece of
    /// state to what a fresh attach would show.
    pub fn close(&mut self) {
        if self.hook_installed {
            self.adapter.remove_hook();
            self.hook_installed = false;
        }
        self.breakpoints.clear();
        self.stack.reset();
        self.workingdir.clear();
        self.sourcemap = SourceMap::default();
        self.anchor = None;
        self.pause_pending = false;
        self.stack_level = 0;
        self.state = State::Birth;
        self.chan().reset_seq();
        log::info!(target: "debugger", "closed");
    }

    /// Drive non-hook state transitions. Must be called periodically while
    /// the VM is not executing.
    pub fn update(&mut self) {
        if let Err(err) = self.pump_main() {
            log::warn!(target: "debugger", "transport failed: {err:#}");
            self.state = State::Terminated;
        }
    }

    /// Forward a JSON schema to the transport for request validation.
    pub fn set_schema(&mut self, path: &Path) -> Result<(), Error> {
        self.chan().set_schema(path)
    }

    /// Replace the stop-loop housekeeping policy.
    pub fn set_custom(&mut self, policy: Box<dyn StopPolicy>) {
        self.policy = policy;
    }

    /// Forward debuggee output to the client. Binary-safe: `buffer` may
    /// contain zero bytes and need not be valid UTF-8.
    pub fn output(&mut self, category: OutputCategory, buffer: &[u8]) {
        let body = json!({
            "category": category.as_str(),
            "output": String::from_utf8_lossy(buffer),
        });
        if let Err(err) = self.chan().event("output", Some(body)) {
            log::warn!(target: "debugger", "output event dropped: {err}");
        }
    }

    /// Advertise absence of REPL evaluation in the `initialize` reply and
    /// refuse `evaluate` requests with a `repl` context.
    pub fn norepl_initialize(&mut self, norepl: bool) {
        self.norepl = norepl;
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// CALL events minus RET events observed since attach.
    pub fn stack_level(&self) -> i64 {
        self.stack_level
    }

    fn chan(&self) -> MutexGuard<'_, Channel> {
        self.channel.lock().unwrap()
    }

    /// One pump of the main command set, outside the hook.
    fn pump_main(&mut self) -> Result<(), Error> {
        match self.state {
            // Recycle so a new session can attach on the same channel.
            State::Terminated => {
                log::info!(target: "debugger", "session recycled");
                self.anchor = None;
                self.pause_pending = false;
                self.state = State::Birth;
                return Ok(());
            }
            // `Stepping` here means the VM is running toward a step
            // anchor: while parked the stop loop owns the transport and
            // the host is not ticking. Main commands (pause, disconnect,
            // setBreakpoints) stay serviceable in that window.
            State::Birth | State::Initialized | State::Running | State::Stepping => {}
        }

        self.chan().poll()?;
        let Some(msg) = self.chan().input() else {
            return Ok(());
        };
        if msg.get("type").and_then(serde_json::Value::as_str) != Some("request") {
            return Ok(());
        }
        let req = match Request::from_value(msg) {
            Ok(req) => req,
            Err(err) => {
                log::warn!(target: "debugger", "request dropped: {err}");
                return Ok(());
            }
        };

        match route(&req.command) {
            Route::Main(cmd) => {
                self.dispatch_main(&req, cmd)?;
            }
            Route::Hook(cmd) => {
                log::debug!(target: "debugger", "{:?} outside a stop", cmd);
                self.chan().respond_error(
                    &req,
                    Error::IllegalState {
                        command: req.command.clone(),
                        state: self.state,
                    }
                    .to_string(),
                )?;
            }
            Route::Unknown => {
                self.chan()
                    .respond_error(&req, Error::NotImplemented(req.command.clone()).to_string())?;
            }
        }
        Ok(())
    }
}

impl Drop for Debugger {
    fn drop(&mut self) {
        if self.hook_installed {
            self.adapter.remove_hook();
        }
    }
}
