//! Request handlers for both dispatch tables.
//!
//! Handlers never abort the session on their own errors: anything
//! non-fatal becomes an error response correlated to the request, and only
//! transport failures propagate to the caller.

use crate::dap::protocol::Request;
use crate::debugger::Debugger;
use crate::debugger::command::{HookCommand, MainCommand};
use crate::debugger::error::Error;
use crate::debugger::sourcemap::{self, SourceMap};
use crate::debugger::stack::ScopeKind;
use crate::debugger::state::{State, StepAnchor, StepMode};
use crate::vm::{EvalContext, VmActivation};
use itertools::Itertools;
use serde_json::{Value, json};

impl Debugger {
    /// Returns true when the handler quits an enclosing stop loop.
    pub(super) fn dispatch_main(
        &mut self,
        req: &Request,
        cmd: MainCommand,
    ) -> Result<bool, Error> {
        log::debug!(target: "debugger", "{} <{}>", req.command, self.state);
        match cmd {
            MainCommand::Initialize => self.request_initialize(req).map(|_| false),
            MainCommand::Launch => self.request_launch(req).map(|_| false),
            MainCommand::Attach => self.request_attach(req).map(|_| false),
            MainCommand::Disconnect => self.request_disconnect(req).map(|_| true),
            MainCommand::SetBreakpoints => self.request_set_breakpoints(req).map(|_| false),
            MainCommand::ConfigurationDone => self.request_configuration_done(req).map(|_| false),
            MainCommand::Pause => self.request_pause(req).map(|_| false),
        }
    }

    pub(super) fn dispatch_hook(
        &mut self,
        vm: &mut dyn VmActivation,
        req: &Request,
        cmd: HookCommand,
    ) -> Result<bool, Error> {
        log::debug!(target: "debugger", "{} <{}>", req.command, self.state);
        let result = match cmd {
            HookCommand::Continue => self.request_continue(vm, req),
            HookCommand::Next => self.request_step(vm, req, StepMode::Over),
            HookCommand::StepIn => self.request_step(vm, req, StepMode::In),
            HookCommand::StepOut => self.request_step(vm, req, StepMode::Out),
            HookCommand::StackTrace => self.request_stack_trace(vm, req),
            HookCommand::Scopes => self.request_scopes(vm, req),
            HookCommand::Variables => self.request_variables(vm, req),
            HookCommand::SetVariable => self.request_set_variable(vm, req),
            HookCommand::Source => self.request_source(vm, req),
            HookCommand::Threads => self.request_threads(req),
            HookCommand::Evaluate => self.request_evaluate(vm, req),
        };
        result.map(|_| cmd.resumes())
    }

    /// Send a success response, or convert a handler error into an error
    /// response. Only transport failures bubble up.
    fn reply(&mut self, req: &Request, result: Result<Option<Value>, Error>) -> Result<(), Error> {
        match result {
            Ok(body) => self.chan().respond(req, body),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                log::debug!(target: "debugger", "{}: {err}", req.command);
                self.chan().respond_error(req, err.to_string())
            }
        }
    }

    fn expect_state(&self, req: &Request, expected: State) -> Result<(), Error> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::IllegalState {
                command: req.command.clone(),
                state: self.state,
            })
        }
    }

    /// Commands that make sense any time after `initialize`.
    fn expect_session(&self, req: &Request) -> Result<(), Error> {
        match self.state {
            State::Initialized | State::Running | State::Stepping => Ok(()),
            State::Birth | State::Terminated => Err(Error::IllegalState {
                command: req.command.clone(),
                state: self.state,
            }),
        }
    }

    // ---------------------------------- main set ---------------------------------------------

    fn request_initialize(&mut self, req: &Request) -> Result<(), Error> {
        let result = self.expect_state(req, State::Birth).map(|()| {
            Some(json!({
                "supportsConfigurationDoneRequest": true,
                "supportsSetVariable": true,
                "supportsConditionalBreakpoints": false,
                "supportsEvaluateForHovers": !self.norepl,
                "supportsDelayedStackTraceLoading": false,
            }))
        });
        let ok = result.is_ok();
        self.reply(req, result)?;
        if ok {
            self.chan().event("initialized", None)?;
            self.state = State::Initialized;
        }
        Ok(())
    }

    fn request_launch(&mut self, req: &Request) -> Result<(), Error> {
        let result = self.expect_state(req, State::Initialized).map(|()| {
            self.workingdir = req
                .arguments
                .get("workingDir")
                .or_else(|| req.arguments.get("cwd"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            self.sourcemap = SourceMap::from_launch_args(&req.arguments);
            self.sourcemap.set_workingdir(&self.workingdir);
            if req.arguments.get("stopOnEntry").and_then(Value::as_bool) == Some(true) {
                self.pause_pending = true;
            }
            None
        });
        self.reply(req, result)
    }

    fn request_attach(&mut self, req: &Request) -> Result<(), Error> {
        let result = self.expect_state(req, State::Initialized).map(|()| {
            self.sourcemap = SourceMap::from_launch_args(&req.arguments);
            None
        });
        self.reply(req, result)
    }

    /// Accepted in every state.
    fn request_disconnect(&mut self, req: &Request) -> Result<(), Error> {
        self.reply(req, Ok(None))?;
        self.chan()
            .event("thread", Some(json!({"reason": "exited", "threadId": 1})))?;
        self.chan().event("terminated", None)?;
        self.anchor = None;
        self.pause_pending = false;
        self.stack.invalidate();
        self.state = State::Terminated;
        log::info!(target: "debugger", "session terminated by client");
        Ok(())
    }

    fn request_set_breakpoints(&mut self, req: &Request) -> Result<(), Error> {
        let result = self.expect_session(req).and_then(|()| {
            let path = req
                .arguments
                .get("source")
                .and_then(|source| source.get("path"))
                .and_then(Value::as_str)
                .ok_or(Error::MissingArgument("source.path"))?;

            let lines = requested_lines(&req.arguments);
            let key = self.sourcemap.key_for_client(path);
            log::debug!(
                target: "debugger",
                "breakpoints for {key}: {lines:?}",
            );
            self.breakpoints.set(key, lines.iter().copied());

            let verified = lines
                .iter()
                .map(|line| json!({"verified": true, "line": line}))
                .collect_vec();
            Ok(Some(json!({ "breakpoints": verified })))
        });
        self.reply(req, result)
    }

    fn request_configuration_done(&mut self, req: &Request) -> Result<(), Error> {
        let result = self.expect_state(req, State::Initialized);
        let ok = result.is_ok();
        self.reply(req, result.map(|()| None))?;
        if ok {
            self.state = State::Running;
            self.chan()
                .event("thread", Some(json!({"reason": "started", "threadId": 1})))?;
        }
        Ok(())
    }

    /// Marks a pending pause; the next line event stops. State changes at
    /// the stop itself, not here.
    fn request_pause(&mut self, req: &Request) -> Result<(), Error> {
        let result = self.expect_session(req).map(|()| {
            self.pause_pending = true;
            None
        });
        self.reply(req, result)
    }

    // ---------------------------------- hook set ---------------------------------------------

    fn request_continue(
        &mut self,
        _vm: &mut dyn VmActivation,
        req: &Request,
    ) -> Result<(), Error> {
        self.state = State::Running;
        self.anchor = None;
        self.reply(req, Ok(Some(json!({"allThreadsContinued": true}))))
    }

    fn request_step(
        &mut self,
        vm: &mut dyn VmActivation,
        req: &Request,
        mode: StepMode,
    ) -> Result<(), Error> {
        self.step = mode;
        self.anchor = Some(StepAnchor {
            vm: vm.handle(),
            level: self.stack_level,
        });
        self.reply(req, Ok(None))
    }

    fn request_stack_trace(
        &mut self,
        vm: &mut dyn VmActivation,
        req: &Request,
    ) -> Result<(), Error> {
        let total = vm.frame_count();
        let start = req
            .arguments
            .get("startFrame")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32;
        let levels = req
            .arguments
            .get("levels")
            .and_then(Value::as_u64)
            .filter(|&levels| levels > 0)
            .unwrap_or(u64::from(total)) as u32;

        let frames = (start..total.min(start.saturating_add(levels)))
            .filter_map(|index| vm.frame(index).map(|frame| (index, frame)))
            .map(|(index, frame)| {
                json!({
                    "id": index,
                    "name": frame.name.unwrap_or_else(|| "?".to_string()),
                    "line": frame.line,
                    "column": 0,
                    "source": self.frame_source(&frame.source),
                })
            })
            .collect_vec();

        self.reply(
            req,
            Ok(Some(json!({
                "stackFrames": frames,
                "totalFrames": total,
            }))),
        )
    }

    /// File chunks are referenced by client path; in-memory chunks get a
    /// sourceReference the client exchanges through `source`.
    fn frame_source(&mut self, vm_source: &str) -> Value {
        if sourcemap::is_file_chunk(vm_source) {
            let path = self.sourcemap.client_path(vm_source);
            let name = path.rsplit('/').next().unwrap_or(&path).to_string();
            json!({"name": name, "path": path})
        } else {
            let id = self.sourcemap.key_for_vm(vm_source);
            json!({"name": vm_source, "sourceReference": self.stack.source_ref(&id)})
        }
    }

    fn request_scopes(&mut self, vm: &mut dyn VmActivation, req: &Request) -> Result<(), Error> {
        let result = frame_id(req).and_then(|frame| {
            if frame >= vm.frame_count() {
                return Err(Error::FrameNotFound(frame));
            }
            let scopes = [ScopeKind::Locals, ScopeKind::Upvalues]
                .into_iter()
                .map(|kind| {
                    json!({
                        "name": kind.title(),
                        "variablesReference": self.stack.scope_ref(frame, kind),
                        "expensive": false,
                    })
                })
                .collect_vec();
            Ok(Some(json!({ "scopes": scopes })))
        });
        self.reply(req, result)
    }

    fn request_variables(&mut self, vm: &mut dyn VmActivation, req: &Request) -> Result<(), Error> {
        let result = variables_reference(req).and_then(|reference| {
            let variables = self
                .stack
                .variables(vm, reference)?
                .into_iter()
                .map(|var| {
                    json!({
                        "name": var.name,
                        "value": var.value,
                        "type": var.type_name,
                        "variablesReference": var.reference,
                    })
                })
                .collect_vec();
            Ok(Some(json!({ "variables": variables })))
        });
        self.reply(req, result)
    }

    fn request_set_variable(
        &mut self,
        vm: &mut dyn VmActivation,
        req: &Request,
    ) -> Result<(), Error> {
        let result = variables_reference(req).and_then(|reference| {
            let name = req
                .arguments
                .get("name")
                .and_then(Value::as_str)
                .ok_or(Error::MissingArgument("name"))?;
            let value = req
                .arguments
                .get("value")
                .and_then(Value::as_str)
                .ok_or(Error::MissingArgument("value"))?;

            let written = self.stack.set_variable(vm, reference, name, value)?;
            Ok(Some(json!({
                "value": written.value,
                "type": written.type_name,
                "variablesReference": written.reference,
            })))
        });
        self.reply(req, result)
    }

    fn request_source(&mut self, vm: &mut dyn VmActivation, req: &Request) -> Result<(), Error> {
        let result = source_reference(req).and_then(|reference| {
            let id = self.stack.source_id(reference)?.to_string();
            let content = vm
                .chunk_source(&id)
                .ok_or_else(|| Error::SourceUnavailable(id))?;
            Ok(Some(json!({ "content": content })))
        });
        self.reply(req, result)
    }

    fn request_threads(&mut self, req: &Request) -> Result<(), Error> {
        self.reply(
            req,
            Ok(Some(json!({"threads": [{"id": 1, "name": "main"}]}))),
        )
    }

    fn request_evaluate(&mut self, vm: &mut dyn VmActivation, req: &Request) -> Result<(), Error> {
        let result = (|| {
            let expression = req
                .arguments
                .get("expression")
                .and_then(Value::as_str)
                .ok_or(Error::MissingArgument("expression"))?;
            let frame = req
                .arguments
                .get("frameId")
                .and_then(Value::as_u64)
                .unwrap_or(0) as u32;
            let context =
                EvalContext::from_dap(req.arguments.get("context").and_then(Value::as_str));

            if self.norepl && context == EvalContext::Repl {
                return Err(Error::Evaluation("REPL evaluation is disabled".to_string()));
            }

            let value = vm
                .evaluate(frame, expression, context)
                .map_err(Error::Evaluation)?;
            Ok(Some(json!({
                "result": value.render(),
                "type": value.type_name(),
                "variablesReference": 0,
            })))
        })();
        self.reply(req, result)
    }
}

fn requested_lines(arguments: &Value) -> Vec<u32> {
    if let Some(breakpoints) = arguments.get("breakpoints").and_then(Value::as_array) {
        breakpoints
            .iter()
            .filter_map(|bp| bp.get("line").and_then(Value::as_u64))
            .map(|line| line as u32)
            .collect()
    } else if let Some(lines) = arguments.get("lines").and_then(Value::as_array) {
        lines
            .iter()
            .filter_map(Value::as_u64)
            .map(|line| line as u32)
            .collect()
    } else {
        Vec::new()
    }
}

fn frame_id(req: &Request) -> Result<u32, Error> {
    req.arguments
        .get("frameId")
        .and_then(Value::as_u64)
        .map(|id| id as u32)
        .ok_or(Error::MissingArgument("frameId"))
}

fn variables_reference(req: &Request) -> Result<i64, Error> {
    req.arguments
        .get("variablesReference")
        .and_then(Value::as_i64)
        .ok_or(Error::MissingArgument("variablesReference"))
}

fn source_reference(req: &Request) -> Result<i64, Error> {
    req.arguments
        .get("sourceReference")
        .or_else(|| {
            req.arguments
                .get("source")
                .and_then(|source| source.get("sourceReference"))
        })
        .and_then(Value::as_i64)
        .ok_or(Error::MissingArgument("sourceReference"))
}
