//! Shared fixtures: an in-memory transport pair, a scripted VM and a
//! driver thread that replays hook events against the debugger.

use luadap::dap::transport::Transport;
use luadap::debugger::Debugger;
use luadap::debugger::state::State;
use luadap::vm::{EvalContext, Evaluator, FrameView, HookKind, HostAdapter, Value, VmHandle, VmInspect};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Route core logging (`target: "dap"` / `target: "debugger"`) to the
/// test output when `RUST_LOG` is set.
fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .is_test(true)
        .try_init();
}

// ---------------------------------- transport ---------------------------------------------

type Queue = Arc<Mutex<VecDeque<serde_json::Value>>>;

/// Debugger-side endpoint of an in-memory message channel.
pub struct PairTransport {
    inbox: Queue,
    outbox: Queue,
}

impl Transport for PairTransport {
    fn poll(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn input(&mut self) -> Option<serde_json::Value> {
        self.inbox.lock().unwrap().pop_front()
    }

    fn send(&mut self, message: &serde_json::Value) -> anyhow::Result<()> {
        self.outbox.lock().unwrap().push_back(message.clone());
        Ok(())
    }
}

/// IDE-side endpoint.
pub struct TestClient {
    to_debugger: Queue,
    from_debugger: Queue,
    next_seq: i64,
}

impl TestClient {
    pub fn send_raw(&mut self, message: serde_json::Value) {
        self.to_debugger.lock().unwrap().push_back(message);
    }

    /// Send a request, returning the sequence number used.
    pub fn request(&mut self, command: &str, arguments: serde_json::Value) -> i64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.send_raw(json!({
            "seq": seq,
            "type": "request",
            "command": command,
            "arguments": arguments,
        }));
        seq
    }

    pub fn try_recv(&mut self) -> Option<serde_json::Value> {
        self.from_debugger.lock().unwrap().pop_front()
    }

    /// Next message in order; panics on timeout.
    pub fn recv(&mut self) -> serde_json::Value {
        let deadline = Instant::now() + RECV_TIMEOUT;
        loop {
            if let Some(msg) = self.try_recv() {
                return msg;
            }
            if Instant::now() > deadline {
                panic!("timed out waiting for a message");
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    /// Skip ahead to the response for `request_seq`, asserting success.
    pub fn expect_response(&mut self, request_seq: i64) -> serde_json::Value {
        loop {
            let msg = self.recv();
            if msg["type"] == "response" && msg["request_seq"] == request_seq {
                assert_eq!(
                    msg["success"], true,
                    "request {request_seq} failed: {msg}"
                );
                return msg;
            }
        }
    }

    /// Skip ahead to the response for `request_seq`, asserting failure.
    pub fn expect_error_response(&mut self, request_seq: i64) -> serde_json::Value {
        loop {
            let msg = self.recv();
            if msg["type"] == "response" && msg["request_seq"] == request_seq {
                assert_eq!(msg["success"], false, "request {request_seq} unexpectedly succeeded");
                return msg;
            }
        }
    }

    /// Skip ahead to the named event.
    pub fn expect_event(&mut self, event: &str) -> serde_json::Value {
        loop {
            let msg = self.recv();
            if msg["type"] == "event" && msg["event"] == event {
                return msg;
            }
        }
    }

    /// Run the standard handshake up to a running VM.
    pub fn start_session(&mut self, launch_args: serde_json::Value) {
        let seq = self.request("initialize", json!({"adapterID": "luadap"}));
        self.expect_response(seq);
        self.expect_event("initialized");
        let seq = self.request("launch", launch_args);
        self.expect_response(seq);
    }

    pub fn configuration_done(&mut self) {
        let seq = self.request("configurationDone", json!({}));
        self.expect_response(seq);
    }
}

pub fn pair() -> (PairTransport, TestClient) {
    init_logging();
    let to_debugger: Queue = Arc::default();
    let from_debugger: Queue = Arc::default();
    (
        PairTransport {
            inbox: to_debugger.clone(),
            outbox: from_debugger.clone(),
        },
        TestClient {
            to_debugger,
            from_debugger,
            next_seq: 1,
        },
    )
}

// ---------------------------------- host adapter ------------------------------------------

/// Records hook slot acquisition and release.
#[derive(Default)]
pub struct CountingAdapter {
    pub installs: Arc<AtomicUsize>,
    pub removals: Arc<AtomicUsize>,
}

impl HostAdapter for CountingAdapter {
    fn install_hook(&mut self) -> anyhow::Result<()> {
        self.installs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove_hook(&mut self) {
        self.removals.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------- scripted VM -------------------------------------------

pub struct MockFrame {
    pub source: String,
    pub name: String,
    pub line: u32,
    pub locals: Vec<(String, Value)>,
    pub upvalues: Vec<(String, Value)>,
}

/// A fake Lua-family VM: frames are pushed and popped by the script, and
/// introspection reads whatever the script staged.
pub struct MockVm {
    pub handle: VmHandle,
    /// Outermost first; DAP frame 0 maps to the last entry.
    pub frames: Vec<MockFrame>,
    pub chunks: HashMap<String, String>,
}

impl MockVm {
    pub fn new() -> MockVm {
        MockVm {
            handle: VmHandle(1),
            frames: Vec::new(),
            chunks: HashMap::new(),
        }
    }

    fn slot(&self, frame: u32) -> Option<&MockFrame> {
        let len = self.frames.len();
        len.checked_sub(1 + frame as usize).map(|i| &self.frames[i])
    }

    fn slot_mut(&mut self, frame: u32) -> Option<&mut MockFrame> {
        let len = self.frames.len();
        len.checked_sub(1 + frame as usize)
            .map(|i| &mut self.frames[i])
    }
}

/// Literal-ish parsing, standing in for the host's real conversion.
fn parse_value(raw: &str) -> Value {
    if let Ok(int) = raw.parse::<i64>() {
        return Value::Integer(int);
    }
    if let Ok(num) = raw.parse::<f64>() {
        return Value::Number(num);
    }
    match raw {
        "true" => Value::Boolean(true),
        "false" => Value::Boolean(false),
        "nil" => Value::Nil,
        _ => Value::String(raw.trim_matches('"').to_string()),
    }
}

impl VmInspect for MockVm {
    fn handle(&self) -> VmHandle {
        self.handle
    }

    fn frame_count(&self) -> u32 {
        self.frames.len() as u32
    }

    fn frame(&self, index: u32) -> Option<FrameView> {
        self.slot(index).map(|frame| FrameView {
            source: frame.source.clone(),
            line: frame.line,
            name: Some(frame.name.clone()),
        })
    }

    fn locals(&mut self, frame: u32) -> Vec<(String, Value)> {
        self.slot(frame).map(|f| f.locals.clone()).unwrap_or_default()
    }

    fn upvalues(&mut self, frame: u32) -> Vec<(String, Value)> {
        self.slot(frame)
            .map(|f| f.upvalues.clone())
            .unwrap_or_default()
    }

    fn set_local(&mut self, frame: u32, name: &str, value: &str) -> Result<Value, String> {
        let parsed = parse_value(value);
        let slot = self.slot_mut(frame).ok_or("frame out of range")?;
        let local = slot
            .locals
            .iter_mut()
            .find(|(n, _)| n == name)
            .ok_or_else(|| format!("no local `{name}`"))?;
        local.1 = parsed.clone();
        Ok(parsed)
    }

    fn set_upvalue(&mut self, frame: u32, name: &str, value: &str) -> Result<Value, String> {
        let parsed = parse_value(value);
        let slot = self.slot_mut(frame).ok_or("frame out of range")?;
        let upvalue = slot
            .upvalues
            .iter_mut()
            .find(|(n, _)| n == name)
            .ok_or_else(|| format!("no upvalue `{name}`"))?;
        upvalue.1 = parsed.clone();
        Ok(parsed)
    }

    fn chunk_source(&self, source_id: &str) -> Option<String> {
        self.chunks.get(source_id).cloned()
    }
}

impl Evaluator for MockVm {
    fn evaluate(
        &mut self,
        frame: u32,
        expression: &str,
        _context: EvalContext,
    ) -> Result<Value, String> {
        if let Ok(int) = expression.parse::<i64>() {
            return Ok(Value::Integer(int));
        }
        self.slot(frame)
            .and_then(|slot| {
                slot.locals
                    .iter()
                    .chain(slot.upvalues.iter())
                    .find(|(name, _)| name == expression)
                    .map(|(_, value)| value.clone())
            })
            .ok_or_else(|| format!("attempt to evaluate unknown expression `{expression}`"))
    }
}

// ---------------------------------- script driver -----------------------------------------

/// One step of a scripted VM run.
pub enum Step {
    Call {
        source: &'static str,
        name: &'static str,
        locals: Vec<(&'static str, Value)>,
        upvalues: Vec<(&'static str, Value)>,
    },
    Ret,
    Line(u32),
    /// Coroutine switch: subsequent events report this handle.
    SwitchHandle(u64),
    /// Pump `update()` until the debugger reaches `state`.
    TickUntil(State),
}

pub fn call(source: &'static str, name: &'static str) -> Step {
    Step::Call {
        source,
        name,
        locals: Vec::new(),
        upvalues: Vec::new(),
    }
}

pub fn call_with_vars(
    source: &'static str,
    name: &'static str,
    locals: Vec<(&'static str, Value)>,
    upvalues: Vec<(&'static str, Value)>,
) -> Step {
    Step::Call {
        source,
        name,
        locals,
        upvalues,
    }
}

/// Final observable facts the driver thread reports back.
pub struct Summary {
    pub state: State,
    pub stack_level: i64,
}

/// Spawn the VM thread: build a debugger over `transport`, open the hook
/// and replay the script. The returned summary is taken after the last
/// step.
pub fn run_script(
    transport: PairTransport,
    mut vm: MockVm,
    script: Vec<Step>,
) -> JoinHandle<Summary> {
    std::thread::spawn(move || {
        let adapter = CountingAdapter::default();
        let mut dbg = Debugger::attach_with_transport(Box::new(adapter), Box::new(transport));
        dbg.open().unwrap();

        for step in script {
            match step {
                Step::Call {
                    source,
                    name,
                    locals,
                    upvalues,
                } => {
                    vm.frames.push(MockFrame {
                        source: source.to_string(),
                        name: name.to_string(),
                        line: 0,
                        locals: named(locals),
                        upvalues: named(upvalues),
                    });
                    dbg.hook(&mut vm, HookKind::Call);
                }
                Step::Ret => {
                    dbg.hook(&mut vm, HookKind::Return);
                    vm.frames.pop();
                }
                Step::Line(line) => {
                    if let Some(frame) = vm.frames.last_mut() {
                        frame.line = line;
                    }
                    dbg.hook(&mut vm, HookKind::Line { line });
                }
                Step::SwitchHandle(handle) => vm.handle = VmHandle(handle),
                Step::TickUntil(state) => {
                    let deadline = Instant::now() + RECV_TIMEOUT;
                    while dbg.state() != state {
                        dbg.update();
                        if Instant::now() > deadline {
                            panic!("debugger never reached state `{state}`");
                        }
                        std::thread::sleep(Duration::from_millis(2));
                    }
                }
            }
        }

        Summary {
            state: dbg.state(),
            stack_level: dbg.stack_level(),
        }
    })
}

fn named(vars: Vec<(&'static str, Value)>) -> Vec<(String, Value)> {
    vars.into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}
