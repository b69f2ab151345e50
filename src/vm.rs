//! Interfaces between the debugger core and the embedded VM.
//!
//! The host-language binding adapts the VM's native hook ABI to
//! [`HostAdapter`] and exposes the activation record of a parked VM through
//! [`VmActivation`]. The core never touches the VM directly.

/// Opaque identifier of a VM instance.
///
/// Distinguishes coroutines that share a global state; the step predicate
/// compares handles so that stepping never crosses a coroutine switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VmHandle(pub u64);

/// Event kinds delivered by the VM's hook.
///
/// The hook must be installed with a CALL|LINE|RET mask; other event kinds
/// (instruction counts, tail calls) are not forwarded to the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Call,
    Return,
    Line { line: u32 },
}

/// A stack frame as observed at a stop. Computed on demand, never cached.
#[derive(Debug, Clone)]
pub struct FrameView {
    /// Raw VM source id, e.g. `@main.lua` for file chunks.
    pub source: String,
    pub line: u32,
    pub name: Option<String>,
}

/// Snapshot of a Lua-family value for variable views.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    String(String),
    /// Key/value pairs, keys pre-rendered by the binding.
    Table(Vec<(String, Value)>),
    /// Pre-rendered function descriptor, e.g. `function: 0x55aa10`.
    Function(String),
    Thread,
    UserData(String),
}

/// Display cutoff for string values.
const MAX_VALUE_LEN: usize = 200;

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) | Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Table(_) => "table",
            Value::Function(_) => "function",
            Value::Thread => "thread",
            Value::UserData(_) => "userdata",
        }
    }

    /// True when the value has children a client may expand.
    pub fn expandable(&self) -> bool {
        matches!(self, Value::Table(_))
    }

    /// Render for the variables panel.
    pub fn render(&self) -> String {
        match self {
            Value::Nil => "nil".to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{n:.0}")
                } else {
                    n.to_string()
                }
            }
            Value::String(s) => {
                if s.len() > MAX_VALUE_LEN {
                    let cut = s
                        .char_indices()
                        .take_while(|(i, _)| *i < MAX_VALUE_LEN)
                        .last()
                        .map(|(i, c)| i + c.len_utf8())
                        .unwrap_or(0);
                    format!("\"{}...\"", &s[..cut])
                } else {
                    format!("\"{s}\"")
                }
            }
            Value::Table(_) => "{...}".to_string(),
            Value::Function(repr) => repr.clone(),
            Value::Thread => "thread".to_string(),
            Value::UserData(repr) => repr.clone(),
        }
    }
}

/// Context of an `evaluate` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalContext {
    Watch,
    Repl,
    Hover,
}

impl EvalContext {
    pub fn from_dap(context: Option<&str>) -> Self {
        match context {
            Some("repl") => EvalContext::Repl,
            Some("hover") => EvalContext::Hover,
            _ => EvalContext::Watch,
        }
    }
}

/// Frame and variable introspection against a parked VM.
///
/// Frame 0 is the innermost (currently executing) frame. All methods
/// recompute from the live VM; nothing may be cached across a resume.
pub trait VmInspect {
    fn handle(&self) -> VmHandle;

    fn frame_count(&self) -> u32;

    fn frame(&self, index: u32) -> Option<FrameView>;

    fn locals(&mut self, frame: u32) -> Vec<(String, Value)>;

    fn upvalues(&mut self, frame: u32) -> Vec<(String, Value)>;

    /// Write a local slot, returning the value actually stored.
    fn set_local(&mut self, frame: u32, name: &str, value: &str) -> Result<Value, String>;

    /// Write an upvalue, returning the value actually stored.
    fn set_upvalue(&mut self, frame: u32, name: &str, value: &str) -> Result<Value, String>;

    /// Text of an in-memory chunk, for `source` requests on non-file sources.
    fn chunk_source(&self, source_id: &str) -> Option<String>;
}

/// Expression evaluation inside a frame. The sandbox is the host's concern.
pub trait Evaluator {
    fn evaluate(
        &mut self,
        frame: u32,
        expression: &str,
        context: EvalContext,
    ) -> Result<Value, String>;
}

/// Everything the hook needs from the VM it parked.
pub trait VmActivation: VmInspect + Evaluator {}

impl<T: VmInspect + Evaluator> VmActivation for T {}

/// Binding to the VM's hook slot.
///
/// `install_hook` must register a hook with a CALL|LINE|RET mask that
/// forwards every event to [`crate::debugger::Debugger::hook`]; the standard
/// idiom is a free function retrieving the debugger from the VM's
/// extra-space slot. `remove_hook` restores the previous (empty) slot.
pub trait HostAdapter {
    fn install_hook(&mut self) -> anyhow::Result<()>;

    fn remove_hook(&mut self);
}
