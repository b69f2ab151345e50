//! Request routing: two disjoint command sets.
//!
//! The command set is closed, so commands are materialized as enums with a
//! total match instead of a string-keyed handler map.

/// Commands serviced by the main pump; accepted while the VM runs free and
/// also inside a stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainCommand {
    Initialize,
    Launch,
    Attach,
    Disconnect,
    SetBreakpoints,
    ConfigurationDone,
    Pause,
}

/// Commands valid only while the VM is parked inside the hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookCommand {
    Continue,
    Next,
    StepIn,
    StepOut,
    StackTrace,
    Scopes,
    Variables,
    SetVariable,
    Source,
    Threads,
    Evaluate,
}

impl HookCommand {
    /// Resume-class commands quit the stop loop and hand control back to
    /// the VM; everything else leaves it parked.
    pub fn resumes(self) -> bool {
        matches!(
            self,
            HookCommand::Continue
                | HookCommand::Next
                | HookCommand::StepIn
                | HookCommand::StepOut
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Main(MainCommand),
    Hook(HookCommand),
    Unknown,
}

pub fn route(command: &str) -> Route {
    match command {
        "initialize" => Route::Main(MainCommand::Initialize),
        "launch" => Route::Main(MainCommand::Launch),
        "attach" => Route::Main(MainCommand::Attach),
        "disconnect" => Route::Main(MainCommand::Disconnect),
        "setBreakpoints" => Route::Main(MainCommand::SetBreakpoints),
        "configurationDone" => Route::Main(MainCommand::ConfigurationDone),
        "pause" => Route::Main(MainCommand::Pause),
        "continue" => Route::Hook(HookCommand::Continue),
        "next" => Route::Hook(HookCommand::Next),
        "stepIn" => Route::Hook(HookCommand::StepIn),
        "stepOut" => Route::Hook(HookCommand::StepOut),
        "stackTrace" => Route::Hook(HookCommand::StackTrace),
        "scopes" => Route::Hook(HookCommand::Scopes),
        "variables" => Route::Hook(HookCommand::Variables),
        "setVariable" => Route::Hook(HookCommand::SetVariable),
        "source" => Route::Hook(HookCommand::Source),
        "threads" => Route::Hook(HookCommand::Threads),
        "evaluate" => Route::Hook(HookCommand::Evaluate),
        _ => Route::Unknown,
    }
}
