//! Core error kinds and their disposition.

use crate::debugger::state::State;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O failure on the message channel. Terminates the session.
    #[error("transport: {0:#}")]
    Transport(anyhow::Error),

    /// Malformed message envelope; the message is dropped.
    #[error("malformed protocol message: {0}")]
    Protocol(#[from] serde_json::Error),

    /// Command outside both dispatch tables.
    #[error("{0} not yet implemented")]
    NotImplemented(String),

    /// Known command arriving in a state that does not accept it.
    #[error("command `{command}` is not allowed in state `{state}`")]
    IllegalState { command: String, state: State },

    #[error("evaluate: {0}")]
    Evaluation(String),

    /// Variable reference from a previous stop, or never issued.
    #[error("invalid variable reference {0}")]
    InvalidReference(i64),

    #[error("frame {0} not found")]
    FrameNotFound(u32),

    #[error("missing required argument `{0}`")]
    MissingArgument(&'static str),

    #[error("set variable: {0}")]
    SetVariable(String),

    #[error("source `{0}` is not available")]
    SourceUnavailable(String),
}

impl Error {
    /// Whether the session must terminate, or the error is answered or
    /// suppressed and debugging continues.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}
