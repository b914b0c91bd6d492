use thiserror::Error;

/// Conditions the dispatcher and the top-level entry point classify.
///
/// Commands return `anyhow::Result`, so these travel inside an
/// `anyhow::Error` and are recovered with `downcast_ref`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CmdError {
    /// The named command path resolves to nothing.
    #[error("unrecognized command: {0}")]
    UnrecognizedCommand(String),

    #[error("unrecognized args: {0:?}")]
    UnrecognizedArgs(Vec<String>),

    /// A child process exited with this status; the top level exits with
    /// the same code and prints nothing.
    #[error("subprocess encountered error code {0}")]
    RcPassthrough(i32),

    /// Already reported to the operator, do not report again.
    #[error("cmd: error out silently")]
    Silent,
}

/// Programmer errors raised while building a registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("action missing name")]
    MissingName,

    #[error("command {0:?} already registered")]
    AlreadyRegistered(String),

    #[error("action {0:?} not found")]
    NotFound(String),

    #[error("action {0:?} already added")]
    AliasAlreadyAdded(String),

    #[error("{0:?} is not a SuperCommand")]
    NotASuperCommand(String),

    #[error("help topic already added: {0}")]
    TopicAlreadyAdded(String),

    #[error("topic {0:?} not found")]
    TopicNotFound(String),
}

pub fn is_silent(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<CmdError>(), Some(CmdError::Silent))
}

/// Returns the exit code carried by a pass-through error.
pub fn passthrough_code(err: &anyhow::Error) -> Option<i32> {
    match err.downcast_ref::<CmdError>() {
        Some(CmdError::RcPassthrough(code)) => Some(*code),
        _ => None,
    }
}

pub fn is_unrecognized_command(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<CmdError>(),
        Some(CmdError::UnrecognizedCommand(_))
    )
}
