/*
 * Error type for the binding layer. Every status sentinel the curses library can
 * report is mapped onto a `BindingError` variant carrying the context of the
 * failing operation, so callers can match on the kind of failure and still log
 * something useful.
 *
 * Fatal conditions (identity hook mismatch, index-sync violation) are not
 * represented here; they panic at the point of detection.
 */

use crate::curses::{
    E_BAD_ARGUMENT, E_BAD_STATE, E_CONNECTED, E_CURRENT, E_INVALID_FIELD, E_NO_MATCH,
    E_NO_ROOM, E_NOT_CONNECTED, E_NOT_POSTED, E_NOT_SELECTABLE, E_OK, E_POSTED,
    E_REQUEST_DENIED, E_SYSTEM_ERROR, E_UNKNOWN_COMMAND, Status,
};

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingError {
    /// A logical id does not (or no longer) refer to a live wrapper.
    InvalidHandle(String),
    /// The library returned its generic `ERR` sentinel.
    OperationFailed(String),
    BadArgument(String),
    /// Allocation or other system-level failure inside the library.
    SystemError(String),
    Posted(String),
    NotPosted(String),
    Connected(String),
    NotConnected(String),
    BadState(String),
    NoRoom(String),
    Current(String),
    RequestDenied(String),
    InvalidSelection(String),
    NoMatch(String),
    UnknownCommand(String),
    /// Decoration requested on a panel without reserved frame cells.
    NotPermitted(String),
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
    /// The keystroke read returned `ERR` (timeout or exhausted input).
    NoInput(String),
    InitializationFailed(String),
}

pub type Result<T> = std::result::Result<T, BindingError>;

impl fmt::Display for BindingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingError::InvalidHandle(ctx) => write!(f, "invalid handle: {ctx}"),
            BindingError::OperationFailed(ctx) => write!(f, "operation failed: {ctx}"),
            BindingError::BadArgument(ctx) => write!(f, "bad argument: {ctx}"),
            BindingError::SystemError(ctx) => write!(f, "system error: {ctx}"),
            BindingError::Posted(ctx) => write!(f, "already posted: {ctx}"),
            BindingError::NotPosted(ctx) => write!(f, "not posted: {ctx}"),
            BindingError::Connected(ctx) => write!(f, "already connected: {ctx}"),
            BindingError::NotConnected(ctx) => write!(f, "not connected: {ctx}"),
            BindingError::BadState(ctx) => write!(f, "bad state: {ctx}"),
            BindingError::NoRoom(ctx) => write!(f, "no room: {ctx}"),
            BindingError::Current(ctx) => write!(f, "current: {ctx}"),
            BindingError::RequestDenied(ctx) => write!(f, "request denied: {ctx}"),
            BindingError::InvalidSelection(ctx) => write!(f, "invalid selection: {ctx}"),
            BindingError::NoMatch(ctx) => write!(f, "no match: {ctx}"),
            BindingError::UnknownCommand(ctx) => write!(f, "unknown command: {ctx}"),
            BindingError::NotPermitted(ctx) => write!(f, "not permitted: {ctx}"),
            BindingError::TypeMismatch { expected, actual } => {
                write!(f, "user data type mismatch: expected {expected}, found {actual}")
            }
            BindingError::NoInput(ctx) => write!(f, "no input: {ctx}"),
            BindingError::InitializationFailed(ctx) => write!(f, "initialization failed: {ctx}"),
        }
    }
}

impl std::error::Error for BindingError {}

/*
 * Maps a library status code to `Ok(())` or the matching error variant.
 * `OK` and `E_OK` share the value 0; `ERR` and `E_SYSTEM_ERROR` share -1, and a
 * plain curses `ERR` is reported as `OperationFailed` by `check_curses`.
 */
pub(crate) fn check(status: Status, context: impl Into<String>) -> Result<()> {
    if status == E_OK {
        return Ok(());
    }
    let ctx = context.into();
    Err(match status {
        E_SYSTEM_ERROR => BindingError::SystemError(ctx),
        E_BAD_ARGUMENT => BindingError::BadArgument(ctx),
        E_POSTED => BindingError::Posted(ctx),
        E_CONNECTED => BindingError::Connected(ctx),
        E_BAD_STATE => BindingError::BadState(ctx),
        E_NO_ROOM => BindingError::NoRoom(ctx),
        E_NOT_POSTED => BindingError::NotPosted(ctx),
        E_UNKNOWN_COMMAND => BindingError::UnknownCommand(ctx),
        E_NO_MATCH => BindingError::NoMatch(ctx),
        E_NOT_SELECTABLE => BindingError::InvalidSelection(ctx),
        E_NOT_CONNECTED => BindingError::NotConnected(ctx),
        E_REQUEST_DENIED => BindingError::RequestDenied(ctx),
        E_INVALID_FIELD => BindingError::InvalidSelection(ctx),
        E_CURRENT => BindingError::Current(ctx),
        other => BindingError::OperationFailed(format!("{ctx} (status {other})")),
    })
}

/// Plain curses calls only know `OK`/`ERR`.
pub(crate) fn check_curses(status: Status, context: impl Into<String>) -> Result<()> {
    if status == crate::curses::OK {
        Ok(())
    } else {
        Err(BindingError::OperationFailed(context.into()))
    }
}
