//! First-class error values.
//!
//! Errors travel through the runtime as ordinary values: they ride in
//! message payloads (error responses to requests), become actor exit
//! reasons, and surface from every fallible runtime operation. An [`Error`]
//! is a `(code, context)` pair where the code comes from the closed
//! [`ErrorCode`] taxonomy and the context is an optional human-readable
//! message carried for logs and diagnostics.

// Layer 1: Standard library imports
use std::fmt::{self, Display};

// Layer 2: Third-party crate imports
use thiserror::Error as ThisError;

// Layer 3: Internal module imports
// (none)

/// Closed set of error codes used across the runtime surface.
///
/// The set is part of the wire and log contract: codes appear in error
/// responses, exit reasons, and connection teardown notices, so new codes
/// must only be added deliberately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ThisError)]
#[non_exhaustive]
#[repr(u8)]
pub enum ErrorCode {
    /// An actor received a message it has no handler for.
    #[error("unexpected_message")]
    UnexpectedMessage = 1,
    /// A response arrived for a request that has no pending handler, or the
    /// response payload did not match the expected shape.
    #[error("unexpected_response")]
    UnexpectedResponse = 2,
    /// The receiver of a request terminated before answering.
    #[error("request_receiver_down")]
    RequestReceiverDown = 3,
    /// A request did not produce a response within its deadline.
    #[error("request_timeout")]
    RequestTimeout = 4,
    /// A caller passed an invalid argument to a runtime operation.
    #[error("invalid_argument")]
    InvalidArgument = 5,
    /// An address used an unsupported protocol family.
    #[error("invalid_protocol_family")]
    InvalidProtocolFamily = 6,
    /// A network system call failed.
    #[error("network_syscall_failed")]
    NetworkSyscallFailed = 7,
    /// A socket handle was invalid.
    #[error("socket_invalid")]
    SocketInvalid = 8,
    /// The peer closed the connection.
    #[error("socket_disconnected")]
    SocketDisconnected = 9,
    /// A read or write on a socket failed.
    #[error("socket_operation_failed")]
    SocketOperationFailed = 10,
    /// A value could not be serialized or its type refused erasure.
    #[error("unsafe_type")]
    UnsafeType = 11,
    /// A type id has no meta object registered.
    #[error("unknown_type")]
    UnknownType = 12,
    /// A field-level invariant check failed during load.
    #[error("field_invariant_check_failed")]
    FieldInvariantCheckFailed = 13,
    /// A field setter rejected the loaded value.
    #[error("field_value_synchronization_failed")]
    FieldValueSynchronizationFailed = 14,
    /// A field had an unexpected runtime type.
    #[error("invalid_field_type")]
    InvalidFieldType = 15,
    /// A user-provided load callback returned an error.
    #[error("load_callback_failed")]
    LoadCallbackFailed = 16,
    /// A user-provided save callback returned an error.
    #[error("save_callback_failed")]
    SaveCallbackFailed = 17,
    /// A field was encoded with a mismatching type tag.
    #[error("field_type_mismatch")]
    FieldTypeMismatch = 18,
    /// A stream could not be initialized.
    #[error("stream_init_failed")]
    StreamInitFailed = 19,
    /// A stream was aborted by either side.
    #[error("stream_aborted")]
    StreamAborted = 20,
    /// A stream handle was invalid.
    #[error("invalid_stream")]
    InvalidStream = 21,
    /// A generic runtime failure, e.g. a panic converted at a scheduler
    /// boundary.
    #[error("runtime_error")]
    RuntimeError = 22,
    /// An operation was attempted on a disposed resource.
    #[error("disposed")]
    Disposed = 23,
}

impl ErrorCode {
    /// Stable numeric value for wire encoding.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decode a wire value back into a code.
    pub fn from_u8(value: u8) -> Option<Self> {
        use ErrorCode::*;
        Some(match value {
            1 => UnexpectedMessage,
            2 => UnexpectedResponse,
            3 => RequestReceiverDown,
            4 => RequestTimeout,
            5 => InvalidArgument,
            6 => InvalidProtocolFamily,
            7 => NetworkSyscallFailed,
            8 => SocketInvalid,
            9 => SocketDisconnected,
            10 => SocketOperationFailed,
            11 => UnsafeType,
            12 => UnknownType,
            13 => FieldInvariantCheckFailed,
            14 => FieldValueSynchronizationFailed,
            15 => InvalidFieldType,
            16 => LoadCallbackFailed,
            17 => SaveCallbackFailed,
            18 => FieldTypeMismatch,
            19 => StreamInitFailed,
            20 => StreamAborted,
            21 => InvalidStream,
            22 => RuntimeError,
            23 => Disposed,
            _ => return None,
        })
    }
}

/// A runtime error value: code plus optional context message.
///
/// # Example
/// ```rust
/// use hive_rt::{Error, ErrorCode};
///
/// let err = Error::with_context(ErrorCode::RequestTimeout, "no reply after 100ms");
/// assert_eq!(err.code(), ErrorCode::RequestTimeout);
/// assert!(err.to_string().contains("request_timeout"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Error {
    code: ErrorCode,
    context: Option<String>,
}

impl Error {
    /// Create an error from a bare code.
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            context: None,
        }
    }

    /// Create an error with a context message.
    pub fn with_context(code: ErrorCode, context: impl Into<String>) -> Self {
        Self {
            code,
            context: Some(context.into()),
        }
    }

    /// The error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// The context message, if any.
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Replace the context message.
    pub fn set_context(&mut self, context: impl Into<String>) {
        self.context = Some(context.into());
    }
}

impl Default for Error {
    fn default() -> Self {
        Self::new(ErrorCode::RuntimeError)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(ctx) => write!(f, "{}: {}", self.code, ctx),
            None => write!(f, "{}", self.code),
        }
    }
}

impl std::error::Error for Error {}

impl From<ErrorCode> for Error {
    fn from(code: ErrorCode) -> Self {
        Self::new(code)
    }
}

/// Why an actor terminated.
///
/// The sentinel "not exited" state is represented by the absence of a
/// reason on the control block, not by a variant here; once set, the
/// reason is immutable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ExitReason {
    /// Regular, voluntary termination.
    #[default]
    Normal,
    /// Unconditional termination via a kill signal; cannot be handled.
    Kill,
    /// The surrounding system is shutting down.
    UserShutdown,
    /// The connection to a linked remote actor was lost.
    RemoteLinkUnreachable,
    /// Abnormal termination carrying the causing error.
    Abnormal(Error),
}

impl ExitReason {
    /// Whether this reason denotes a regular termination.
    pub fn is_normal(&self) -> bool {
        matches!(self, ExitReason::Normal)
    }

    /// Whether this reason denotes a kill signal.
    pub fn is_kill(&self) -> bool {
        matches!(self, ExitReason::Kill)
    }

    /// The embedded error for abnormal exits, if any.
    pub fn as_error(&self) -> Option<&Error> {
        match self {
            ExitReason::Abnormal(err) => Some(err),
            _ => None,
        }
    }

    /// View this reason as an error value, synthesizing one for the
    /// non-error variants. Used when bouncing requests from a dying actor.
    pub fn to_error(&self) -> Error {
        match self {
            ExitReason::Abnormal(err) => err.clone(),
            ExitReason::Normal => Error::with_context(ErrorCode::RequestReceiverDown, "exited normally"),
            ExitReason::Kill => Error::with_context(ErrorCode::RequestReceiverDown, "killed"),
            ExitReason::UserShutdown => {
                Error::with_context(ErrorCode::RequestReceiverDown, "system shutdown")
            }
            ExitReason::RemoteLinkUnreachable => {
                Error::with_context(ErrorCode::SocketDisconnected, "remote link unreachable")
            }
        }
    }
}

impl Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Normal => write!(f, "normal"),
            ExitReason::Kill => write!(f, "kill"),
            ExitReason::UserShutdown => write!(f, "user_shutdown"),
            ExitReason::RemoteLinkUnreachable => write!(f, "remote_link_unreachable"),
            ExitReason::Abnormal(err) => write!(f, "abnormal({err})"),
        }
    }
}

impl From<Error> for ExitReason {
    fn from(err: Error) -> Self {
        ExitReason::Abnormal(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_roundtrip() {
        for raw in 0u8..=40 {
            if let Some(code) = ErrorCode::from_u8(raw) {
                assert_eq!(code.as_u8(), raw);
            }
        }
        assert_eq!(ErrorCode::from_u8(0), None);
        assert_eq!(ErrorCode::from_u8(200), None);
    }

    #[test]
    fn display_includes_context() {
        let err = Error::with_context(ErrorCode::UnknownType, "type id 99");
        assert_eq!(err.to_string(), "unknown_type: type id 99");
        let bare = Error::new(ErrorCode::Disposed);
        assert_eq!(bare.to_string(), "disposed");
    }

    #[test]
    fn exit_reason_error_view() {
        assert!(ExitReason::Normal.is_normal());
        assert!(ExitReason::Kill.to_error().to_string().contains("killed"));
        let abnormal = ExitReason::Abnormal(Error::new(ErrorCode::RuntimeError));
        assert_eq!(abnormal.as_error().unwrap().code(), ErrorCode::RuntimeError);
    }
}
