//! RPC status codes and error types.
//!
//! This module provides the error types shared by every transport:
//! - [`Code`]: canonical RPC status codes
//! - [`FrameError`]: framing errors raised while assembling frames
//! - [`RpcError`]: the error carried by rejected header/trailer promises

use std::str::FromStr;

/// Canonical RPC status codes, numbered like the gRPC codes.
///
/// The numeric form (see [`Code::as_i32`]) is what transports write into the
/// `status` field of a trailer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Code {
    Ok = 0,
    Canceled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl Code {
    /// Get the string representation of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::Ok => "ok",
            Code::Canceled => "canceled",
            Code::Unknown => "unknown",
            Code::InvalidArgument => "invalid_argument",
            Code::DeadlineExceeded => "deadline_exceeded",
            Code::NotFound => "not_found",
            Code::AlreadyExists => "already_exists",
            Code::PermissionDenied => "permission_denied",
            Code::ResourceExhausted => "resource_exhausted",
            Code::FailedPrecondition => "failed_precondition",
            Code::Aborted => "aborted",
            Code::OutOfRange => "out_of_range",
            Code::Unimplemented => "unimplemented",
            Code::Internal => "internal",
            Code::Unavailable => "unavailable",
            Code::DataLoss => "data_loss",
            Code::Unauthenticated => "unauthenticated",
        }
    }

    /// Numeric value of this code.
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    /// Convert a numeric code back into a [`Code`].
    ///
    /// Values outside `0..=16` map to [`Code::Unknown`].
    pub fn from_i32(value: i32) -> Code {
        match value {
            0 => Code::Ok,
            1 => Code::Canceled,
            2 => Code::Unknown,
            3 => Code::InvalidArgument,
            4 => Code::DeadlineExceeded,
            5 => Code::NotFound,
            6 => Code::AlreadyExists,
            7 => Code::PermissionDenied,
            8 => Code::ResourceExhausted,
            9 => Code::FailedPrecondition,
            10 => Code::Aborted,
            11 => Code::OutOfRange,
            12 => Code::Unimplemented,
            13 => Code::Internal,
            14 => Code::Unavailable,
            15 => Code::DataLoss,
            16 => Code::Unauthenticated,
            _ => Code::Unknown,
        }
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a [`Code`] from a string fails.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseCodeError(());

impl std::fmt::Display for ParseCodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown status code")
    }
}

impl std::error::Error for ParseCodeError {}

impl FromStr for Code {
    type Err = ParseCodeError;

    /// Accepts either the snake_case name or the numeric form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(n) = s.parse::<i32>() {
            return match n {
                0..=16 => Ok(Code::from_i32(n)),
                _ => Err(ParseCodeError(())),
            };
        }
        match s {
            "ok" => Ok(Code::Ok),
            "canceled" | "cancelled" => Ok(Code::Canceled),
            "unknown" => Ok(Code::Unknown),
            "invalid_argument" => Ok(Code::InvalidArgument),
            "deadline_exceeded" => Ok(Code::DeadlineExceeded),
            "not_found" => Ok(Code::NotFound),
            "already_exists" => Ok(Code::AlreadyExists),
            "permission_denied" => Ok(Code::PermissionDenied),
            "resource_exhausted" => Ok(Code::ResourceExhausted),
            "failed_precondition" => Ok(Code::FailedPrecondition),
            "aborted" => Ok(Code::Aborted),
            "out_of_range" => Ok(Code::OutOfRange),
            "unimplemented" => Ok(Code::Unimplemented),
            "internal" => Ok(Code::Internal),
            "unavailable" => Ok(Code::Unavailable),
            "data_loss" => Ok(Code::DataLoss),
            "unauthenticated" => Ok(Code::Unauthenticated),
            _ => Err(ParseCodeError(())),
        }
    }
}

/// Framing errors.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The stream closed while a partial frame was still buffered.
    #[error("stream ended with {pending} bytes of incomplete frame")]
    Truncated { pending: usize },

    /// A payload too large for the 4-byte length field.
    #[error("frame payload of {len} bytes exceeds the u32 length field")]
    Oversized { len: usize },
}

/// Error settled into header/trailer promises and returned by transports.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    /// A status reported by the remote peer or synthesized by a transport.
    #[error("{code}: {message}")]
    Status { code: Code, message: String },

    /// Transport-level failure (connection reset, DNS failure, premature close).
    #[error("transport error: {0}")]
    Transport(String),

    /// Message serialization failed.
    #[error("encode error: {0}")]
    Encode(String),

    /// Message deserialization failed.
    #[error("decode error: {0}")]
    Decode(String),

    /// Malformed frames or unexpected data.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The consumer abandoned the call.
    #[error("canceled: {0}")]
    Canceled(String),

    /// The settling side of a promise was dropped before settling it.
    #[error("promise dropped without being settled")]
    Unsettled,
}

impl RpcError {
    /// Create a status error with a code and message.
    pub fn new<S: Into<String>>(code: Code, message: S) -> Self {
        RpcError::Status {
            code,
            message: message.into(),
        }
    }

    /// Get the status code this error maps to.
    ///
    /// For non-Status variants:
    /// - Transport: `Unavailable`
    /// - Encode/Decode: `Internal`
    /// - Protocol: `InvalidArgument`
    /// - Canceled: `Canceled`
    /// - Unsettled: `Unknown`
    pub fn code(&self) -> Code {
        match self {
            RpcError::Status { code, .. } => *code,
            RpcError::Transport(_) => Code::Unavailable,
            RpcError::Encode(_) | RpcError::Decode(_) => Code::Internal,
            RpcError::Protocol(_) => Code::InvalidArgument,
            RpcError::Canceled(_) => Code::Canceled,
            RpcError::Unsettled => Code::Unknown,
        }
    }

    /// Get the error message.
    pub fn message(&self) -> &str {
        match self {
            RpcError::Status { message, .. } => message,
            RpcError::Transport(msg)
            | RpcError::Encode(msg)
            | RpcError::Decode(msg)
            | RpcError::Protocol(msg)
            | RpcError::Canceled(msg) => msg,
            RpcError::Unsettled => "promise dropped without being settled",
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    /// Create an internal error.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Internal, message)
    }

    /// Create an unavailable error.
    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unavailable, message)
    }

    /// Create an unimplemented error.
    pub fn unimplemented<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unimplemented, message)
    }

    /// Create a data loss error.
    pub fn data_loss<S: Into<String>>(message: S) -> Self {
        Self::new(Code::DataLoss, message)
    }
}

impl From<FrameError> for RpcError {
    fn from(err: FrameError) -> Self {
        let code = match err {
            FrameError::Truncated { .. } => Code::DataLoss,
            FrameError::Oversized { .. } => Code::ResourceExhausted,
        };
        RpcError::new(code, err.to_string())
    }
}
