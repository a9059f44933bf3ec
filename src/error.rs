//! Error types.
//!
//! Three families live here:
//!
//! - [`Error`] — infrastructure failures of the server itself.
//! - [`HandlerError`] / [`InvokeError`] — failures raised by a controller
//!   action, and what propagates out of an interceptor chain.
//! - [`InstrumentationError`] — an interceptor could not inspect the handler
//!   it wraps. Interceptors log these and carry on; they never reach a client.
//!
//! A rejected request (missing required parameter, malformed value) is not an
//! error at all. It is a [`Completion::Rejected`](crate::Completion) or a
//! `400` response.

use thiserror::Error;

use crate::controller::HandlerId;

/// The error type returned by the server's fallible operations.
///
/// Application-level outcomes (404, 400, 500, etc.) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s. This type surfaces
/// infrastructure failures: binding to a port or accepting a connection.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{0}`")]
    Addr(String),
}

/// A failure raised by a controller action.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The action used a value that was never set.
    #[error("null dereference: `{binding}` has no value")]
    NullDereference { binding: String },

    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    pub fn null_dereference(binding: impl Into<String>) -> Self {
        Self::NullDereference { binding: binding.into() }
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    pub fn is_null_dereference(&self) -> bool {
        matches!(self, Self::NullDereference { .. })
    }
}

/// What propagates out of an interceptor chain.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// The invocation was built without a request to inspect.
    #[error("no request context bound to this invocation")]
    ContextUnavailable,
}

/// An interceptor failed to inspect the handler it wraps.
#[derive(Debug, Error)]
pub enum InstrumentationError {
    #[error("no signature registered for `{0}`")]
    UnknownHandler(HandlerId),

    #[error("`{handler}` declares {declared} parameter(s) but was given {given} argument(s)")]
    Arity {
        handler: HandlerId,
        declared: usize,
        given: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_dereference_is_recognised() {
        let err = HandlerError::null_dereference("aa");
        assert!(err.is_null_dereference());
        assert_eq!(err.to_string(), "null dereference: `aa` has no value");
        assert!(!HandlerError::failed("boom").is_null_dereference());
    }

    #[test]
    fn handler_error_passes_through_invoke_error() {
        let err: InvokeError = HandlerError::failed("boom").into();
        assert_eq!(err.to_string(), "boom");
    }
}
