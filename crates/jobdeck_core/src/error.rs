use std::fmt;

/// Failure of a remote call or of decoding what it returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The request never produced a usable HTTP response.
    #[error("transport failure ({kind}): {message}")]
    Transport {
        kind: TransportFailure,
        message: String,
    },
    /// The service answered with an envelope whose `code` is not `0`.
    #[error("request rejected with code {code}: {message}")]
    Protocol { code: String, message: String },
    /// The payload did not have the expected shape.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    /// Caller supplied input the request cannot be built from.
    #[error("invalid input: {0}")]
    Validation(String),
}

impl ApiError {
    pub fn transport(kind: TransportFailure, message: impl Into<String>) -> Self {
        Self::Transport {
            kind,
            message: message.into(),
        }
    }

    pub fn protocol(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Protocol {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedPayload(message.into())
    }

    /// Transport failures may succeed on a later attempt; everything else is
    /// a property of the request or the payload.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Transport { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
    InvalidUrl,
    Timeout,
    Network,
    HttpStatus(u16),
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportFailure::InvalidUrl => write!(f, "invalid url"),
            TransportFailure::Timeout => write!(f, "timeout"),
            TransportFailure::Network => write!(f, "network error"),
            TransportFailure::HttpStatus(code) => write!(f, "http status {code}"),
        }
    }
}
