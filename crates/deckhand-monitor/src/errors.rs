/// Failure raised while classifying one wire frame.
///
/// Classification failures are logged at debug level and the frame is
/// discarded; they never reach the session's public event channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifyError {
    /// The frame was not valid JSON or lacked a required field.
    #[error("malformed frame: {message}")]
    Malformed { message: String },
    /// The envelope carried a `type` this monitor does not understand.
    #[error("unknown frame type: {kind}")]
    UnknownKind { kind: String },
}

impl ClassifyError {
    /// Creates a malformed-frame error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Creates an unknown-frame-type error.
    pub fn unknown_kind(kind: impl Into<String>) -> Self {
        Self::UnknownKind { kind: kind.into() }
    }
}

/// Connection-level failures from the history fetch or the live stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The backend rejected a request (HTTP status, auth, unknown subject).
    #[error("backend error: {message}")]
    Backend {
        message: String,
        status_code: Option<u16>,
    },
    /// Socket or stream I/O failed.
    #[error("io error: {message}")]
    Io { message: String },
}

impl TransportError {
    /// Creates a backend-rejection error.
    pub fn backend(message: impl Into<String>, status_code: Option<u16>) -> Self {
        Self::Backend {
            message: message.into(),
            status_code,
        }
    }

    /// Creates an I/O-level error.
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Returns the human-readable message for this error.
    pub fn message(&self) -> &str {
        match self {
            Self::Backend { message, .. } | Self::Io { message } => message,
        }
    }
}

/// Session failures surfaced through `SessionEvent::Error` and friends.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize, serde::Deserialize)]
pub enum SessionError {
    /// Connection-level failure; the session keeps retrying until the
    /// reconnect budget runs out.
    #[error("transport failure: {message}")]
    Transport { message: String },
    /// The backend reported a subject-level error through the stream.
    #[error("upstream failure: {message}")]
    Upstream { message: String },
    /// Reconnect attempts ran out without reaching a terminal status.
    #[error("gave up after {attempts} reconnect attempts")]
    Exhausted { attempts: u32 },
}

impl SessionError {
    /// Creates a transport-level session failure.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates an upstream-reported session failure.
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }
}

impl From<TransportError> for SessionError {
    fn from(value: TransportError) -> Self {
        Self::Transport {
            message: value.to_string(),
        }
    }
}

/// Top-level error type for the public monitor API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MonitorError {
    /// Invalid monitor/backend configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid user input to the builder API.
    #[error("validation error: {0}")]
    Validation(String),
}
