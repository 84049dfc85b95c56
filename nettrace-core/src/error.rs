//! Unified error type definition

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Broad error category, used by callers to decide how to present a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Socket, resolver, or protocol failure talking to a remote host.
    Network,
    /// Caller-supplied input was rejected before any I/O happened.
    Validation,
    /// The consumed [`NetworkConfig`](crate::NetworkConfig) is unusable.
    Configuration,
    /// Tool lookup / registration failure.
    Plugin,
    /// Reserved for the presentation layer.
    Ui,
    /// Result export (JSON / CSV / text) failed.
    Export,
    /// Local runtime failure (task join, permissions, ...).
    System,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Network => "network",
            Self::Validation => "validation",
            Self::Configuration => "configuration",
            Self::Plugin => "plugin",
            Self::Ui => "ui",
            Self::Export => "export",
            Self::System => "system",
        };
        f.write_str(s)
    }
}

/// Machine-readable error code.
///
/// Serialized in `SCREAMING_SNAKE_CASE` (e.g. `DNS_LOOKUP_FAILED`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    DnsLookupFailed,
    DnsValidationFailed,
    WhoisLookupFailed,
    WhoisValidationFailed,
    WhoisServerNotFound,
    SslCheckFailed,
    SslValidationFailed,
    PingFailed,
    PingValidationFailed,
    TracerouteFailed,
    TracerouteValidationFailed,
    HostResolutionFailed,
    NetworkTimeout,
    Cancelled,
    InvalidConfig,
    InvalidParameter,
    ToolNotFound,
    ExportFailed,
    SocketError,
    Internal,
}

impl ErrorCode {
    /// The wire form of the code, identical to its serialized value.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DnsLookupFailed => "DNS_LOOKUP_FAILED",
            Self::DnsValidationFailed => "DNS_VALIDATION_FAILED",
            Self::WhoisLookupFailed => "WHOIS_LOOKUP_FAILED",
            Self::WhoisValidationFailed => "WHOIS_VALIDATION_FAILED",
            Self::WhoisServerNotFound => "WHOIS_SERVER_NOT_FOUND",
            Self::SslCheckFailed => "SSL_CHECK_FAILED",
            Self::SslValidationFailed => "SSL_VALIDATION_FAILED",
            Self::PingFailed => "PING_FAILED",
            Self::PingValidationFailed => "PING_VALIDATION_FAILED",
            Self::TracerouteFailed => "TRACEROUTE_FAILED",
            Self::TracerouteValidationFailed => "TRACEROUTE_VALIDATION_FAILED",
            Self::HostResolutionFailed => "HOST_RESOLUTION_FAILED",
            Self::NetworkTimeout => "NETWORK_TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::InvalidConfig => "INVALID_CONFIG",
            Self::InvalidParameter => "INVALID_PARAMETER",
            Self::ToolNotFound => "TOOL_NOT_FOUND",
            Self::ExportFailed => "EXPORT_FAILED",
            Self::SocketError => "SOCKET_ERROR",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Boxed error cause kept for `source()` chains.
type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error returned by every diagnostic operation.
///
/// Carries a [`kind`](Self::kind) discriminant, a machine-readable
/// [`code`](Self::code), a human message, a context map (host / port / query)
/// and the time it was raised. The originating cause, when there is one, is
/// reachable through [`std::error::Error::source`].
#[derive(Error, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
#[error("{code}: {message}")]
pub struct NetTraceError {
    kind: ErrorKind,
    code: ErrorCode,
    message: String,
    context: BTreeMap<String, String>,
    timestamp: DateTime<Utc>,
    #[source]
    #[serde(skip)]
    source: Option<Cause>,
}

impl NetTraceError {
    pub fn new(kind: ErrorKind, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
            context: BTreeMap::new(),
            timestamp: Utc::now(),
            source: None,
        }
    }

    pub fn network(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, code, message)
    }

    pub fn validation(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, code, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, ErrorCode::InvalidConfig, message)
    }

    pub fn export(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Export, ErrorCode::ExportFailed, message)
    }

    pub fn system(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::System, code, message)
    }

    /// The caller cancelled the operation.
    pub fn cancelled(operation: &str) -> Self {
        Self::network(ErrorCode::Cancelled, format!("{operation} cancelled"))
    }

    /// A single attempt exceeded its deadline.
    pub fn timeout(operation: &str, after: std::time::Duration) -> Self {
        Self::network(
            ErrorCode::NetworkTimeout,
            format!("{operation} timed out after {}ms", after.as_millis()),
        )
    }

    /// Attach a context entry (host, port, query, ...).
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }

    /// Attach the originating cause.
    #[must_use]
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Re-label the error with a driver-specific code, keeping everything else.
    ///
    /// Timeouts and cancellations keep their own code so callers can tell them apart.
    #[must_use]
    pub fn with_code(mut self, code: ErrorCode) -> Self {
        if !matches!(self.code, ErrorCode::NetworkTimeout | ErrorCode::Cancelled) {
            self.code = code;
        }
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &BTreeMap<String, String> {
        &self.context
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn is_cancelled(&self) -> bool {
        self.code == ErrorCode::Cancelled
    }

    pub fn is_timeout(&self) -> bool {
        self.code == ErrorCode::NetworkTimeout
    }

    /// Whether retrying the same operation may succeed.
    ///
    /// Only network failures qualify; validation and configuration errors are
    /// structural, and a cancelled call must not be restarted.
    /// **Please update this method when new kinds or codes are added.**
    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::Network && self.code != ErrorCode::Cancelled
    }

    /// Whether this is expected behaviour (bad input, unknown TLD, ...), used for log levels.
    ///
    /// Level `warn` should be used when returning `true` and level `error` when returning `false`.
    pub fn is_expected(&self) -> bool {
        matches!(self.kind, ErrorKind::Validation | ErrorKind::Network)
    }
}

/// Crate-wide Result alias
pub type NetTraceResult<T> = std::result::Result<T, NetTraceError>;
