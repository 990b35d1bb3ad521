//! Unified error types for the rig controller.
//!
//! Every port (serial registers, relays, thermometer, remote APIs) returns
//! one of the typed enums below; they all convert into [`Error`] so the
//! control components share one `Result` alias.  Scheduled tasks wrap these
//! in `anyhow` context at the boundary and the scheduler logs the chain.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Charge-controller link failed (serial, framing, device exception).
    Transport(TransportError),
    /// An output line could not be driven or read back.
    Actuator(ActuatorError),
    /// A sensor could not be read or returned implausible data.
    Sensor(SensorError),
    /// A remote HTTP API failed or rejected the request.
    Api(ApiError),
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Actuator(e) => write!(f, "actuator: {e}"),
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Api(e) => write!(f, "api: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No (or a short) response before the read deadline.
    Timeout,
    /// Response CRC did not match its payload.
    Crc,
    /// The device answered with a Modbus exception.
    Exception { function: u8, code: u8 },
    /// Response was well-formed on the wire but not what was asked for.
    Malformed(&'static str),
    /// Underlying port error.
    Io(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "response timeout"),
            Self::Crc => write!(f, "CRC mismatch"),
            Self::Exception { function, code } => {
                write!(f, "device exception {code:#04x} for function {function:#04x}")
            }
            Self::Malformed(what) => write!(f, "malformed response: {what}"),
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// Actuator errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActuatorError {
    /// GPIO set failed on the named line.
    WriteFailed(&'static str),
    /// GPIO read-back failed on the named line.
    ReadFailed(&'static str),
}

impl fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WriteFailed(line) => write!(f, "write failed on '{line}'"),
            Self::ReadFailed(line) => write!(f, "read failed on '{line}'"),
        }
    }
}

impl std::error::Error for ActuatorError {}

impl From<ActuatorError> for Error {
    fn from(e: ActuatorError) -> Self {
        Self::Actuator(e)
    }
}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorError {
    /// Bus transaction failed.
    ReadFailed,
    /// Reading is outside the physically plausible range.
    OutOfRange,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFailed => write!(f, "read failed"),
            Self::OutOfRange => write!(f, "reading out of range"),
        }
    }
}

impl std::error::Error for SensorError {}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Remote API errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Connection, TLS or timeout failure before a status was received.
    Http(String),
    /// Non-success HTTP status.
    Status { service: &'static str, code: u16 },
    /// Service answered 2xx but refused the operation.
    Rejected(String),
    /// A configured power profile does not exist on the server.
    ProfileNotFound(String),
    /// Response body could not be decoded.
    Decode(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(msg) => write!(f, "request failed: {msg}"),
            Self::Status { service, code } => write!(f, "{service} returned HTTP {code}"),
            Self::Rejected(msg) => write!(f, "rejected: {msg}"),
            Self::ProfileNotFound(name) => write!(f, "power profile '{name}' not found"),
            Self::Decode(msg) => write!(f, "undecodable response: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<ApiError> for Error {
    fn from(e: ApiError) -> Self {
        Self::Api(e)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Http(e.to_string())
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Api(e.into())
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// File missing, unreadable or not valid YAML for [`SystemConfig`].
    ///
    /// [`SystemConfig`]: crate::config::SystemConfig
    Load(String),
    /// A field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load(msg) => write!(f, "load failed: {msg}"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        Self::Load(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
