//! Unified error types for the framework.
//!
//! A single `Error` enum that every subsystem converts into, so `main` and
//! the service's init path handle failures uniformly.  All variants are
//! `Copy`; nothing here allocates.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible init-time operation funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The configuration could not be loaded or rebuilt.
    Config(ConfigError),
    /// The reporting transport failed to come up.
    Transport(TransportError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
        }
    }
}

impl core::error::Error for Error {}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Failures while rebuilding the configuration record from its JSON source.
///
/// A checksum mismatch is not an error: it silently triggers a rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The backing filesystem could not be mounted.
    MountFailed,
    /// The JSON file does not exist.
    FileNotFound,
    /// The file exists but could not be read.
    ReadFailed,
    /// The file is not a JSON object.
    ParseFailed,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MountFailed => write!(f, "filesystem mount failed"),
            Self::FileNotFound => write!(f, "config file not found"),
            Self::ReadFailed => write!(f, "config file read failed"),
            Self::ParseFailed => write!(f, "config file is not a valid JSON object"),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Network association errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityError {
    NoCredentials,
    InvalidSsid,
    InvalidPassword,
    ConnectionFailed,
    Timeout,
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no WiFi credentials configured"),
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => write!(f, "password invalid (must be 8-32 bytes, or empty for open)"),
            Self::ConnectionFailed => write!(f, "WiFi association failed"),
            Self::Timeout => write!(f, "WiFi association timed out"),
        }
    }
}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The payload exceeds the configured maximum packet size; nothing was sent.
    PayloadTooLarge { len: usize, max: usize },
    /// The link layer refused the frame.
    SendFailed,
    /// A confirmation arrived reporting that the peer did not acknowledge.
    NotDelivered,
    /// No confirmation arrived within the bounded wait.
    ConfirmationTimeout,
    /// `send` was called before a successful `init`.
    NotInitialized,
    /// The radio or socket layer could not be brought up.
    HardwareInit(&'static str),
    /// The network association reported an error state.
    Association(ConnectivityError),
    /// The gateway address could not be resolved.
    AddressResolution,
    /// Peer discovery found no gateway; the device must suspend and retry.
    GatewayUnreachable { retry_in_secs: u32 },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PayloadTooLarge { len, max } => {
                write!(f, "payload of {len} bytes exceeds maximum of {max}")
            }
            Self::SendFailed => write!(f, "send failed"),
            Self::NotDelivered => write!(f, "peer did not acknowledge"),
            Self::ConfirmationTimeout => write!(f, "no delivery confirmation"),
            Self::NotInitialized => write!(f, "transport not initialised"),
            Self::HardwareInit(msg) => write!(f, "hardware init: {msg}"),
            Self::Association(e) => write!(f, "association: {e}"),
            Self::AddressResolution => write!(f, "gateway address could not be resolved"),
            Self::GatewayUnreachable { retry_in_secs } => {
                write!(f, "gateway not found, retry in {retry_in_secs}s")
            }
        }
    }
}

impl From<ConnectivityError> for TransportError {
    fn from(e: ConnectivityError) -> Self {
        Self::Association(e)
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

/// Errors from [`StoragePort`](crate::app::ports::StoragePort) operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
    /// The stored blob could not be decoded.
    Corrupted,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
            Self::Corrupted => write!(f, "stored value corrupted"),
        }
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Framework-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
