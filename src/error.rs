//! Custom error types for the front end.
//!
//! This module defines `LiricError`, the single error type threaded through the crate with the
//! `?` operator, and `ErrorSite`, the table of numeric codes reported to clients in a failed
//! completion.
//!
//! ## Error Hierarchy
//!
//! - **`LocalProtocol`**: a downstream reply that could not be parsed, including a success
//!   status whose payload does not convert to the expected type.
//! - **`Downstream`**: the C layer (or another line protocol peer) answered with a nonzero
//!   status. The peer's free-text message is preserved.
//! - **`MultiLineCommand`**: a command line (often built from ISS or client text) contains a
//!   line break and was not sent.
//! - **`Network`**: connecting to, writing to or reading from a peer failed.
//! - **`Aborted`**: a command gave up because an ABORT was requested on its connection.
//! - **`Configuration`** / **`Config`**: a required property is missing or invalid, or the
//!   configuration file itself could not be loaded.
//! - **`UnsupportedCommand`**: no handler is registered for an inbound command type.
//!
//! Handlers never let these escape `process_command`. Each call site converts the error into a
//! completion carrying the `ErrorSite` code for that site, so clients can tell failures apart by
//! number alone.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, LiricError>;

/// Base of the reserved error number range for this instrument.
pub const LIRIC_ERROR_CODE_BASE: i32 = 1_900_000;

/// Error number reported by successful completions.
pub const LIRIC_ERROR_CODE_NO_ERROR: i32 = 0;

/// Every failure the front end can hit before it becomes a completion.
#[derive(Error, Debug)]
pub enum LiricError {
    /// The settings file could not be loaded or deserialized.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// A property is missing or has an unusable value.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Local file access failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connecting to, writing to or reading from a peer failed.
    #[error("Network error talking to {peer}: {source}")]
    Network {
        /// `host:port` of the peer.
        peer: String,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// A peer exchange exceeded its configured bound.
    #[error("Network timeout talking to {peer} after {timeout_ms} ms")]
    NetworkTimeout {
        /// `host:port` of the peer.
        peer: String,
        /// The bound that was exceeded.
        timeout_ms: u64,
    },

    /// The peer answered with a nonzero status.
    #[error("Command '{command}' failed with return code {code} and error string:{message}")]
    Downstream {
        /// Command line that was sent.
        command: String,
        /// Status the peer returned.
        code: i32,
        /// Peer-supplied error text.
        message: String,
    },

    /// A reply line did not parse.
    #[error("Failed to parse reply '{reply}': {reason}")]
    LocalProtocol {
        /// The offending reply line.
        reply: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A command line carried a CR or LF, which would split it into several downstream commands.
    #[error("Command line contains a line break: {0:?}")]
    MultiLineCommand(String),

    /// The named command stopped because of an ABORT.
    #[error("Command {0} was aborted")]
    Aborted(String),

    /// No handler is registered for the named command type.
    #[error("Unsupported command: {0}")]
    UnsupportedCommand(String),

    /// A JSON message could not be encoded or decoded.
    #[error("Message encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LiricError {
    /// Builds a `LocalProtocol` error for `reply`.
    pub fn parse(reply: impl Into<String>, reason: impl Into<String>) -> Self {
        LiricError::LocalProtocol {
            reply: reply.into(),
            reason: reason.into(),
        }
    }

    /// True for failures reported by the peer itself rather than by transport or parsing.
    pub fn is_downstream(&self) -> bool {
        matches!(self, LiricError::Downstream { .. })
    }
}

/// Per-site suffixes added to [`LIRIC_ERROR_CODE_BASE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorSite {
    /// ISS relay gave up because of an abort.
    RelayAborted = 1,
    /// ISS relay ended without a DONE.
    RelayNoCompletion = 2,
    /// Request carried no command.
    CommandMissing = 100,
    /// Request line did not parse.
    CommandMalformed = 101,
    /// Handler failed outside its own error handling.
    ProcessCommand = 102,
    /// Abort noticed at a checkpoint.
    AbortCheckpoint = 200,
    /// No handler for the command type.
    UnknownCommand = 400,
    /// DARK exposure failed.
    Dark = 600,
    /// BIAS exposure failed.
    Bias = 700,
    /// CONFIG carried no configuration.
    ConfigMissing = 800,
    /// CONFIG configuration is not a Liric configuration.
    ConfigWrongShape = 801,
    /// A downstream `config` command failed.
    ConfigDownstream = 804,
    /// OFFSET_FOCUS through the ISS failed.
    ConfigFocusOffset = 805,
    /// `focus.offset` missing or malformed.
    ConfigFocusProperty = 806,
    /// Config id counter could not be bumped.
    ConfigIdIncrement = 809,
    /// `multrun` failed downstream.
    Multrun = 902,
    /// `mirror_fold_position` missing or malformed.
    FoldPositionProperty = 1201,
    /// MOVE_FOLD through the ISS failed.
    FoldMove = 1202,
    /// FITS keyword has no value type.
    FitsMissingType = 1203,
    /// FITS keyword has an unrecognised value type.
    FitsUnknownType = 1204,
    /// GET_FITS through the ISS failed.
    FitsFromIss = 1205,
    /// A configured FITS keyword could not be sent.
    FitsAdd = 1206,
    /// An ISS FITS card could not be sent.
    FitsIssListAdd = 1207,
    /// REBOOT level outside 1..=4.
    RebootIllegalLevel = 1400,
    /// REBOOT action failed.
    RebootFailed = 1404,
    /// Downstream `abort` failed.
    Abort = 2400,
    /// Basic GET_STATUS query failed.
    GetStatusBasic = 2500,
    /// MULTBIAS exposure failed.
    Multbias = 2600,
    /// MULTDARK exposure failed.
    Multdark = 2700,
}

impl ErrorSite {
    /// Full error number as reported to clients.
    pub fn code(self) -> i32 {
        LIRIC_ERROR_CODE_BASE + self as i32
    }
}
