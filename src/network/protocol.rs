//! Upstream message protocol.
//!
//! Every message is one JSON object on its own line. A client sends one request per connection:
//!
//! ```text
//! {"id":"42","command":{"type":"MULTRUN","exposure_time":1000,"number_exposures":3}}
//! ```
//!
//! and receives any number of `ACKNOWLEDGE` replies followed by exactly one `DONE`. The same
//! framing is used in the other direction when the front end asks the ISS to move the fold
//! mirror, supply FITS headers or apply a focus offset.

use crate::error::{AppResult, ErrorSite, LiricError, LIRIC_ERROR_CODE_NO_ERROR};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Logical command types the front end can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandKind {
    /// ABORT
    Abort,
    /// CONFIG
    Config,
    /// BIAS
    Bias,
    /// DARK
    Dark,
    /// MULTRUN
    Multrun,
    /// MULTBIAS
    Multbias,
    /// MULTDARK
    Multdark,
    /// GET_STATUS
    GetStatus,
    /// REBOOT
    Reboot,
}

impl CommandKind {
    /// Every command type, in catalogue order.
    pub const ALL: [CommandKind; 9] = [
        CommandKind::Abort,
        CommandKind::Config,
        CommandKind::Bias,
        CommandKind::Dark,
        CommandKind::Multrun,
        CommandKind::Multbias,
        CommandKind::Multdark,
        CommandKind::GetStatus,
        CommandKind::Reboot,
    ];

    /// Wire name of the type.
    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::Abort => "ABORT",
            CommandKind::Config => "CONFIG",
            CommandKind::Bias => "BIAS",
            CommandKind::Dark => "DARK",
            CommandKind::Multrun => "MULTRUN",
            CommandKind::Multbias => "MULTBIAS",
            CommandKind::Multdark => "MULTDARK",
            CommandKind::GetStatus => "GET_STATUS",
            CommandKind::Reboot => "REBOOT",
        }
    }

    /// Interrupt-class commands run alongside the current command instead of becoming it.
    pub fn is_interrupt(self) -> bool {
        matches!(self, CommandKind::Abort | CommandKind::GetStatus)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandKind {
    type Err = LiricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CommandKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| LiricError::UnsupportedCommand(s.to_string()))
    }
}

/// Instrument configuration carried by CONFIG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Configuration name, recorded in process status.
    pub id: String,
    /// Filter to move into the beam.
    pub filter_name: String,
    /// Dither size between exposures.
    pub nudgematic_offset_size: crate::line_protocol::c_layer::NudgematicOffsetSize,
    /// Coadd exposure length in milliseconds.
    pub coadd_exposure_length: u32,
}

/// A command and its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    /// Stop the command running on another connection.
    Abort,
    /// Apply an instrument configuration.
    Config {
        /// Kept untyped until the CONFIG handler checks its shape.
        #[serde(default)]
        config: Option<serde_json::Value>,
    },
    /// One bias frame.
    Bias,
    /// One dark frame.
    Dark {
        /// Milliseconds.
        exposure_time: u32,
    },
    /// A science exposure series.
    Multrun {
        /// Milliseconds per exposure.
        exposure_time: u32,
        /// Exposures in the series.
        number_exposures: u32,
        /// Whether the frames are of a photometric standard.
        #[serde(default)]
        standard: bool,
    },
    /// A series of bias frames.
    Multbias {
        /// Frames in the series.
        number_exposures: u32,
    },
    /// A series of dark frames.
    Multdark {
        /// Milliseconds per frame.
        exposure_time: u32,
        /// Frames in the series.
        number_exposures: u32,
    },
    /// Report instrument status.
    GetStatus {
        /// 0 basic, 1 intermediate, 2 full.
        #[serde(default)]
        level: u8,
    },
    /// Reload, restart, reboot or power off.
    Reboot {
        /// 1 REDATUM, 2 SOFTWARE, 3 HARDWARE, 4 POWER_OFF.
        level: u8,
    },
    /// A type this front end has no variant for.
    #[serde(skip)]
    Unknown {
        /// Type name as received.
        type_name: String,
    },
}

impl Command {
    /// `None` for commands of an unknown type.
    pub fn kind(&self) -> Option<CommandKind> {
        Some(match self {
            Command::Abort => CommandKind::Abort,
            Command::Config { .. } => CommandKind::Config,
            Command::Bias => CommandKind::Bias,
            Command::Dark { .. } => CommandKind::Dark,
            Command::Multrun { .. } => CommandKind::Multrun,
            Command::Multbias { .. } => CommandKind::Multbias,
            Command::Multdark { .. } => CommandKind::Multdark,
            Command::GetStatus { .. } => CommandKind::GetStatus,
            Command::Reboot { .. } => CommandKind::Reboot,
            Command::Unknown { .. } => return None,
        })
    }

    /// Wire name, including unknown type names as received.
    pub fn type_name(&self) -> &str {
        match self {
            Command::Unknown { type_name } => type_name,
            other => other.kind().map_or("UNKNOWN", CommandKind::as_str),
        }
    }

    /// ABORT and GET_STATUS may run alongside another command.
    pub fn is_interrupt(&self) -> bool {
        self.kind().is_some_and(CommandKind::is_interrupt)
    }
}

/// One identified request read from a client connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundCommand {
    /// Client-supplied id, echoed on every reply.
    pub id: String,
    /// The command itself.
    pub command: Command,
}

impl InboundCommand {
    /// Pairs an id with a command.
    pub fn new(id: impl Into<String>, command: Command) -> Self {
        Self {
            id: id.into(),
            command,
        }
    }
}

/// Why a request line could not become an [`InboundCommand`].
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRequest {
    /// The request id if it could be recovered, else `"unknown"`.
    pub id: String,
    /// Reported error site.
    pub site: ErrorSite,
    /// Why the request was refused.
    pub message: String,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    command: Option<serde_json::Value>,
}

/// Parses one request line.
///
/// The type tag is read before the payload so that a well-formed request of an unknown type
/// still reaches the fallback handler with its id and type name.
pub fn parse_request(line: &str) -> Result<InboundCommand, RejectedRequest> {
    let reject = |id: String, site: ErrorSite, message: String| RejectedRequest { id, site, message };

    let envelope: Envelope = serde_json::from_str(line.trim()).map_err(|e| {
        reject(
            "unknown".to_string(),
            ErrorSite::CommandMalformed,
            format!("Failed to read command: {e}"),
        )
    })?;

    let id = match envelope.id {
        Some(serde_json::Value::String(s)) => s,
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => {
            return Err(reject(
                "unknown".to_string(),
                ErrorSite::CommandMalformed,
                "Command has no id".to_string(),
            ))
        }
    };

    let command_value = match envelope.command {
        Some(value) if !value.is_null() => value,
        _ => {
            return Err(reject(
                id,
                ErrorSite::CommandMissing,
                "Command was null".to_string(),
            ))
        }
    };

    let Some(type_name) = command_value.get("type").and_then(|t| t.as_str()) else {
        return Err(reject(
            id,
            ErrorSite::CommandMalformed,
            "Command has no type".to_string(),
        ));
    };

    if type_name.parse::<CommandKind>().is_err() {
        return Ok(InboundCommand::new(
            id,
            Command::Unknown {
                type_name: type_name.to_string(),
            },
        ));
    }

    match serde_json::from_value::<Command>(command_value) {
        Ok(command) => Ok(InboundCommand::new(id, command)),
        Err(e) => Err(reject(
            id,
            ErrorSite::CommandMalformed,
            format!("Failed to read command: {e}"),
        )),
    }
}

// Replies

/// Advisory: the command needs `time_to_complete` more milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    /// Milliseconds the client should wait for the next reply.
    pub time_to_complete: u64,
}

/// Terminal reply to a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    /// Whether the command did what was asked.
    pub successful: bool,
    /// Zero on success, otherwise an [`ErrorSite`] code or a relayed peer code.
    pub error_num: i32,
    /// Human readable failure, empty on success.
    pub error_string: String,
    /// Command specific payload.
    #[serde(default)]
    pub result: Option<CommandResult>,
}

impl Completion {
    /// A successful completion.
    pub fn success(result: Option<CommandResult>) -> Self {
        Self {
            successful: true,
            error_num: LIRIC_ERROR_CODE_NO_ERROR,
            error_string: String::new(),
            result,
        }
    }

    /// A failure reported at `site`.
    pub fn failure(site: ErrorSite, message: impl Into<String>) -> Self {
        Self::failure_code(site.code(), message)
    }

    /// A failure with a raw error number, as relayed from a peer.
    pub fn failure_code(error_num: i32, message: impl Into<String>) -> Self {
        Self {
            successful: false,
            error_num,
            error_string: message.into(),
            result: None,
        }
    }

    /// Attaches a payload.
    pub fn with_result(mut self, result: CommandResult) -> Self {
        self.result = Some(result);
        self
    }
}

/// Command specific completion payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandResult {
    /// MULTRUN
    Multrun(MultrunResult),
    /// BIAS, DARK, MULTBIAS and MULTDARK.
    Calibration {
        /// Last file written.
        filename: String,
    },
    /// GET_STATUS
    Status(StatusResult),
    /// ISS GET_FITS
    FitsHeaders {
        /// Cards in the order the ISS sent them.
        cards: Vec<FitsCard>,
    },
}

/// MULTRUN outcome. Only `filename` is filled in; the quality fields stay zero.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MultrunResult {
    /// Last file written.
    pub filename: String,
    /// Seeing in arcseconds.
    pub seeing: f32,
    /// Peak counts.
    pub counts: f32,
    /// Brightest object x pixel.
    pub xpix: f32,
    /// Brightest object y pixel.
    pub ypix: f32,
    /// Photometricity estimate.
    pub photometricity: f32,
    /// Sky brightness estimate.
    pub sky_brightness: f32,
    /// Whether any pixel saturated.
    pub saturation: bool,
}

/// Whether a multrun is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CurrentMode {
    /// No exposure running.
    Idle,
    /// Exposure in progress.
    Exposing,
}

/// GET_STATUS payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResult {
    /// Idle or exposing.
    pub current_mode: CurrentMode,
    /// Status keyword to value.
    pub display_info: BTreeMap<String, StatusValue>,
}

/// A typed GET_STATUS value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusValue {
    /// Flag
    Bool(bool),
    /// Whole number
    Integer(i64),
    /// Real number
    Double(f64),
    /// Point in time
    Timestamp(DateTime<Utc>),
    /// Free text
    Text(String),
}

impl From<bool> for StatusValue {
    fn from(value: bool) -> Self {
        StatusValue::Bool(value)
    }
}

impl From<i32> for StatusValue {
    fn from(value: i32) -> Self {
        StatusValue::Integer(i64::from(value))
    }
}

impl From<i64> for StatusValue {
    fn from(value: i64) -> Self {
        StatusValue::Integer(value)
    }
}

impl From<u64> for StatusValue {
    fn from(value: u64) -> Self {
        StatusValue::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for StatusValue {
    fn from(value: f64) -> Self {
        StatusValue::Double(value)
    }
}

impl From<DateTime<Utc>> for StatusValue {
    fn from(value: DateTime<Utc>) -> Self {
        StatusValue::Timestamp(value)
    }
}

impl From<String> for StatusValue {
    fn from(value: String) -> Self {
        StatusValue::Text(value)
    }
}

impl From<&str> for StatusValue {
    fn from(value: &str) -> Self {
        StatusValue::Text(value.to_string())
    }
}

/// A typed FITS header value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FitsValue {
    /// `boolean`
    Boolean(bool),
    /// `integer`
    Integer(i64),
    /// `float`
    Float(f64),
    /// `string`
    String(String),
}

impl FitsValue {
    /// Type word used by `fitsheader add`.
    pub fn type_name(&self) -> &'static str {
        match self {
            FitsValue::Boolean(_) => "boolean",
            FitsValue::Integer(_) => "integer",
            FitsValue::Float(_) => "float",
            FitsValue::String(_) => "string",
        }
    }

    /// Value as written on a `fitsheader add` line.
    pub fn to_line_argument(&self) -> String {
        match self {
            FitsValue::Boolean(b) => b.to_string(),
            FitsValue::Integer(i) => i.to_string(),
            FitsValue::Float(f) => f.to_string(),
            FitsValue::String(s) => s.clone(),
        }
    }

    /// Parses a configured value according to its configured type word.
    pub fn from_typed(type_name: &str, raw: &str) -> AppResult<Self> {
        let bad = |e: String| {
            LiricError::Configuration(format!("invalid {type_name} FITS value '{raw}': {e}"))
        };
        match type_name {
            "string" => Ok(FitsValue::String(raw.to_string())),
            "integer" => raw
                .trim()
                .parse()
                .map(FitsValue::Integer)
                .map_err(|e| bad(e.to_string())),
            "float" => raw
                .trim()
                .parse()
                .map(FitsValue::Float)
                .map_err(|e| bad(e.to_string())),
            "boolean" => match raw.trim() {
                "true" => Ok(FitsValue::Boolean(true)),
                "false" => Ok(FitsValue::Boolean(false)),
                other => Err(bad(format!("'{other}' is not true or false"))),
            },
            other => Err(LiricError::Configuration(format!(
                "unknown FITS value type '{other}'"
            ))),
        }
    }

    /// Whether `type_name` is one of the four FITS value types.
    pub fn is_known_type(type_name: &str) -> bool {
        matches!(type_name, "string" | "integer" | "float" | "boolean")
    }
}

/// One FITS header keyword with optional comment and units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitsCard {
    /// FITS keyword.
    pub keyword: String,
    /// Typed value.
    pub value: FitsValue,
    /// Card comment, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Value units, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
}

/// A reply line as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reply {
    /// More time is needed.
    Acknowledge {
        /// Id of the command acknowledged.
        id: String,
        /// Time requested.
        #[serde(flatten)]
        acknowledgement: Acknowledgement,
    },
    /// Final reply for a command.
    Done {
        /// Id of the command completed.
        id: String,
        /// Outcome.
        #[serde(flatten)]
        completion: Completion,
    },
}

impl Reply {
    /// Id of the command this reply belongs to.
    pub fn id(&self) -> &str {
        match self {
            Reply::Acknowledge { id, .. } | Reply::Done { id, .. } => id,
        }
    }
}

// ISS sub-requests

/// Requests the front end sends to the ISS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssCommand {
    /// Move the fold mirror.
    MoveFold {
        /// Fold mirror position number.
        mirror_position: i32,
    },
    /// Fetch telescope FITS cards.
    GetFits,
    /// Apply a focus offset, in millimetres.
    OffsetFocus {
        /// Millimetres.
        focus_offset: f32,
    },
}

impl IssCommand {
    /// Wire name of the request.
    pub fn name(&self) -> &'static str {
        match self {
            IssCommand::MoveFold { .. } => "MOVE_FOLD",
            IssCommand::GetFits => "GET_FITS",
            IssCommand::OffsetFocus { .. } => "OFFSET_FOCUS",
        }
    }
}

/// One line sent to the ISS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssRequest {
    /// Fresh id per request.
    pub id: String,
    /// The request.
    pub command: IssCommand,
}

/// Serializes `message` as one newline-terminated line.
pub fn encode_line<T: Serialize>(message: &T) -> AppResult<String> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

/// Parses one ISS reply line.
pub fn decode_reply(line: &str) -> AppResult<Reply> {
    Ok(serde_json::from_str(line.trim())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multrun_request_parses() {
        let parsed = parse_request(
            r#"{"id":"7","command":{"type":"MULTRUN","exposure_time":1000,"number_exposures":3}}"#,
        )
        .unwrap();
        assert_eq!(parsed.id, "7");
        assert_eq!(
            parsed.command,
            Command::Multrun {
                exposure_time: 1000,
                number_exposures: 3,
                standard: false
            }
        );
        assert!(!parsed.command.is_interrupt());
    }

    #[test]
    fn unknown_type_keeps_id_and_name() {
        let parsed = parse_request(r#"{"id":12,"command":{"type":"TWILIGHT_CALIBRATE"}}"#).unwrap();
        assert_eq!(parsed.id, "12");
        assert_eq!(parsed.command.kind(), None);
        assert_eq!(parsed.command.type_name(), "TWILIGHT_CALIBRATE");
    }

    #[test]
    fn rejected_requests_carry_their_error_site() {
        let garbage = parse_request("not json").unwrap_err();
        assert_eq!(garbage.id, "unknown");
        assert_eq!(garbage.site, ErrorSite::CommandMalformed);

        let missing = parse_request(r#"{"id":"3","command":null}"#).unwrap_err();
        assert_eq!(missing.id, "3");
        assert_eq!(missing.site, ErrorSite::CommandMissing);

        let bad_payload =
            parse_request(r#"{"id":"4","command":{"type":"DARK","exposure_time":"long"}}"#)
                .unwrap_err();
        assert_eq!(bad_payload.id, "4");
        assert_eq!(bad_payload.site, ErrorSite::CommandMalformed);
    }

    #[test]
    fn interrupt_class_is_abort_and_get_status() {
        let interrupts: Vec<_> = CommandKind::ALL
            .into_iter()
            .filter(|k| k.is_interrupt())
            .collect();
        assert_eq!(interrupts, vec![CommandKind::Abort, CommandKind::GetStatus]);
    }

    #[test]
    fn acknowledge_wire_form_is_flat() {
        let reply = Reply::Acknowledge {
            id: "9".into(),
            acknowledgement: Acknowledgement {
                time_to_complete: 4560,
            },
        };
        let line = encode_line(&reply).unwrap();
        assert!(line.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["type"], "ACKNOWLEDGE");
        assert_eq!(value["time_to_complete"], 4560);
    }

    #[test]
    fn done_with_fits_cards_decodes() {
        let line = r#"{"type":"DONE","id":"x","successful":true,"error_num":0,"error_string":"",
            "result":{"type":"FITS_HEADERS","cards":[
                {"keyword":"RA","value":"12:00:00","comment":"Right ascension"},
                {"keyword":"AIRMASS","value":1.2},
                {"keyword":"ROTSKYPA","value":45,"units":"degrees"}]}}"#
            .replace('\n', "");
        let reply = decode_reply(&line).unwrap();
        let Reply::Done { completion, .. } = reply else {
            panic!("expected DONE");
        };
        let Some(CommandResult::FitsHeaders { cards }) = completion.result else {
            panic!("expected FITS_HEADERS result");
        };
        assert_eq!(cards.len(), 3);
        assert_eq!(cards[1].value, FitsValue::Float(1.2));
        assert_eq!(cards[2].value, FitsValue::Integer(45));
        assert_eq!(cards[2].units.as_deref(), Some("degrees"));
    }

    #[test]
    fn configured_fits_values_are_typed() {
        assert_eq!(
            FitsValue::from_typed("integer", "2").unwrap(),
            FitsValue::Integer(2)
        );
        assert!(matches!(
            FitsValue::from_typed("integer", "two"),
            Err(LiricError::Configuration(_))
        ));
        assert!(!FitsValue::is_known_type("complex"));
        assert!(FitsValue::from_typed("complex", "1+i").is_err());
    }
}
