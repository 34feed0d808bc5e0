//! Reply lines from line protocol peers and their typed payloads.

use crate::error::{AppResult, LiricError};
use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::debug;

/// One parsed reply line: `<status> <payload>`.
#[derive(Debug, Clone, PartialEq)]
pub struct LineReply {
    /// The line as received, without its terminator.
    pub raw: String,
    /// Zero on success.
    pub status: i32,
    /// Everything after the status, trimmed.
    pub payload: String,
}

impl LineReply {
    /// Splits a raw reply line into its status code and payload.
    ///
    /// A missing or non-numeric leading token is a local protocol error.
    pub fn parse(raw: &str) -> AppResult<Self> {
        let line = raw.trim_end_matches(['\r', '\n']);
        let trimmed = line.trim_start();
        let (status_token, payload) = match trimmed.split_once(char::is_whitespace) {
            Some((status, rest)) => (status, rest.trim()),
            None => (trimmed, ""),
        };
        if status_token.is_empty() {
            return Err(LiricError::parse(line, "empty reply"));
        }
        let status = status_token.parse::<i32>().map_err(|e| {
            LiricError::parse(line, format!("status '{status_token}' is not an integer: {e}"))
        })?;
        Ok(Self {
            raw: line.to_string(),
            status,
            payload: payload.to_string(),
        })
    }

    /// Whether the status is zero.
    pub fn is_ok(&self) -> bool {
        self.status == 0
    }

    /// Success payload, or a downstream error carrying the peer's code and message.
    pub fn into_payload(self, command: &str) -> AppResult<String> {
        if self.is_ok() {
            Ok(self.payload)
        } else {
            Err(LiricError::Downstream {
                command: command.to_string(),
                code: self.status,
                message: self.payload,
            })
        }
    }

    /// Converts a success payload into `T`.
    ///
    /// A nonzero status is always a downstream error. A zero status whose payload does not
    /// convert is a local protocol error.
    pub fn value<T: FromReply>(self, command: &str) -> AppResult<T> {
        let raw = self.raw.clone();
        let payload = self.into_payload(command)?;
        T::from_payload(&payload).map_err(|reason| LiricError::parse(raw, reason))
    }
}

/// Types a success payload can be converted into.
pub trait FromReply: Sized {
    /// Converts `payload`, or explains why it does not convert.
    fn from_payload(payload: &str) -> Result<Self, String>;
}

impl FromReply for String {
    fn from_payload(payload: &str) -> Result<Self, String> {
        Ok(payload.to_string())
    }
}

impl FromReply for i32 {
    fn from_payload(payload: &str) -> Result<Self, String> {
        payload
            .trim()
            .parse()
            .map_err(|e| format!("Failed to parse integer data '{payload}': {e}"))
    }
}

impl FromReply for f64 {
    fn from_payload(payload: &str) -> Result<Self, String> {
        payload
            .trim()
            .parse()
            .map_err(|e| format!("Failed to parse double data '{payload}': {e}"))
    }
}

impl FromReply for bool {
    fn from_payload(payload: &str) -> Result<Self, String> {
        match payload.trim() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(format!("Failed to parse boolean data '{other}'")),
        }
    }
}

/// A `YYYY-MM-DDTHH:MM:SS.sss <zone>` timestamp from the C layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp(pub DateTime<Utc>);

impl FromReply for Timestamp {
    fn from_payload(payload: &str) -> Result<Self, String> {
        let mut tokens = payload.split_whitespace();
        let date_time = tokens
            .next()
            .ok_or_else(|| "missing timestamp".to_string())?;
        let zone = tokens.next().unwrap_or("UTC");
        parse_date_time(date_time, zone).map(Timestamp)
    }
}

/// Detector temperature in degrees centigrade and when it was measured.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureReading {
    /// When the reading was taken.
    pub timestamp: DateTime<Utc>,
    /// Degrees centigrade.
    pub celsius: f64,
}

impl FromReply for TemperatureReading {
    fn from_payload(payload: &str) -> Result<Self, String> {
        let tokens: Vec<&str> = payload.split_whitespace().collect();
        if tokens.len() < 3 {
            return Err(format!(
                "temperature reply needs '<timestamp> <zone> <temperature>', got '{payload}'"
            ));
        }
        let timestamp = parse_date_time(tokens[0], tokens[1])?;
        let celsius = tokens[2]
            .parse::<f64>()
            .map_err(|e| format!("Failed to parse temperature '{}': {e}", tokens[2]))?;
        Ok(Self { timestamp, celsius })
    }
}

fn parse_date_time(date_time: &str, zone: &str) -> Result<DateTime<Utc>, String> {
    let naive = NaiveDateTime::parse_from_str(date_time, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|e| format!("Failed to parse timestamp '{date_time}': {e}"))?;
    if !matches!(zone, "UTC" | "GMT" | "Z") {
        // Unrecognised zones are read as UTC.
        debug!(zone, "Treating timestamp zone as UTC");
    }
    Ok(DateTime::from_naive_utc_and_offset(naive, Utc))
}
