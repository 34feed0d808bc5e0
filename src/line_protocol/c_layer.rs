//! Typed wrappers for every command the C layer understands.

use super::client::LineCommandClient;
use super::reply::{TemperatureReading, Timestamp};
use crate::config::Settings;
use crate::error::{AppResult, LiricError};
use crate::network::protocol::FitsValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Offset size the nudgematic dithers by between exposures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NudgematicOffsetSize {
    /// Nudgematic parked.
    None,
    /// Small dither pattern.
    Small,
    /// Large dither pattern.
    Large,
}

impl NudgematicOffsetSize {
    /// Argument for `config nudgematic`. Only small and large offsets can be configured.
    fn config_argument(self) -> AppResult<&'static str> {
        match self {
            NudgematicOffsetSize::Small => Ok("small"),
            NudgematicOffsetSize::Large => Ok("large"),
            NudgematicOffsetSize::None => Err(LiricError::Configuration(format!(
                "illegal nudgematic offset size '{self}'"
            ))),
        }
    }
}

impl fmt::Display for NudgematicOffsetSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NudgematicOffsetSize::None => "none",
            NudgematicOffsetSize::Small => "small",
            NudgematicOffsetSize::Large => "large",
        };
        f.write_str(name)
    }
}

/// Argument for `config coadd_exp_len`: the detector supports 100 ms and 1000 ms coadds.
pub fn coadd_length_argument(coadd_exposure_length_ms: u32) -> AppResult<&'static str> {
    match coadd_exposure_length_ms {
        100 => Ok("short"),
        1000 => Ok("long"),
        other => Err(LiricError::Configuration(format!(
            "illegal coadd exposure length {other} ms (must be 100 or 1000)"
        ))),
    }
}

/// The hardware-controlling process, spoken to with one line command per call.
#[derive(Debug, Clone)]
pub struct CLayer {
    client: LineCommandClient,
}

impl CLayer {
    /// Wraps an existing client.
    pub fn new(client: LineCommandClient) -> Self {
        Self { client }
    }

    /// Client for `[c_layer]`, bounded by `timeout_ms` when set.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            LineCommandClient::new(settings.c_layer.hostname.clone(), settings.c_layer.port_number)
                .with_timeout(settings.c_layer_timeout()),
        )
    }

    /// The underlying line client.
    pub fn client(&self) -> &LineCommandClient {
        &self.client
    }

    // Exposure control

    /// Runs `count` exposures of `length_ms`. Returns the `<count> <run> <filename>` payload.
    pub async fn multrun(&self, length_ms: u32, count: u32, standard: bool) -> AppResult<String> {
        self.client
            .send_ok(&format!("multrun {length_ms} {count} {standard}"))
            .await
    }

    /// Reads out `count` bias frames. Returns the same payload shape as [`CLayer::multrun`].
    pub async fn multbias(&self, count: u32) -> AppResult<String> {
        self.client.send_ok(&format!("multbias {count}")).await
    }

    /// Takes `count` dark frames of `length_ms`.
    pub async fn multdark(&self, length_ms: u32, count: u32) -> AppResult<String> {
        self.client
            .send_ok(&format!("multdark {length_ms} {count}"))
            .await
    }

    /// Stops the exposure in progress.
    pub async fn abort(&self) -> AppResult<()> {
        self.client.send_ok("abort").await.map(|_| ())
    }

    /// Stops the C layer process.
    pub async fn shutdown(&self) -> AppResult<()> {
        self.client.send_ok("shutdown").await.map(|_| ())
    }

    // Configuration

    /// Moves the filter wheel to `filter_name`.
    pub async fn config_filter(&self, filter_name: &str) -> AppResult<()> {
        self.client
            .send_ok(&format!("config filter {filter_name}"))
            .await
            .map(|_| ())
    }

    /// Sets the nudgematic offset size. `None` is refused locally.
    pub async fn config_nudgematic(&self, size: NudgematicOffsetSize) -> AppResult<()> {
        let argument = size.config_argument()?;
        self.client
            .send_ok(&format!("config nudgematic {argument}"))
            .await
            .map(|_| ())
    }

    /// Sets the coadd length. Only 100 and 1000 ms are sent.
    pub async fn config_coadd_exposure_length(&self, length_ms: u32) -> AppResult<()> {
        let argument = coadd_length_argument(length_ms)?;
        self.client
            .send_ok(&format!("config coadd_exp_len {argument}"))
            .await
            .map(|_| ())
    }

    // FITS headers

    /// Adds or replaces `keyword` with a typed value.
    pub async fn fits_header_add(&self, keyword: &str, value: &FitsValue) -> AppResult<()> {
        let command = format!(
            "fitsheader add {keyword} {} {}",
            value.type_name(),
            value.to_line_argument()
        );
        self.client.send_ok(&command).await.map(|_| ())
    }

    /// Attaches a comment to an existing keyword.
    pub async fn fits_header_add_comment(&self, keyword: &str, comment: &str) -> AppResult<()> {
        self.client
            .send_ok(&format!("fitsheader add {keyword} comment {comment}"))
            .await
            .map(|_| ())
    }

    /// Attaches units to an existing keyword.
    pub async fn fits_header_add_units(&self, keyword: &str, units: &str) -> AppResult<()> {
        self.client
            .send_ok(&format!("fitsheader add {keyword} units {units}"))
            .await
            .map(|_| ())
    }

    /// Removes one keyword.
    pub async fn fits_header_delete(&self, keyword: &str) -> AppResult<()> {
        self.client
            .send_ok(&format!("fitsheader delete {keyword}"))
            .await
            .map(|_| ())
    }

    /// Removes every keyword.
    pub async fn fits_header_clear(&self) -> AppResult<()> {
        self.client.send_ok("fitsheader clear").await.map(|_| ())
    }

    // Status queries

    /// True while a multrun is in progress.
    pub async fn exposure_status(&self) -> AppResult<bool> {
        self.client.query("status exposure status").await
    }

    /// Exposures in the current multrun.
    pub async fn exposure_count(&self) -> AppResult<i32> {
        self.client.query("status exposure count").await
    }

    /// Exposure length in milliseconds.
    pub async fn exposure_length(&self) -> AppResult<i32> {
        self.client.query("status exposure length").await
    }

    /// Start of the current exposure.
    pub async fn exposure_start_time(&self) -> AppResult<Timestamp> {
        self.client.query("status exposure start_time").await
    }

    /// Index of the current exposure within the multrun.
    pub async fn exposure_index(&self) -> AppResult<i32> {
        self.client.query("status exposure index").await
    }

    /// Coadds per exposure.
    pub async fn exposure_coadd_count(&self) -> AppResult<i32> {
        self.client.query("status exposure coadd-count").await
    }

    /// Coadd length in milliseconds.
    pub async fn exposure_coadd_length(&self) -> AppResult<i32> {
        self.client.query("status exposure coadd-length").await
    }

    /// Multrun number used in filenames.
    pub async fn exposure_multrun(&self) -> AppResult<i32> {
        self.client.query("status exposure multrun").await
    }

    /// Run number used in filenames.
    pub async fn exposure_run(&self) -> AppResult<i32> {
        self.client.query("status exposure run").await
    }

    /// Name of the filter in the beam.
    pub async fn filter_wheel_filter(&self) -> AppResult<String> {
        self.client.query("status filterwheel filter").await
    }

    /// Filter wheel position number.
    pub async fn filter_wheel_position(&self) -> AppResult<i32> {
        self.client.query("status filterwheel position").await
    }

    /// Filter wheel state word.
    pub async fn filter_wheel_status(&self) -> AppResult<String> {
        self.client.query("status filterwheel status").await
    }

    /// Nudgematic position number.
    pub async fn nudgematic_position(&self) -> AppResult<i32> {
        self.client.query("status nudgematic position").await
    }

    /// Nudgematic state word.
    pub async fn nudgematic_status(&self) -> AppResult<String> {
        self.client.query("status nudgematic status").await
    }

    /// Configured nudgematic offset size.
    pub async fn nudgematic_offset_size(&self) -> AppResult<String> {
        self.client.query("status nudgematic offsetsize").await
    }

    /// Detector temperature and when it was measured.
    pub async fn temperature(&self) -> AppResult<TemperatureReading> {
        self.client.query("status temperature get").await
    }
}
