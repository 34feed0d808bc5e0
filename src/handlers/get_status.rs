//! GET_STATUS: a key/value snapshot of the instrument at one of three levels of detail.
//!
//! The basic level must be complete or the command fails, returning whatever was gathered.
//! Intermediate and full sections are best effort: a failed query is logged and its keys are
//! left out.

use super::{wrong_command, CommandHandler, HandlerContext};
use crate::config::{parse_property, TemperatureBounds};
use crate::error::{AppResult, ErrorSite};
use crate::logging;
use crate::network::protocol::{
    Command, CommandKind, CommandResult, Completion, CurrentMode, InboundCommand, StatusResult,
    StatusValue,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::fmt;
use sysinfo::{MemoryRefreshKind, RefreshKind, System};
use tracing::{debug, error};

/// Exposure and filter wheel state only.
pub const LEVEL_BASIC: u8 = 0;
/// Adds temperature, nudgematic and health.
pub const LEVEL_INTERMEDIATE: u8 = 1;
/// Adds host and process details.
pub const LEVEL_FULL: u8 = 2;

/// Overall health keyword.
pub const KEYWORD_INSTRUMENT_STATUS: &str = "Instrument Status";
/// Detector temperature health keyword.
pub const KEYWORD_DETECTOR_TEMPERATURE_INSTRUMENT_STATUS: &str =
    "Detector Temperature Instrument Status";

const CENTIGRADE_TO_KELVIN: f64 = 273.15;

/// Health of one subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HealthStatus {
    /// Not checked yet.
    Unknown,
    /// Within limits.
    Ok,
    /// Outside the warning limits.
    Warn,
    /// Outside the failure limits.
    Fail,
}

impl HealthStatus {
    /// Value as reported by GET_STATUS.
    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Unknown => "UNKNOWN",
            HealthStatus::Ok => "OK",
            HealthStatus::Warn => "WARN",
            HealthStatus::Fail => "FAIL",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Warm and cold limits for the detector, in degrees centigrade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureLimits {
    /// Warmer than this is WARN.
    pub warm_warn: f64,
    /// Warmer than this is FAIL.
    pub warm_fail: f64,
    /// Colder than this is WARN.
    pub cold_warn: f64,
    /// Colder than this is FAIL.
    pub cold_fail: f64,
}

impl TemperatureLimits {
    /// All four limits are required.
    pub fn from_settings(bounds: &TemperatureBounds) -> AppResult<Self> {
        let key = "get_status.detector_temperature";
        Ok(Self {
            warm_warn: parse_property(&format!("{key}.warm_warn"), bounds.warm_warn.as_deref())?,
            warm_fail: parse_property(&format!("{key}.warm_fail"), bounds.warm_fail.as_deref())?,
            cold_warn: parse_property(&format!("{key}.cold_warn"), bounds.cold_warn.as_deref())?,
            cold_fail: parse_property(&format!("{key}.cold_fail"), bounds.cold_fail.as_deref())?,
        })
    }

    /// Fail limits are checked before warn limits on each side.
    pub fn classify(&self, celsius: f64) -> HealthStatus {
        if celsius > self.warm_fail {
            HealthStatus::Fail
        } else if celsius > self.warm_warn {
            HealthStatus::Warn
        } else if celsius < self.cold_fail {
            HealthStatus::Fail
        } else if celsius < self.cold_warn {
            HealthStatus::Warn
        } else {
            HealthStatus::Ok
        }
    }
}

/// Instrument status derived from its subsystems: never better than the worst of them.
pub fn instrument_status(subsystems: &[HealthStatus]) -> HealthStatus {
    subsystems
        .iter()
        .copied()
        .filter(|status| matches!(status, HealthStatus::Warn | HealthStatus::Fail))
        .max()
        .unwrap_or(HealthStatus::Ok)
}

type DisplayInfo = BTreeMap<String, StatusValue>;

fn put(info: &mut DisplayInfo, key: &str, value: impl Into<StatusValue>) {
    info.insert(key.to_string(), value.into());
}

/// GET_STATUS handler.
#[derive(Debug, Default)]
pub struct GetStatusHandler;

impl GetStatusHandler {
    /// Keys every level reports. Stops at the first failed query.
    async fn basic(
        ctx: &HandlerContext,
        info: &mut DisplayInfo,
        mode: &mut CurrentMode,
    ) -> AppResult<()> {
        let c_layer = &ctx.c_layer;
        let exposing = c_layer.exposure_status().await?;
        *mode = if exposing {
            CurrentMode::Exposing
        } else {
            CurrentMode::Idle
        };
        put(info, "Multrun In Progress", exposing);
        put(info, "Instrument", ctx.settings.instrument.name.as_str());
        put(
            info,
            KEYWORD_DETECTOR_TEMPERATURE_INSTRUMENT_STATUS,
            HealthStatus::Unknown.as_str(),
        );
        put(info, KEYWORD_INSTRUMENT_STATUS, HealthStatus::Unknown.as_str());
        let current = ctx
            .status()
            .current_command()
            .map(|active| active.kind.as_str())
            .unwrap_or("");
        put(info, "currentCommand", current);

        put(info, "Filter Wheel:1", c_layer.filter_wheel_filter().await?);
        put(info, "Filter Wheel Position:1", c_layer.filter_wheel_position().await?);
        put(info, "Filter Wheel Status:1", c_layer.filter_wheel_status().await?);

        put(info, "Exposure Count", c_layer.exposure_count().await?);
        let exposure_length = c_layer.exposure_length().await?;
        put(info, "Exposure Length", exposure_length);
        let started = c_layer.exposure_start_time().await?.0;
        put(info, "Exposure Start Time", started.timestamp_millis());
        put(info, "Exposure Start Time Date", started);
        put(
            info,
            "Elapsed Exposure Time",
            (Utc::now() - started).num_milliseconds(),
        );
        let index = c_layer.exposure_index().await?;
        put(info, "Exposure Index", index);
        put(info, "Exposure Number", index);
        put(info, "Coadd Exposure Count", c_layer.exposure_coadd_count().await?);
        put(info, "Coadd Exposure Length", c_layer.exposure_coadd_length().await?);
        put(info, "Exposure Multrun", c_layer.exposure_multrun().await?);
        put(info, "Exposure Run", c_layer.exposure_run().await?);
        Ok(())
    }

    /// Detector temperature and nudgematic state, then the derived instrument status.
    async fn intermediate(ctx: &HandlerContext, info: &mut DisplayInfo) {
        let mut detector = HealthStatus::Unknown;
        match Self::temperature(ctx, info).await {
            Ok(status) => detector = status,
            Err(e) => error!("Retrieving temperature status failed: {e}"),
        }
        put(info, KEYWORD_DETECTOR_TEMPERATURE_INSTRUMENT_STATUS, detector.as_str());

        if let Err(e) = Self::nudgematic(ctx, info).await {
            error!("Retrieving nudgematic status failed: {e}");
        }
        put(
            info,
            KEYWORD_INSTRUMENT_STATUS,
            instrument_status(&[detector]).as_str(),
        );
    }

    async fn temperature(ctx: &HandlerContext, info: &mut DisplayInfo) -> AppResult<HealthStatus> {
        let reading = ctx.c_layer.temperature().await?;
        put(info, "Temperature", reading.celsius + CENTIGRADE_TO_KELVIN);
        put(info, "Temperature Timestamp", reading.timestamp);
        let limits = TemperatureLimits::from_settings(&ctx.settings.get_status.detector_temperature)?;
        let status = limits.classify(reading.celsius);
        debug!(celsius = reading.celsius, %status, "Detector temperature");
        Ok(status)
    }

    async fn nudgematic(ctx: &HandlerContext, info: &mut DisplayInfo) -> AppResult<()> {
        let c_layer = &ctx.c_layer;
        put(info, "Nudgematic Position", c_layer.nudgematic_position().await?);
        put(info, "Nudgematic Status", c_layer.nudgematic_status().await?);
        put(info, "Nudgematic Offset Size", c_layer.nudgematic_offset_size().await?);
        Ok(())
    }

    /// Host information: log level, disk, processes, uptime, memory and OS identity.
    async fn full(info: &mut DisplayInfo) {
        put(info, "Log Level", logging::current_level());
        put(info, "Disk Usage", run_host_command("df", &["-k"]).await);
        put(
            info,
            "Process List",
            run_host_command("ps", &["-e", "-o", "pid,pcpu,vsz,ruser,stime,time,args"]).await,
        );
        put(info, "Uptime", run_host_command("uptime", &[]).await);

        let system = System::new_with_specifics(
            RefreshKind::nothing().with_memory(MemoryRefreshKind::everything()),
        );
        put(info, "Free Memory", system.free_memory());
        put(info, "Total Memory", system.total_memory());

        put(info, "os.name", System::name().unwrap_or_default());
        put(info, "os.arch", std::env::consts::ARCH);
        put(info, "os.version", System::os_version().unwrap_or_default());
        let host = hostname::get()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        put(info, "hostname", host);
        put(info, "user.name", std::env::var("USER").unwrap_or_default());
        let dir = std::env::current_dir()
            .map(|dir| dir.display().to_string())
            .unwrap_or_default();
        put(info, "user.dir", dir);
    }
}

/// Output of a host command, or the reason it could not be run.
async fn run_host_command(program: &str, args: &[&str]) -> String {
    match tokio::process::Command::new(program).args(args).output().await {
        Ok(output) if output.status.success() => {
            String::from_utf8_lossy(&output.stdout).into_owned()
        }
        Ok(output) => format!(
            "{program} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ),
        Err(e) => format!("{program}: {e}"),
    }
}

#[async_trait]
impl CommandHandler for GetStatusHandler {
    fn implements(&self) -> Option<CommandKind> {
        Some(CommandKind::GetStatus)
    }

    fn calculate_acknowledge_time(
        &self,
        ctx: &HandlerContext,
        _command: &InboundCommand,
    ) -> AppResult<u64> {
        Ok(ctx.default_acknowledge_time())
    }

    async fn process_command(&self, ctx: &HandlerContext, command: &InboundCommand) -> Completion {
        let Command::GetStatus { level } = command.command else {
            return wrong_command(CommandKind::GetStatus, &command.command);
        };

        let mut info = DisplayInfo::new();
        let mut mode = CurrentMode::Idle;
        if let Err(e) = Self::basic(ctx, &mut info, &mut mode).await {
            error!("Retrieving basic status failed: {e}");
            return Completion::failure(
                ErrorSite::GetStatusBasic,
                format!("processCommand:Retrieving basic status failed:{e}"),
            )
            .with_result(CommandResult::Status(StatusResult {
                current_mode: mode,
                display_info: info,
            }));
        }
        if level >= LEVEL_INTERMEDIATE {
            Self::intermediate(ctx, &mut info).await;
        }
        if level >= LEVEL_FULL {
            Self::full(&mut info).await;
        }
        Completion::success(Some(CommandResult::Status(StatusResult {
            current_mode: mode,
            display_info: info,
        })))
    }
}
