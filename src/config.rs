//! Configuration management.
//!
//! Settings are read from a TOML file with the `config` crate and may be overridden by
//! environment variables prefixed with `LIRIC_` (nested keys separated by `__`, for example
//! `LIRIC_C_LAYER__PORT_NUMBER=8367`).
//!
//! Values consulted by a single command (fold position, focus offset, overheads, temperature
//! bounds, FITS values) stay optional here. A missing or malformed value is reported by the
//! command that needs it, with that command's error number, rather than refusing to start.
use crate::error::{AppResult, LiricError};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default acknowledge time used when a command's own policy falls back.
pub const DEFAULT_ACKNOWLEDGE_TIME_MS: u64 = 60_000;

/// Lower bound on acknowledge time, used for commands that cannot be dispatched.
pub const MIN_ACKNOWLEDGE_TIME_MS: u64 = 30_000;

/// Everything read from the settings file, after environment overrides.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Top-level fold mirror position sent with MOVE_FOLD.
    #[serde(default)]
    pub mirror_fold_position: Option<String>,
    /// Instrument identity reported by GET_STATUS.
    #[serde(default)]
    pub instrument: InstrumentSettings,
    /// Inbound command server.
    pub server: ServerSettings,
    /// Downstream hardware-control process.
    pub c_layer: CLayerSettings,
    /// Instrument support system that receives relayed sub-requests.
    pub iss: IssSettings,
    /// Machine reboot helper. Required only for HARDWARE and POWER_OFF reboots.
    #[serde(default)]
    pub icsd: Option<IcsdSettings>,
    /// Per-connection acknowledge times and waits.
    #[serde(default)]
    pub server_connection: ServerConnectionSettings,
    /// Handler identifiers to register.
    #[serde(default)]
    pub command: CommandSettings,
    /// CONFIG acknowledge time.
    #[serde(default)]
    pub config: ConfigCommandSettings,
    /// Focus offset applied after CONFIG.
    #[serde(default)]
    pub focus: FocusSettings,
    /// Coadd readout overhead.
    #[serde(default)]
    pub coadd: CoaddSettings,
    /// Nudgematic move overhead.
    #[serde(default)]
    pub nudgematic: NudgematicSettings,
    /// REBOOT gating and acknowledge times.
    #[serde(default)]
    pub reboot: RebootSettings,
    /// Static FITS keywords written before every exposure.
    #[serde(default)]
    pub fits: FitsSettings,
    /// GET_STATUS thresholds.
    #[serde(default)]
    pub get_status: GetStatusSettings,
    /// Process status persistence.
    #[serde(default)]
    pub status: StatusSettings,
    /// Tracing level and format.
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// `[instrument]`
#[derive(Debug, Deserialize, Clone)]
pub struct InstrumentSettings {
    /// Defaults to `Liric`.
    #[serde(default = "default_instrument_name")]
    pub name: String,
}

impl Default for InstrumentSettings {
    fn default() -> Self {
        Self {
            name: default_instrument_name(),
        }
    }
}

/// `[server]`
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    /// Address the inbound command server binds to.
    #[serde(default = "default_bind_address")]
    pub address: String,
    /// Port 0 picks a free port.
    pub port: u16,
}

/// `[c_layer]`
#[derive(Debug, Deserialize, Clone)]
pub struct CLayerSettings {
    /// Host name or address.
    pub hostname: String,
    /// TCP port.
    pub port_number: u16,
    /// Optional bound on each downstream call. Absent means calls may block indefinitely.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// `[iss]`
#[derive(Debug, Deserialize, Clone)]
pub struct IssSettings {
    /// Host name or address.
    pub address: String,
    /// TCP port.
    pub port_number: u16,
}

/// The OS-level helper that performs machine reboot and power off.
#[derive(Debug, Deserialize, Clone)]
pub struct IcsdSettings {
    /// Host name or address.
    pub hostname: String,
    /// TCP port.
    pub port_number: u16,
}

/// `[server_connection]`
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConnectionSettings {
    /// Milliseconds. Base of most acknowledge-time policies.
    #[serde(default = "default_acknowledge_time")]
    pub default_acknowledge_time: u64,
    /// Milliseconds. Sent for commands that fail before their own policy runs.
    #[serde(default = "min_acknowledge_time")]
    pub min_acknowledge_time: u64,
    /// How often a connection waiting on an ISS relay rechecks its abort flag.
    #[serde(default = "default_abort_poll_interval")]
    pub abort_poll_interval_ms: u64,
    /// Optional bound on reading the inbound command line.
    #[serde(default)]
    pub command_read_timeout_ms: Option<u64>,
}

impl Default for ServerConnectionSettings {
    fn default() -> Self {
        Self {
            default_acknowledge_time: default_acknowledge_time(),
            min_acknowledge_time: min_acknowledge_time(),
            abort_poll_interval_ms: default_abort_poll_interval(),
            command_read_timeout_ms: None,
        }
    }
}

impl ServerConnectionSettings {
    /// Never shorter than one millisecond.
    pub fn abort_poll_interval(&self) -> Duration {
        Duration::from_millis(self.abort_poll_interval_ms.max(1))
    }
}

/// Ordered handler identifiers, keyed `"0"`, `"1"`, ... and terminated by the first gap.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct CommandSettings {
    /// Handler identifier per index.
    #[serde(default)]
    pub implementation: BTreeMap<String, String>,
}

/// `[config]`
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConfigCommandSettings {
    /// CONFIG acknowledge time in milliseconds.
    #[serde(default)]
    pub acknowledge_time: Option<String>,
}

/// `[focus]`
#[derive(Debug, Deserialize, Clone, Default)]
pub struct FocusSettings {
    /// Focus offset in millimetres, sent to the ISS after every CONFIG.
    #[serde(default)]
    pub offset: Option<String>,
}

/// `[coadd]`
#[derive(Debug, Deserialize, Clone, Default)]
pub struct CoaddSettings {
    /// Milliseconds per coadd readout, used by the MULTRUN acknowledge time.
    #[serde(default)]
    pub readout_overhead: Option<String>,
}

/// `[nudgematic]`
#[derive(Debug, Deserialize, Clone, Default)]
pub struct NudgematicSettings {
    /// Milliseconds per nudgematic move, used by the MULTRUN acknowledge time.
    #[serde(default)]
    pub overhead: Option<String>,
}

/// Per-level REBOOT gating. Keys are lower case level names (`redatum`, `software`, ...).
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RebootSettings {
    /// Levels allowed to act. Missing levels are disabled.
    #[serde(default)]
    pub enable: HashMap<String, bool>,
    /// Acknowledge time per level, in milliseconds.
    #[serde(default)]
    pub acknowledge_time: HashMap<String, String>,
}

/// Static FITS keyword table, keyed `"0"`, `"1"`, ... and terminated by the first gap.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct FitsSettings {
    /// Keyword entry per index.
    #[serde(default)]
    pub keyword: BTreeMap<String, FitsKeywordEntry>,
}

/// One `[fits.keyword.N]` table.
#[derive(Debug, Deserialize, Clone)]
pub struct FitsKeywordEntry {
    /// Keyword as written to the header.
    pub name: String,
    /// One of `string`, `integer`, `float`, `boolean`.
    #[serde(default)]
    pub value_type: Option<String>,
    /// Value text, parsed according to `value_type`.
    #[serde(default)]
    pub value: Option<String>,
}

/// `[get_status]`
#[derive(Debug, Deserialize, Clone, Default)]
pub struct GetStatusSettings {
    /// `[get_status.detector_temperature]`
    #[serde(default)]
    pub detector_temperature: TemperatureBounds,
}

/// Detector temperature thresholds in degrees centigrade.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct TemperatureBounds {
    /// Warmer than this is WARN.
    #[serde(default)]
    pub warm_warn: Option<String>,
    /// Warmer than this is FAIL.
    #[serde(default)]
    pub warm_fail: Option<String>,
    /// Colder than this is WARN.
    #[serde(default)]
    pub cold_warn: Option<String>,
    /// Colder than this is FAIL.
    #[serde(default)]
    pub cold_fail: Option<String>,
}

/// `[status]`
#[derive(Debug, Deserialize, Clone, Default)]
pub struct StatusSettings {
    /// File holding the persistent CONFIG id counter. Absent keeps the counter in memory.
    #[serde(default)]
    pub config_id_file: Option<PathBuf>,
}

/// `[logging]`
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    /// `trace` through `error`.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `pretty`, `compact` or `json`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_instrument_name() -> String {
    "Liric".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_acknowledge_time() -> u64 {
    DEFAULT_ACKNOWLEDGE_TIME_MS
}

fn min_acknowledge_time() -> u64 {
    MIN_ACKNOWLEDGE_TIME_MS
}

fn default_abort_poll_interval() -> u64 {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Settings {
    /// Loads settings from `path`, applying `LIRIC_` environment overrides.
    pub fn load(path: &Path) -> AppResult<Self> {
        let s = Config::builder()
            .add_source(File::from(path))
            .add_source(
                Environment::with_prefix("LIRIC")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(LiricError::Config)?;

        let settings: Settings = s.try_deserialize().map_err(LiricError::Config)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks values that must be usable before the server starts.
    pub fn validate(&self) -> AppResult<()> {
        if self.c_layer.hostname.trim().is_empty() {
            return Err(LiricError::Configuration(
                "c_layer.hostname must not be empty".to_string(),
            ));
        }
        if self.iss.address.trim().is_empty() {
            return Err(LiricError::Configuration(
                "iss.address must not be empty".to_string(),
            ));
        }
        if self.server_connection.min_acknowledge_time > self.server_connection.default_acknowledge_time
        {
            return Err(LiricError::Configuration(format!(
                "server_connection.min_acknowledge_time {} exceeds default_acknowledge_time {}",
                self.server_connection.min_acknowledge_time,
                self.server_connection.default_acknowledge_time
            )));
        }
        Ok(())
    }

    /// Handler identifiers in registration order, stopping at the first missing index.
    pub fn command_implementations(&self) -> Vec<&str> {
        gap_terminated(&self.command.implementation)
            .map(String::as_str)
            .collect()
    }

    /// Static FITS keyword entries in order, stopping at the first missing index.
    pub fn fits_keywords(&self) -> Vec<&FitsKeywordEntry> {
        gap_terminated(&self.fits.keyword).collect()
    }

    /// Whether REBOOT may act at `level_name`.
    pub fn reboot_enabled(&self, level_name: &str) -> bool {
        self.reboot
            .enable
            .get(&level_name.to_lowercase())
            .copied()
            .unwrap_or(false)
    }

    /// Configured acknowledge time for `level_name`.
    pub fn reboot_acknowledge_time(&self, level_name: &str) -> AppResult<u64> {
        let key = format!("reboot.acknowledge_time.{}", level_name.to_lowercase());
        parse_property(
            &key,
            self.reboot
                .acknowledge_time
                .get(&level_name.to_lowercase())
                .map(String::as_str),
        )
    }

    /// Bound on each downstream call, if configured.
    pub fn c_layer_timeout(&self) -> Option<Duration> {
        self.c_layer.timeout_ms.map(Duration::from_millis)
    }
}

/// Iterates values keyed `"0"`, `"1"`, ... until an index is missing.
fn gap_terminated<V>(map: &BTreeMap<String, V>) -> impl Iterator<Item = &V> {
    (0usize..).map_while(move |index| map.get(&index.to_string()))
}

/// Parses an optional property, reporting a missing or malformed value by key.
pub fn parse_property<T>(key: &str, value: Option<&str>) -> AppResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = value.ok_or_else(|| {
        LiricError::Configuration(format!("property '{key}' is not set"))
    })?;
    raw.trim().parse::<T>().map_err(|e| {
        LiricError::Configuration(format!("property '{key}' has invalid value '{raw}': {e}"))
    })
}
