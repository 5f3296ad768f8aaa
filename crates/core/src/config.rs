//! Configuration for rtcscan diagnostics
//!
//! Configuration can be loaded from a TOML file and/or environment variables.
//! Every field has a default, so an empty file is a valid configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanConfig {
    /// ICE server settings
    #[serde(default)]
    pub ice: IceSettings,

    #[serde(default)]
    pub connectivity: ConnectivityConfig,

    #[serde(default)]
    pub throughput: ThroughputConfig,

    #[serde(default)]
    pub bandwidth: BandwidthConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub camera: CameraConfig,

    #[serde(default)]
    pub audio: AudioConfig,
}

/// Where ICE servers come from.
///
/// Explicit `turn_uri` / `stun_uri` values win over the credential endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceSettings {
    /// Comma separated TURN URIs
    #[serde(default)]
    pub turn_uri: Option<String>,

    #[serde(default)]
    pub turn_username: Option<String>,

    #[serde(default)]
    pub turn_credential: Option<String>,

    /// Comma separated STUN URIs
    #[serde(default)]
    pub stun_uri: Option<String>,

    /// Credential endpoint; the API key is appended to it
    #[serde(default)]
    pub turn_url: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Seconds of credential lifetime reserved for a test run to finish
    #[serde(default = "default_test_run_time_budget")]
    pub test_run_time_budget_secs: u64,
}

fn default_test_run_time_budget() -> u64 {
    240
}

impl Default for IceSettings {
    fn default() -> Self {
        Self {
            turn_uri: None,
            turn_username: None,
            turn_credential: None,
            stun_uri: None,
            turn_url: None,
            api_key: None,
            test_run_time_budget_secs: default_test_run_time_budget(),
        }
    }
}

/// Data channel connectivity check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    #[serde(default = "default_connectivity_timeout")]
    pub timeout_ms: u64,
}

fn default_connectivity_timeout() -> u64 {
    5000
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_connectivity_timeout(),
        }
    }
}

/// Data channel throughput check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThroughputConfig {
    #[serde(default = "default_throughput_duration")]
    pub duration_secs: u64,

    /// Packets written per send tick
    #[serde(default = "default_max_packets")]
    pub max_packets_to_send: usize,

    #[serde(default = "default_packet_size")]
    pub packet_size: usize,

    /// Hard stop if the receiver never catches up
    #[serde(default = "default_throughput_timeout")]
    pub overall_timeout_secs: u64,
}

fn default_throughput_duration() -> u64 {
    5
}

fn default_max_packets() -> usize {
    1
}

fn default_packet_size() -> usize {
    1024
}

fn default_throughput_timeout() -> u64 {
    30
}

impl Default for ThroughputConfig {
    fn default() -> Self {
        Self {
            duration_secs: default_throughput_duration(),
            max_packets_to_send: default_max_packets(),
            packet_size: default_packet_size(),
            overall_timeout_secs: default_throughput_timeout(),
        }
    }
}

impl ThroughputConfig {
    /// Buffered amount the sender keeps the channel under
    pub fn bytes_to_keep_buffered(&self) -> usize {
        self.packet_size * self.max_packets_to_send
    }
}

/// Video bandwidth ramp check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandwidthConfig {
    #[serde(default = "default_max_video_bitrate")]
    pub max_video_bitrate_kbps: u32,

    #[serde(default = "default_bandwidth_duration")]
    pub duration_ms: u64,

    #[serde(default = "default_stat_step")]
    pub stat_step_ms: u64,
}

fn default_max_video_bitrate() -> u32 {
    2000
}

fn default_bandwidth_duration() -> u64 {
    40_000
}

fn default_stat_step() -> u64 {
    100
}

impl Default for BandwidthConfig {
    fn default() -> Self {
        Self {
            max_video_bitrate_kbps: default_max_video_bitrate(),
            duration_ms: default_bandwidth_duration(),
            stat_step_ms: default_stat_step(),
        }
    }
}

/// Protocol reachability check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_network_timeout")]
    pub timeout_ms: u64,
}

fn default_network_timeout() -> u64 {
    10_000
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_network_timeout(),
        }
    }
}

/// Camera capture analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    #[serde(default = "default_camera_duration")]
    pub duration_ms: u64,

    #[serde(default = "default_camera_width")]
    pub width: u32,

    #[serde(default = "default_camera_height")]
    pub height: u32,
}

fn default_camera_duration() -> u64 {
    8000
}

fn default_camera_width() -> u32 {
    1280
}

fn default_camera_height() -> u32 {
    720
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            duration_ms: default_camera_duration(),
            width: default_camera_width(),
            height: default_camera_height(),
        }
    }
}

/// Microphone level analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_collect_seconds")]
    pub collect_seconds: f64,

    #[serde(default = "default_audio_timeout")]
    pub timeout_ms: u64,

    #[serde(default = "default_low_volume_db")]
    pub low_volume_db: f64,

    #[serde(default = "default_clip_count")]
    pub clip_count_threshold: u32,
}

fn default_collect_seconds() -> f64 {
    2.0
}

fn default_audio_timeout() -> u64 {
    5000
}

fn default_low_volume_db() -> f64 {
    -60.0
}

fn default_clip_count() -> u32 {
    6
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            collect_seconds: default_collect_seconds(),
            timeout_ms: default_audio_timeout(),
            low_volume_db: default_low_volume_db(),
            clip_count_threshold: default_clip_count(),
        }
    }
}

impl ScanConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load from `path` when given, else defaults, then apply environment
    /// overrides and validate
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Override ICE settings from `RTCSCAN_*` variables
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let ice = &mut self.ice;
        let overrides: [(&str, &mut Option<String>); 6] = [
            ("RTCSCAN_TURN_URI", &mut ice.turn_uri),
            ("RTCSCAN_TURN_USERNAME", &mut ice.turn_username),
            ("RTCSCAN_TURN_CREDENTIAL", &mut ice.turn_credential),
            ("RTCSCAN_STUN_URI", &mut ice.stun_uri),
            ("RTCSCAN_TURN_URL", &mut ice.turn_url),
            ("RTCSCAN_API_KEY", &mut ice.api_key),
        ];
        for (key, slot) in overrides {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *slot = Some(value);
            }
        }
    }

    /// Reject values that would make a scenario end immediately
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("connectivity.timeout_ms", self.connectivity.timeout_ms),
            ("throughput.duration_secs", self.throughput.duration_secs),
            ("throughput.packet_size", self.throughput.packet_size as u64),
            ("throughput.max_packets_to_send", self.throughput.max_packets_to_send as u64),
            ("bandwidth.duration_ms", self.bandwidth.duration_ms),
            ("bandwidth.stat_step_ms", self.bandwidth.stat_step_ms),
            ("network.timeout_ms", self.network.timeout_ms),
            ("camera.duration_ms", self.camera.duration_ms),
            ("audio.timeout_ms", self.audio.timeout_ms),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(Error::Config(format!("{} must be greater than zero", name)));
            }
        }
        if self.audio.collect_seconds <= 0.0 {
            return Err(Error::Config(
                "audio.collect_seconds must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl BandwidthConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn stat_step(&self) -> Duration {
        Duration::from_millis(self.stat_step_ms)
    }
}
