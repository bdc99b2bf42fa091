use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Numbered input position on the amplifier (1-based)
pub type SlotId = u8;

/// Normalized volume in `[0.0, 1.0]`
pub type VolumeLevel = f64;

/// Lowest native volume used when the device does not report a range
pub const DEFAULT_MIN_DB: f64 = -92.0;

/// Highest native volume used when the device does not report a range
pub const DEFAULT_MAX_DB: f64 = -20.0;

/// Independently controllable output path of the amplifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Zone {
    Main,
    Zone2,
}

impl Zone {
    /// All zones the protocol can address, primary first
    pub const ALL: [Zone; 2] = [Zone::Main, Zone::Zone2];

    /// Parameter prefix on the wire (`Main.Power`)
    pub fn wire_prefix(&self) -> &'static str {
        match self {
            Zone::Main => "Main",
            Zone::Zone2 => "Zone2",
        }
    }

    /// Prefix of the zone's keys in the status table (`main_volume_min`)
    pub fn key_prefix(&self) -> &'static str {
        match self {
            Zone::Main => "main",
            Zone::Zone2 => "zone2",
        }
    }

    pub fn is_primary(&self) -> bool {
        matches!(self, Zone::Main)
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_prefix())
    }
}

/// Normalized power state of a zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    On,
    Off,
    #[default]
    Unknown,
}

impl PowerState {
    /// Map a device token; anything but `On`/`Off` is `Unknown`
    pub fn from_token(token: &str) -> Self {
        if token.eq_ignore_ascii_case("on") {
            PowerState::On
        } else if token.eq_ignore_ascii_case("off") {
            PowerState::Off
        } else {
            PowerState::Unknown
        }
    }

    pub fn is_on(&self) -> bool {
        matches!(self, PowerState::On)
    }
}

/// Map a boolean to the device's `On`/`Off` token
pub(crate) fn on_off_token(on: bool) -> &'static str {
    if on {
        "On"
    } else {
        "Off"
    }
}

/// Surround/listening mode of the primary zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListeningMode {
    None,
    Stereo,
    AnalogBypass,
    ProLogic,
    PliiMovie,
    PliiMusic,
    NeoCinema,
    NeoMusic,
    Ears,
    EnhancedStereo,
    StereoDownmix,
}

impl ListeningMode {
    pub const ALL: [ListeningMode; 11] = [
        ListeningMode::None,
        ListeningMode::Stereo,
        ListeningMode::AnalogBypass,
        ListeningMode::ProLogic,
        ListeningMode::PliiMovie,
        ListeningMode::PliiMusic,
        ListeningMode::NeoCinema,
        ListeningMode::NeoMusic,
        ListeningMode::Ears,
        ListeningMode::EnhancedStereo,
        ListeningMode::StereoDownmix,
    ];

    /// Device token for this mode
    pub fn token(&self) -> &'static str {
        match self {
            ListeningMode::None => "None",
            ListeningMode::Stereo => "Stereo",
            ListeningMode::AnalogBypass => "AnalogBypass",
            ListeningMode::ProLogic => "ProLogic",
            ListeningMode::PliiMovie => "PLIIMovie",
            ListeningMode::PliiMusic => "PLIIMusic",
            ListeningMode::NeoCinema => "NEO6Cinema",
            ListeningMode::NeoMusic => "NEO6Music",
            ListeningMode::Ears => "EARS",
            ListeningMode::EnhancedStereo => "EnhancedStereo",
            ListeningMode::StereoDownmix => "StereoDownmix",
        }
    }
}

impl fmt::Display for ListeningMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for ListeningMode {
    type Err = crate::error::NadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ListeningMode::ALL
            .into_iter()
            .find(|mode| mode.token().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| crate::error::NadError::Resolution(format!("unknown listening mode '{}'", s)))
    }
}

/// Native decibel range of one zone's volume control
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeRange {
    pub min_db: f64,
    pub max_db: f64,
}

impl Default for VolumeRange {
    fn default() -> Self {
        Self {
            min_db: DEFAULT_MIN_DB,
            max_db: DEFAULT_MAX_DB,
        }
    }
}

impl VolumeRange {
    /// Build a range, rejecting empty or inverted ones
    pub fn new(min_db: f64, max_db: f64) -> Option<Self> {
        (min_db.is_finite() && max_db.is_finite() && max_db > min_db).then_some(Self { min_db, max_db })
    }

    pub fn span(&self) -> f64 {
        self.max_db - self.min_db
    }

    /// Convert a native dB reading to the normalized scale, clamped to `[0, 1]`
    pub fn to_normalized(&self, db: f64) -> VolumeLevel {
        ((db - self.min_db) / self.span()).clamp(0.0, 1.0)
    }

    /// Convert a normalized level to whole device dB.
    ///
    /// The input is clamped to `[0, 1]` and the result floored, so
    /// `to_normalized(from_normalized(v))` is generally not `v`.
    pub fn from_normalized(&self, level: VolumeLevel) -> i32 {
        let level = if level.is_nan() { 0.0 } else { level.clamp(0.0, 1.0) };
        // absorb float noise so whole-dB inputs stay whole after a round trip
        let db = level * self.span() + self.min_db;
        (db + 1e-9).floor() as i32
    }
}

/// State of one zone as read during a single call or refresh
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneState {
    pub power: PowerState,
    pub source: Option<String>,
    pub volume: Option<VolumeLevel>,
    pub muted: Option<bool>,
    /// Always `None` for the secondary zone
    pub listening_mode: Option<ListeningMode>,
}

/// Result of one aggregate refresh
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub zones: BTreeMap<Zone, ZoneState>,
    /// Enabled source names, ascending slot order
    pub sources: Vec<String>,
    /// Primary zone listening mode
    pub listening_mode: Option<ListeningMode>,
}

impl Snapshot {
    pub fn zone(&self, zone: Zone) -> Option<&ZoneState> {
        self.zones.get(&zone)
    }

    /// True if at least one zone reported power on
    pub fn any_on(&self) -> bool {
        self.zones.values().any(|z| z.power.is_on())
    }
}
