//! Earthquake early warning revisions.
//!
//! An [`EewRevision`] is one report of an event. Revisions of the same event share
//! an id and carry an increasing serial. The wire shape of the upstream API is
//! [`EewPayload`]; it is converted into a revision whose derived data (intensity
//! estimate, map) completes later through [`Completion`] signals.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::intensity::Intensity;
use super::model::RegionExpectedIntensity;
use super::signal::Completion;
use crate::map::MapArtifact;

/// Display names of the upstream providers.
const PROVIDER_DISPLAY: &[(&str, &str)] = &[
    ("cwa", "中央氣象署"),
    ("trem", "TREM 臺灣即時地震監測"),
    ("kam", "기상청 날씨누리"),
    ("jma", "気象庁"),
    ("nied", "防災科研"),
    ("scdzj", "四川省地震局"),
    ("test", "測試資料"),
];

/// The agency that issued a revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub name: String,
}

impl Provider {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn display_name(&self) -> &str {
        PROVIDER_DISPLAY
            .iter()
            .find(|(id, _)| *id == self.name)
            .map(|(_, display)| *display)
            .unwrap_or(&self.name)
    }
}

/// Epicenter of an earthquake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarthquakeLocation {
    pub lon: f64,
    pub lat: f64,
    /// Place name, when the provider sends one.
    pub name: Option<String>,
}

impl EarthquakeLocation {
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.trim().is_empty())
    }
}

impl std::fmt::Display for EarthquakeLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.display_name() {
            Some(name) => f.write_str(name),
            None => write!(f, "北緯{:.2}度 東經{:.2}度", self.lat, self.lon),
        }
    }
}

/// One row of the per-region estimate reported with a revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionEstimate {
    pub city: String,
    pub region: String,
    pub level: i32,
    pub label: String,
    /// Estimated S-wave arrival, unix seconds.
    pub s_arrival_epoch: i64,
}

impl RegionEstimate {
    pub fn new(
        city: impl Into<String>,
        region: impl Into<String>,
        level: i32,
        label: impl Into<String>,
        s_arrival_epoch: i64,
    ) -> Self {
        Self {
            city: city.into(),
            region: region.into(),
            level,
            label: label.into(),
            s_arrival_epoch,
        }
    }
}

/// Result of the intensity calculation for an earthquake.
#[derive(Debug, Clone, Default)]
pub struct IntensityReport {
    /// Every region of the catalog with its computed intensity.
    pub expected: Vec<RegionExpectedIntensity>,
    /// The city-level rows used for notification.
    pub regions: Vec<RegionEstimate>,
}

impl IntensityReport {
    /// A report that only carries notification rows.
    pub fn from_regions(regions: Vec<RegionEstimate>) -> Self {
        Self {
            expected: Vec::new(),
            regions,
        }
    }
}

/// Outcome of the map drawing for an earthquake.
#[derive(Debug, Clone)]
pub enum MapOutcome {
    Drawn(MapArtifact),
    Failed(String),
}

/// Physical parameters of an earthquake plus its asynchronously derived data.
#[derive(Debug)]
pub struct EarthquakeData {
    pub location: EarthquakeLocation,
    pub magnitude: f64,
    pub depth_km: f64,
    pub origin_time: DateTime<Utc>,
    pub max_intensity: Option<Intensity>,
    intensity: Completion<Arc<IntensityReport>>,
    map: Completion<MapOutcome>,
}

impl EarthquakeData {
    pub fn new(
        location: EarthquakeLocation,
        magnitude: f64,
        depth_km: f64,
        origin_time: DateTime<Utc>,
        max_intensity: Option<Intensity>,
    ) -> Self {
        Self {
            location,
            magnitude,
            depth_km,
            origin_time,
            max_intensity,
            intensity: Completion::new(),
            map: Completion::new(),
        }
    }

    /// Signal fired once the intensity calculation has finished.
    pub fn intensity_calculated(&self) -> &Completion<Arc<IntensityReport>> {
        &self.intensity
    }

    /// Signal fired once map drawing has finished (successfully or not).
    pub fn map_drawn(&self) -> &Completion<MapOutcome> {
        &self.map
    }

    pub fn max_intensity_label(&self) -> &str {
        self.max_intensity.map(Intensity::label).unwrap_or("未知")
    }
}

/// One revision of an earthquake early warning.
#[derive(Debug, Clone)]
pub struct EewRevision {
    pub id: String,
    pub serial: u32,
    pub final_report: bool,
    pub provider: Provider,
    /// When the provider published this revision.
    pub published_at: DateTime<Utc>,
    pub earthquake: Arc<EarthquakeData>,
}

impl EewRevision {
    /// Whether this is the first report of the event.
    pub fn is_first_report(&self) -> bool {
        self.serial <= 1
    }
}

/// Upstream wire format of an EEW record.
#[derive(Debug, Clone, Deserialize)]
pub struct EewPayload {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub serial: u32,
    #[serde(rename = "final", default, deserialize_with = "bool_or_int")]
    pub final_report: bool,
    pub author: String,
    /// Publish time, unix milliseconds.
    pub time: i64,
    pub eq: EarthquakePayload,
}

/// Upstream wire format of the earthquake parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct EarthquakePayload {
    pub lon: f64,
    pub lat: f64,
    #[serde(default)]
    pub loc: Option<String>,
    pub mag: f64,
    pub depth: f64,
    /// Origin time, unix milliseconds.
    pub time: i64,
    #[serde(default)]
    pub max: Option<i64>,
}

impl EewPayload {
    /// Build a revision whose intensity and map signals are still pending.
    pub fn into_revision(self) -> EewRevision {
        let eq = self.eq;
        let earthquake = EarthquakeData::new(
            EarthquakeLocation {
                lon: eq.lon,
                lat: eq.lat,
                name: eq.loc,
            },
            eq.mag,
            eq.depth,
            millis_to_utc(eq.time),
            eq.max.and_then(|m| Intensity::try_from(m).ok()),
        );

        EewRevision {
            id: self.id,
            serial: self.serial,
            final_report: self.final_report,
            provider: Provider::new(self.author),
            published_at: millis_to_utc(self.time),
            earthquake: Arc::new(earthquake),
        }
    }
}

fn millis_to_utc(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

fn bool_or_int<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Int(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Bool(b) => b,
        Raw::Int(i) => i != 0,
    })
}
