//! Expected intensity and S-wave travel time per region.
//!
//! The estimator is a plug point: [`AttenuationEstimator`] is the built-in one,
//! driven by a JSON region catalog.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::eew::{EarthquakeData, RegionEstimate};
use super::intensity::Intensity;
use crate::config::CustomizationConfig;
use crate::utils::fs;
use crate::{Error, Result};

const EARTH_RADIUS_KM: f64 = 6371.0;
/// Mean S-wave velocity used for arrival estimates.
const S_WAVE_VELOCITY_KM_S: f64 = 3.5;

fn default_site_effect() -> f64 {
    1.0
}

/// A notifiable region (township) with its location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionInfo {
    pub code: u32,
    pub city: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    /// Site amplification factor applied to PGA.
    #[serde(default = "default_site_effect")]
    pub site_effect: f64,
}

/// Catalog of every region the estimator reports on, in display order.
#[derive(Debug, Clone, Default)]
pub struct RegionCatalog {
    regions: Vec<Arc<RegionInfo>>,
}

impl RegionCatalog {
    pub fn new(regions: Vec<RegionInfo>) -> Self {
        Self {
            regions: regions.into_iter().map(Arc::new).collect(),
        }
    }

    /// Load a JSON array of [`RegionInfo`].
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string_with_op("reading region catalog", path)?;
        let regions: Vec<RegionInfo> = serde_json::from_str(&contents)?;
        if regions.is_empty() {
            return Err(Error::config(format!(
                "region catalog {} is empty",
                path.display()
            )));
        }
        Ok(Self::new(regions))
    }

    pub fn regions(&self) -> &[Arc<RegionInfo>] {
        &self.regions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// Computed intensity for one region.
#[derive(Debug, Clone)]
pub struct RegionExpectedIntensity {
    pub region: Arc<RegionInfo>,
    /// Unrounded intensity value.
    pub value: f64,
    pub intensity: Intensity,
    pub distance_km: f64,
    pub s_arrival: DateTime<Utc>,
}

impl RegionExpectedIntensity {
    fn to_estimate(&self) -> RegionEstimate {
        RegionEstimate::new(
            self.region.city.clone(),
            self.region.name.clone(),
            self.intensity.level() as i32,
            self.intensity.label(),
            self.s_arrival.timestamp(),
        )
    }
}

/// Computes the expected intensity of every region for an earthquake.
pub trait IntensityEstimator: Send + Sync {
    fn estimate(&self, earthquake: &EarthquakeData) -> Vec<RegionExpectedIntensity>;
}

/// PGA attenuation estimator.
///
/// PGA = 1.657 * e^(1.533 M) * R^-1.607 * site, intensity = 2 log10(PGA) + 0.7,
/// with R the hypocentral distance in km.
pub struct AttenuationEstimator {
    catalog: RegionCatalog,
}

impl AttenuationEstimator {
    pub fn new(catalog: RegionCatalog) -> Self {
        Self { catalog }
    }
}

impl IntensityEstimator for AttenuationEstimator {
    fn estimate(&self, earthquake: &EarthquakeData) -> Vec<RegionExpectedIntensity> {
        let origin = &earthquake.location;
        let result: Vec<_> = self
            .catalog
            .regions()
            .iter()
            .map(|region| {
                let epicentral = haversine_km(origin.lat, origin.lon, region.lat, region.lon);
                let hypocentral = (epicentral.powi(2) + earthquake.depth_km.powi(2))
                    .sqrt()
                    .max(1.0);
                let pga = 1.657
                    * (1.533 * earthquake.magnitude).exp()
                    * hypocentral.powf(-1.607)
                    * region.site_effect;
                let value = 2.0 * pga.log10() + 0.7;
                let travel_ms = (hypocentral / S_WAVE_VELOCITY_KM_S * 1000.0).round() as i64;

                RegionExpectedIntensity {
                    region: region.clone(),
                    value,
                    intensity: Intensity::from_value(value),
                    distance_km: hypocentral,
                    s_arrival: earthquake.origin_time + Duration::milliseconds(travel_ms),
                }
            })
            .collect();

        debug!(
            regions = result.len(),
            magnitude = earthquake.magnitude,
            "Expected intensity calculated"
        );
        result
    }
}

fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();
    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

/// Reduce per-region intensities to the rows that get notified.
///
/// Default mode keeps the strongest region of each city. Customized mode keeps every
/// region listed in `custom_regions`, so a city can appear more than once.
pub fn summarize_regions(
    expected: &[RegionExpectedIntensity],
    customization: &CustomizationConfig,
) -> Vec<RegionEstimate> {
    if customization.enable {
        return expected
            .iter()
            .filter(|e| customization.custom_regions.contains(&e.region.code))
            .map(RegionExpectedIntensity::to_estimate)
            .collect();
    }

    let mut strongest: Vec<&RegionExpectedIntensity> = Vec::new();
    for item in expected {
        match strongest.iter_mut().find(|s| s.region.city == item.region.city) {
            Some(slot) if item.value > slot.value => *slot = item,
            Some(_) => {}
            None => strongest.push(item),
        }
    }
    strongest.into_iter().map(|e| e.to_estimate()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::earthquake::EarthquakeLocation;
    use chrono::TimeZone;

    fn region(code: u32, city: &str, name: &str, lat: f64, lon: f64) -> RegionInfo {
        RegionInfo {
            code,
            city: city.to_string(),
            name: name.to_string(),
            lat,
            lon,
            site_effect: 1.0,
        }
    }

    fn catalog() -> RegionCatalog {
        RegionCatalog::new(vec![
            region(100, "臺北市", "中正區", 25.032, 121.519),
            region(101, "臺北市", "士林區", 25.093, 121.525),
            region(970, "花蓮縣", "花蓮市", 23.977, 121.604),
            region(800, "高雄市", "新興區", 22.631, 120.307),
        ])
    }

    fn hualien_quake() -> EarthquakeData {
        EarthquakeData::new(
            EarthquakeLocation {
                lon: 121.6,
                lat: 24.0,
                name: Some("花蓮縣近海".to_string()),
            },
            6.0,
            15.0,
            Utc.with_ymd_and_hms(2024, 4, 3, 0, 0, 0).unwrap(),
            None,
        )
    }

    #[test]
    fn test_closer_region_is_stronger_and_earlier() {
        let estimator = AttenuationEstimator::new(catalog());
        let expected = estimator.estimate(&hualien_quake());
        assert_eq!(expected.len(), 4);

        let hualien = expected.iter().find(|e| e.region.code == 970).unwrap();
        let kaohsiung = expected.iter().find(|e| e.region.code == 800).unwrap();
        assert!(hualien.value > kaohsiung.value);
        assert!(hualien.s_arrival < kaohsiung.s_arrival);
        assert!(hualien.intensity.level() >= 4);
    }

    #[test]
    fn test_summarize_default_keeps_city_max() {
        let estimator = AttenuationEstimator::new(catalog());
        let expected = estimator.estimate(&hualien_quake());
        let rows = summarize_regions(&expected, &CustomizationConfig::default());

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].city, "臺北市");
        let taipei: Vec<_> = expected.iter().filter(|e| e.region.city == "臺北市").collect();
        let max = taipei
            .iter()
            .max_by(|a, b| a.value.total_cmp(&b.value))
            .unwrap();
        assert_eq!(rows[0].region, max.region.name);
    }

    #[test]
    fn test_summarize_customized_keeps_listed_regions() {
        let estimator = AttenuationEstimator::new(catalog());
        let expected = estimator.estimate(&hualien_quake());
        let customization = CustomizationConfig {
            enable: true,
            custom_regions: vec![100, 101],
            ..Default::default()
        };

        let rows = summarize_regions(&expected, &customization);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.city == "臺北市"));
    }

    #[test]
    fn test_catalog_load_rejects_empty() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "[]").unwrap();
        assert!(matches!(
            RegionCatalog::load(file.path()),
            Err(Error::Configuration(_))
        ));
    }
}
