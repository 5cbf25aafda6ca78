//! Leaflet-based HTML intensity map.

use std::fmt::Write;

use super::{MapArtifact, MapRenderer};
use crate::earthquake::{EarthquakeData, RegionExpectedIntensity};
use crate::{Error, Result};

/// Fill color per intensity level; level 0 is not drawn.
const INTENSITY_COLOR: [Option<&str>; 10] = [
    None,
    Some("#5Ed3CF"),
    Some("#2D87FF"),
    Some("#8FC923"),
    Some("#F5F302"),
    Some("#CCAA47"),
    Some("#AC7E4F"),
    Some("#FF9C26"),
    Some("#D95656"),
    Some("#C32EEE"),
];

const TAIWAN_BOUNDS: [[f64; 2]; 2] = [[20.5, 118.5], [25.75, 123.5]];

/// Renders a static (non-interactive) Leaflet page with one marker per region
/// and a cross at the epicenter.
#[derive(Debug, Default)]
pub struct HtmlMapRenderer;

impl HtmlMapRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl MapRenderer for HtmlMapRenderer {
    fn draw(
        &self,
        earthquake: &EarthquakeData,
        expected: &[RegionExpectedIntensity],
    ) -> Result<MapArtifact> {
        if expected.is_empty() {
            return Err(Error::artifact_unavailable(
                "intensity has not been calculated for any region",
            ));
        }

        let mut markers = String::new();
        for item in expected {
            let Some(color) = INTENSITY_COLOR[item.intensity.level() as usize] else {
                continue;
            };
            writeln!(
                markers,
                "L.circleMarker([{:.4}, {:.4}], {{radius: 6, color: 'black', weight: 0.25, fillColor: '{}', fillOpacity: 1}}).addTo(m);",
                item.region.lat, item.region.lon, color
            )
            .map_err(|e| Error::Other(e.to_string()))?;
        }

        let [[south, west], [north, east]] = TAIWAN_BOUNDS;
        let html = format!(
            r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css">
<script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
<style>
html, body, #map {{ height: 100%; margin: 0; }}
.marker-icon {{ font-size: 48px; color: red; }}
@media screen and (width > 992px) {{ .marker-icon {{ font-size: 24px; }} }}
</style>
</head>
<body>
<div id="map"></div>
<script>
var m = L.map('map', {{zoomControl: false, scrollWheelZoom: false, doubleClickZoom: false, touchZoom: false, dragging: false}});
m.fitBounds([[{south}, {west}], [{north}, {east}]]);
{markers}L.marker([{lat:.4}, {lon:.4}], {{icon: L.divIcon({{html: '<div class="marker-icon">&#10006;&#xfe0e;</div>', className: ''}})}}).bindPopup('震央').addTo(m);
</script>
</body>
</html>
"#,
            lat = earthquake.location.lat,
            lon = earthquake.location.lon,
        );

        Ok(MapArtifact::html(html))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::earthquake::{EarthquakeLocation, Intensity, RegionInfo};
    use chrono::Utc;
    use std::sync::Arc;

    fn quake() -> EarthquakeData {
        EarthquakeData::new(
            EarthquakeLocation {
                lon: 121.6,
                lat: 24.0,
                name: None,
            },
            6.0,
            10.0,
            Utc::now(),
            None,
        )
    }

    fn expected(level: u8) -> RegionExpectedIntensity {
        RegionExpectedIntensity {
            region: Arc::new(RegionInfo {
                code: 970,
                city: "花蓮縣".to_string(),
                name: "花蓮市".to_string(),
                lat: 23.977,
                lon: 121.604,
                site_effect: 1.0,
            }),
            value: level as f64,
            intensity: Intensity::new(level).unwrap(),
            distance_km: 10.0,
            s_arrival: Utc::now(),
        }
    }

    #[test]
    fn test_draw_includes_colored_regions() {
        let artifact = HtmlMapRenderer::new()
            .draw(&quake(), &[expected(5), expected(0)])
            .unwrap();
        let html = std::str::from_utf8(&artifact.content).unwrap();

        assert_eq!(artifact.extension, "html");
        assert!(!artifact.is_image());
        assert!(html.contains("#CCAA47"));
        assert_eq!(html.matches("L.circleMarker").count(), 1);
        assert!(html.contains("震央"));
    }

    #[test]
    fn test_draw_without_estimate_fails() {
        let err = HtmlMapRenderer::new().draw(&quake(), &[]).unwrap_err();
        assert!(matches!(err, Error::ArtifactUnavailable(_)));
    }
}
