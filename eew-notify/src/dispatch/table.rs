//! Cumulative per-event region intensity table.

use serde::Serialize;

use crate::earthquake::RegionEstimate;

/// `(city, region)` row key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RegionKey {
    pub city: String,
    pub region: String,
}

impl RegionKey {
    pub fn new(city: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            region: region.into(),
        }
    }
}

/// Latest intensity of a region and the arrival time first reported for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionRecord {
    pub level: i32,
    pub label: String,
    /// Unix seconds. Fixed once the region enters the table.
    pub arrival_epoch: i64,
}

/// Which rows a revision may contribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportMode {
    /// One row per city; only regions that will actually shake (level > 0).
    Default,
    /// Operator-selected regions, including level 0.
    Customized,
}

impl ReportMode {
    pub fn from_customization(enable: bool) -> Self {
        if enable { Self::Customized } else { Self::Default }
    }

    fn accepts(self, level: i32) -> bool {
        match self {
            Self::Default => level > 0,
            Self::Customized => level >= 0,
        }
    }
}

/// Insertion-ordered map of every region ever reported for one event.
///
/// Region counts are small (one row per city by default) so a vector keeps the
/// display order without an extra index.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegionIntensityTable {
    rows: Vec<(RegionKey, RegionRecord)>,
}

impl RegionIntensityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge the estimates of one revision.
    ///
    /// A region seen for the first time takes its reported arrival, whatever the
    /// serial. A known region only gets its intensity replaced.
    pub fn update(&mut self, estimates: &[RegionEstimate], serial: u32, mode: ReportMode) -> &Self {
        for estimate in estimates.iter().filter(|e| mode.accepts(e.level)) {
            let key = RegionKey::new(estimate.city.as_str(), estimate.region.as_str());
            match self.rows.iter_mut().find(|(k, _)| *k == key) {
                Some((_, record)) => {
                    record.level = estimate.level;
                    record.label.clone_from(&estimate.label);
                }
                None => {
                    if serial > 1 {
                        tracing::debug!(
                            city = %key.city,
                            region = %key.region,
                            serial,
                            "Region first reported on a later revision"
                        );
                    }
                    self.rows.push((
                        key,
                        RegionRecord {
                            level: estimate.level,
                            label: estimate.label.clone(),
                            arrival_epoch: estimate.s_arrival_epoch,
                        },
                    ));
                }
            }
        }
        self
    }

    pub fn get(&self, key: &RegionKey) -> Option<&RegionRecord> {
        self.rows.iter().find(|(k, _)| k == key).map(|(_, r)| r)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RegionKey, &RegionRecord)> {
        self.rows.iter().map(|(k, r)| (k, r))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Highest level in the table.
    pub fn max_level(&self) -> Option<i32> {
        self.rows.iter().map(|(_, r)| r.level).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimate(city: &str, region: &str, level: i32, arrival: i64) -> RegionEstimate {
        RegionEstimate::new(city, region, level, level.to_string(), arrival)
    }

    #[test]
    fn test_first_report_sets_arrival() {
        let mut table = RegionIntensityTable::new();
        table.update(&[estimate("CityA", "RegionA", 4, 130)], 1, ReportMode::Default);

        let record = table.get(&RegionKey::new("CityA", "RegionA")).unwrap();
        assert_eq!(record.label, "4");
        assert_eq!(record.arrival_epoch, 130);
    }

    #[test]
    fn test_update_keeps_arrival() {
        let mut table = RegionIntensityTable::new();
        table.update(&[estimate("CityA", "RegionA", 4, 130)], 1, ReportMode::Default);
        table.update(&[estimate("CityA", "RegionA", 5, 999)], 2, ReportMode::Default);

        let record = table.get(&RegionKey::new("CityA", "RegionA")).unwrap();
        assert_eq!(record.level, 5);
        assert_eq!(record.label, "5");
        assert_eq!(record.arrival_epoch, 130);
    }

    #[test]
    fn test_late_region_keeps_its_own_arrival() {
        let mut table = RegionIntensityTable::new();
        table.update(&[estimate("CityA", "RegionA", 4, 130)], 1, ReportMode::Default);
        table.update(
            &[estimate("CityA", "RegionA", 4, 131), estimate("CityB", "RegionB", 2, 160)],
            3,
            ReportMode::Default,
        );

        assert_eq!(table.len(), 2);
        let late = table.get(&RegionKey::new("CityB", "RegionB")).unwrap();
        assert_eq!(late.arrival_epoch, 160);
    }

    #[test]
    fn test_table_is_cumulative() {
        let mut table = RegionIntensityTable::new();
        table.update(&[estimate("CityA", "RegionA", 3, 100)], 1, ReportMode::Default);
        let table = table.update(&[estimate("CityB", "RegionB", 3, 110)], 2, ReportMode::Default);

        let keys: Vec<_> = table.iter().map(|(k, _)| k.city.as_str()).collect();
        assert_eq!(keys, vec!["CityA", "CityB"]);
    }

    #[test]
    fn test_mode_filters_level_zero() {
        let rows = [estimate("CityA", "RegionA", 0, 100)];

        let mut default = RegionIntensityTable::new();
        default.update(&rows, 1, ReportMode::Default);
        assert!(default.is_empty());

        let mut customized = RegionIntensityTable::new();
        customized.update(&rows, 1, ReportMode::Customized);
        assert_eq!(customized.len(), 1);
    }

    #[test]
    fn test_level_drop_to_zero_keeps_last_positive_label() {
        let mut table = RegionIntensityTable::new();
        table.update(&[estimate("CityA", "RegionA", 3, 100)], 1, ReportMode::Default);
        table.update(&[estimate("CityA", "RegionA", 0, 100)], 2, ReportMode::Default);

        assert_eq!(table.max_level(), Some(3));
    }
}
