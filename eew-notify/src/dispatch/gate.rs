//! Alert-worthiness of a revision.

use super::table::RegionIntensityTable;
use crate::Result;
use crate::config::CustomizationConfig;

/// Whether the current table is worth notifying.
///
/// With customization disabled every revision is. Otherwise any row at or above
/// the threshold opens the gate. The decision is taken from the cumulative table
/// every time, so a revision that revises every region below the threshold closes
/// it again.
pub fn should_notify(table: &RegionIntensityTable, customization: &CustomizationConfig) -> Result<bool> {
    if !customization.enable {
        return Ok(true);
    }

    let threshold = customization.threshold.level()?;
    Ok(table
        .iter()
        .any(|(_, record)| f64::from(record.level) >= threshold))
}
