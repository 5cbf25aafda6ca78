//! Human-readable alert text.

use std::fmt::Write;

use chrono_tz::Tz;

use super::table::RegionIntensityTable;
use crate::earthquake::EewRevision;

const FIRST_REPORT_HEADER: &str = "🚨趴下,掩護,穩住🚨\n⚠️ 僅供參考 ⚠️\n預估震度|抵達時間:";
const UPDATE_HEADER: &str = "🚨趴下,掩護,穩住🚨\n⚠️ 僅供參考 ⚠️\n震度更新|抵達時間:";
const BREAKDOWN_FOOTER: &str = "⚠️請以氣象署為準⚠️";

/// Seconds until `arrival_epoch`, never negative.
pub fn remaining_seconds(arrival_epoch: i64, now_epoch: i64) -> i64 {
    (arrival_epoch - now_epoch).max(0)
}

/// Renders alerts in the operator's local time.
#[derive(Debug, Clone, Copy)]
pub struct MessageFormatter {
    tz: Tz,
}

impl Default for MessageFormatter {
    fn default() -> Self {
        Self {
            tz: chrono_tz::Asia::Taipei,
        }
    }
}

impl MessageFormatter {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn render_title(&self, revision: &EewRevision) -> String {
        if revision.final_report {
            format!("地震速報 第 {} 報(最終報)", revision.serial)
        } else {
            format!("地震速報 第 {} 報", revision.serial)
        }
    }

    pub fn render_summary(&self, revision: &EewRevision) -> String {
        let eq = &revision.earthquake;
        let time = eq.origin_time.with_timezone(&self.tz).format("%m月%d日 %H:%M:%S");
        format!(
            "{time},\n發生規模 {:.1} 地震,\n編號{},\n震央位在{},\n震源深度{} 公里,\n最大震度{}\n(發報單位: {})",
            eq.magnitude,
            revision.id,
            eq.location,
            eq.depth_km,
            eq.max_intensity_label(),
            revision.provider.display_name(),
        )
    }

    /// Every row of the table with its countdown. Rows already reached read "已抵達".
    pub fn render_region_breakdown(
        &self,
        table: &RegionIntensityTable,
        now_epoch: i64,
        serial: u32,
    ) -> String {
        let mut text = String::from(if serial <= 1 {
            FIRST_REPORT_HEADER
        } else {
            UPDATE_HEADER
        });

        for (key, record) in table.iter() {
            let remaining = remaining_seconds(record.arrival_epoch, now_epoch);
            // Writing to a String cannot fail.
            let _ = write!(text, "\n{} {}:{}", key.city, key.region, record.label);
            if remaining == 0 {
                text.push_str("\n已抵達");
            } else {
                let _ = write!(text, "\n剩餘{remaining}秒抵達");
            }
        }

        text.push('\n');
        text.push_str(BREAKDOWN_FOOTER);
        text
    }

    pub fn render_image_caption(&self, revision: &EewRevision, map_url: Option<&str>) -> String {
        let summary = self.render_summary(revision);
        match map_url {
            Some(url) => format!("{summary}\n⚠️圖片僅供參考⚠️\n{url}\n⚠️以氣象署為準⚠️"),
            None => format!("{summary}\n⚠️震度圖僅供參考,請以氣象署為準⚠️"),
        }
    }
}
