//! Settings file model.
//!
//! Everything is read from one TOML document. Every section has defaults so a
//! minimal file only needs the `[[channels]]` it wants to deliver to.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::notification::ChannelConfig;
use crate::utils::fs;
use crate::{Error, Result};

/// Root settings document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Switches the default log directive to debug.
    pub debug_mode: bool,
    pub log: LogConfig,
    pub eew_source: EewSourceConfig,
    pub customization: CustomizationConfig,
    pub source: SourceConfig,
    pub retention: RetentionConfig,
    pub map: MapConfig,
    pub estimator: EstimatorConfig,
    pub channels: Vec<ChannelConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            debug_mode: false,
            log: LogConfig::default(),
            eew_source: EewSourceConfig::default(),
            customization: CustomizationConfig::default(),
            source: SourceConfig::default(),
            retention: RetentionConfig::default(),
            map: MapConfig::default(),
            estimator: EstimatorConfig::default(),
            channels: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load and validate a settings file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string_with_op("reading settings file", path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate a settings document.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Structural checks. The customization threshold is deliberately left to the
    /// gate so a bad value suppresses alerts instead of preventing startup.
    pub fn validate(&self) -> Result<()> {
        if self.source.poll_interval_ms == 0 {
            return Err(Error::config("source.poll_interval_ms must be greater than 0"));
        }
        if self.source.api_nodes.is_empty() {
            return Err(Error::config("source.api_nodes must list at least one node"));
        }
        for node in &self.source.api_nodes {
            url::Url::parse(node)
                .map_err(|e| Error::config(format!("source.api_nodes entry {node:?}: {e}")))?;
        }
        if self.map.enabled && self.map.upload_target().is_none() {
            return Err(Error::config(
                "map.enabled requires map.upload_url, map.upload_key and map.show_map_url",
            ));
        }
        if self.customization.enable && self.customization.threshold.level().is_err() {
            warn!(
                threshold = ?self.customization.threshold,
                "customization.threshold is not numeric; alerts will be suppressed until fixed"
            );
        }
        Ok(())
    }
}

/// `[log]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Directory for the daily rolling log files.
    pub dir: PathBuf,
    /// Filter directive; `RUST_LOG` takes precedence.
    pub filter: Option<String>,
    /// Rolled files older than this are deleted.
    pub retention_days: i64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            filter: None,
            retention_days: 7,
        }
    }
}

/// `[eew_source]` section: which upstream providers are relayed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EewSourceConfig {
    /// Accept every provider regardless of the per-provider flags.
    pub all: bool,
    /// Per-provider flags, e.g. `cwa = true`.
    #[serde(flatten)]
    pub providers: BTreeMap<String, bool>,
}

impl Default for EewSourceConfig {
    fn default() -> Self {
        Self {
            all: true,
            providers: BTreeMap::new(),
        }
    }
}

impl EewSourceConfig {
    pub fn accepts(&self, provider: &str) -> bool {
        self.all || self.providers.get(provider).copied().unwrap_or(false)
    }
}

/// Threshold as written in the settings file.
///
/// Operators write either `threshold = 4` or `threshold = "4"`; anything else is kept
/// verbatim so the gate can reject it at evaluation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThresholdSetting {
    Number(f64),
    Text(String),
    Invalid(toml::Value),
}

impl ThresholdSetting {
    /// Numeric threshold level.
    pub fn level(&self) -> Result<f64> {
        match self {
            Self::Number(n) if n.is_finite() => Ok(*n),
            Self::Number(n) => Err(Error::config(format!(
                "customization.threshold must be a finite number, got {n}"
            ))),
            Self::Text(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .ok_or_else(|| {
                    Error::config(format!("customization.threshold must be numeric, got {s:?}"))
                }),
            Self::Invalid(v) => Err(Error::config(format!(
                "customization.threshold must be numeric, got {v}"
            ))),
        }
    }
}

/// `[customization]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomizationConfig {
    /// Enables threshold gating and the custom region list.
    pub enable: bool,
    /// Minimum intensity level that makes a revision alert-worthy.
    pub threshold: ThresholdSetting,
    /// Region codes reported in customized mode.
    pub custom_regions: Vec<u32>,
}

impl Default for CustomizationConfig {
    fn default() -> Self {
        Self {
            enable: false,
            threshold: ThresholdSetting::Number(4.0),
            custom_regions: Vec::new(),
        }
    }
}

/// `[source]` section: the upstream EEW HTTP API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub poll_interval_ms: u64,
    pub request_timeout_secs: u64,
    pub api_nodes: Vec<String>,
    /// How long a seen alert id is remembered for de-duplication.
    pub alert_ttl_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            request_timeout_secs: 10,
            api_nodes: (1..=2)
                .map(|i| format!("https://api-{i}.exptech.dev/api/v1"))
                .collect(),
            alert_ttl_secs: 60 * 60,
        }
    }
}

/// `[retention]` section: how long per-event dispatch state is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Kept this long after the event reaches a terminal dispatch phase.
    pub grace_secs: u64,
    /// Any event without a revision for this long is evicted.
    pub idle_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            grace_secs: 10 * 60,
            idle_secs: 60 * 60,
            sweep_interval_secs: 60,
        }
    }
}

/// `[map]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub enabled: bool,
    /// Script endpoint receiving the rendered map.
    pub upload_url: Option<String>,
    pub upload_key: Option<String>,
    /// Public viewer; the file name is appended as a query parameter.
    pub show_map_url: Option<String>,
}

/// Resolved map upload target.
#[derive(Debug, Clone)]
pub struct MapUploadTarget {
    pub upload_url: String,
    pub upload_key: String,
    pub show_map_url: String,
}

impl MapConfig {
    pub fn upload_target(&self) -> Option<MapUploadTarget> {
        match (&self.upload_url, &self.upload_key, &self.show_map_url) {
            (Some(upload_url), Some(upload_key), Some(show_map_url))
                if !upload_url.is_empty() && !show_map_url.is_empty() =>
            {
                Some(MapUploadTarget {
                    upload_url: upload_url.clone(),
                    upload_key: upload_key.clone(),
                    show_map_url: show_map_url.clone(),
                })
            }
            _ => None,
        }
    }
}

/// `[estimator]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// JSON region catalog used by the built-in intensity estimator.
    pub regions_file: PathBuf,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            regions_file: PathBuf::from("assets/regions.json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_app_config_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert!(!config.debug_mode);
        assert!(!config.customization.enable);
        assert_eq!(config.source.poll_interval_ms, 500);
        assert_eq!(config.source.api_nodes.len(), 2);
        assert_eq!(config.retention.grace_secs, 600);
        assert!(config.channels.is_empty());
        assert!(config.eew_source.accepts("cwa"));
    }

    #[test]
    fn test_parse_full_document() {
        let doc = r#"
            debug_mode = true

            [log]
            dir = "/tmp/eew-logs"
            retention_days = 3

            [eew_source]
            all = false
            cwa = true
            trem = false

            [customization]
            enable = true
            threshold = "5"
            custom_regions = [100, 101]

            [[channels]]
            type = "discord"
            enabled = true
            webhook_url = "https://discord.com/api/webhooks/1/abc"

            [[channels]]
            type = "line_notify"
            enabled = true
            token = "line-token"
        "#;

        let config = AppConfig::from_toml_str(doc).unwrap();
        assert!(config.debug_mode);
        assert_eq!(config.log.retention_days, 3);
        assert!(config.eew_source.accepts("cwa"));
        assert!(!config.eew_source.accepts("trem"));
        assert!(!config.eew_source.accepts("jma"));
        assert_eq!(config.customization.threshold.level().unwrap(), 5.0);
        assert_eq!(config.customization.custom_regions, vec![100, 101]);
        assert_eq!(config.channels.len(), 2);
        assert_eq!(config.channels[1].channel_type(), "line_notify");
    }

    #[rstest]
    #[case("threshold = 5", Some(5.0))]
    #[case("threshold = 4.5", Some(4.5))]
    #[case("threshold = \" 6 \"", Some(6.0))]
    #[case("threshold = \"strong\"", None)]
    #[case("threshold = true", None)]
    fn test_threshold_level(#[case] line: &str, #[case] expected: Option<f64>) {
        let doc = format!("[customization]\nenable = true\n{line}\n");
        let config = AppConfig::from_toml_str(&doc).unwrap();
        let level = config.customization.threshold.level();
        match expected {
            Some(value) => assert_eq!(level.unwrap(), value),
            None => assert!(matches!(level, Err(Error::Configuration(_)))),
        }
    }

    #[test]
    fn test_map_enabled_requires_target() {
        let err = AppConfig::from_toml_str("[map]\nenabled = true\n").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let config = AppConfig::from_toml_str(
            r#"
            [map]
            enabled = true
            upload_url = "https://script.example.com/exec"
            upload_key = "k"
            show_map_url = "https://maps.example.com/view"
            "#,
        )
        .unwrap();
        assert!(config.map.upload_target().is_some());
    }

    #[test]
    fn test_rejects_invalid_api_node() {
        let err = AppConfig::from_toml_str("[source]\napi_nodes = [\"not a url\"]\n").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
