//! Configuration module.
//!
//! Settings are loaded from a TOML file into [`AppConfig`] and served through
//! [`ConfigService`], which supports reloading without restarting the process.

pub mod service;
pub mod settings;

pub use service::{ConfigService, ConfigUpdateEvent};
pub use settings::{
    AppConfig, CustomizationConfig, EewSourceConfig, EstimatorConfig, LogConfig, MapConfig,
    MapUploadTarget, RetentionConfig, SourceConfig, ThresholdSetting,
};
