//! The shipped example settings and region catalog must load.

use std::path::Path;

use eew_notify::config::AppConfig;
use eew_notify::earthquake::RegionCatalog;
use eew_notify::notification::ChannelConfig;

fn manifest_path(rel: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join(rel)
}

#[test]
fn test_example_config_loads() {
    let config = AppConfig::load(&manifest_path("config.example.toml")).unwrap();

    assert!(!config.debug_mode);
    assert!(config.eew_source.accepts("cwa"));
    assert!(!config.eew_source.accepts("trem"));
    assert_eq!(config.customization.threshold.level().unwrap(), 4.0);
    assert_eq!(config.source.api_nodes.len(), 2);
    assert!(config.map.upload_target().is_some());

    let types: Vec<_> = config.channels.iter().map(ChannelConfig::channel_type).collect();
    assert_eq!(types, vec!["discord", "telegram", "line_notify", "webhook"]);
    assert!(config.channels.iter().all(|c| !c.is_enabled()));
}

#[test]
fn test_region_catalog_loads() {
    let catalog = RegionCatalog::load(&manifest_path("assets/regions.json")).unwrap();

    assert!(catalog.len() >= 10);
    assert!(
        catalog
            .regions()
            .iter()
            .any(|r| r.city == "花蓮縣" && r.name == "花蓮市")
    );
}
