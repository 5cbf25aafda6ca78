//! Earthquake early warning data model.

pub mod eew;
pub mod intensity;
pub mod model;
pub mod signal;

pub use eew::{
    EarthquakeData, EarthquakeLocation, EarthquakePayload, EewPayload, EewRevision,
    IntensityReport, MapOutcome, Provider, RegionEstimate,
};
pub use intensity::Intensity;
pub use model::{
    AttenuationEstimator, IntensityEstimator, RegionCatalog, RegionExpectedIntensity, RegionInfo,
    summarize_regions,
};
pub use signal::Completion;
