//! Intensity map rendering and hosting.
//!
//! Drawing runs on the blocking pool once a final revision has its intensity
//! estimate; the dispatch coordinator only waits for the outcome and asks a
//! [`MapProvider`] to publish it.

mod render;
mod upload;

pub use render::HtmlMapRenderer;
pub use upload::ScriptUploadProvider;

use async_trait::async_trait;
use bytes::Bytes;

use crate::Result;
use crate::earthquake::{EarthquakeData, RegionExpectedIntensity};

/// A rendered map ready for upload or attachment.
#[derive(Debug, Clone)]
pub struct MapArtifact {
    pub content: Bytes,
    pub content_type: String,
    /// File extension without the dot.
    pub extension: &'static str,
}

impl MapArtifact {
    pub fn html(content: impl Into<Bytes>) -> Self {
        Self {
            content: content.into(),
            content_type: "text/html; charset=utf-8".to_string(),
            extension: "html",
        }
    }

    /// Whether chat providers can show this artifact as an inline picture.
    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }
}

/// Draws the intensity map of an earthquake. Called on the blocking pool.
pub trait MapRenderer: Send + Sync {
    fn draw(
        &self,
        earthquake: &EarthquakeData,
        expected: &[RegionExpectedIntensity],
    ) -> Result<MapArtifact>;
}

/// Publishes a drawn map and returns its public URL.
#[async_trait]
pub trait MapProvider: Send + Sync {
    async fn upload(&self, event_id: &str, artifact: &MapArtifact) -> Result<String>;
}
