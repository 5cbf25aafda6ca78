use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use super::{MapArtifact, MapProvider};
use crate::config::MapUploadTarget;
use crate::{Error, Result};

/// Uploads maps to a script endpoint that stores `fileContent` under `fileName`,
/// served back through a viewer URL.
pub struct ScriptUploadProvider {
    client: Client,
    target: MapUploadTarget,
}

impl ScriptUploadProvider {
    pub fn new(client: Client, target: MapUploadTarget) -> Self {
        Self { client, target }
    }

    fn file_name(event_id: &str, artifact: &MapArtifact) -> String {
        format!("{}.{}", event_id, artifact.extension)
    }

    /// Public URL of an uploaded map.
    pub fn public_url(&self, file_name: &str) -> Result<String> {
        let mut url = url::Url::parse(&self.target.show_map_url)
            .map_err(|e| Error::config(format!("map.show_map_url: {e}")))?;
        url.query_pairs_mut().append_pair("fileName", file_name);
        Ok(url.into())
    }
}

#[async_trait]
impl MapProvider for ScriptUploadProvider {
    async fn upload(&self, event_id: &str, artifact: &MapArtifact) -> Result<String> {
        let file_name = Self::file_name(event_id, artifact);
        let content = String::from_utf8_lossy(&artifact.content);
        let params = [
            ("scriptKey", self.target.upload_key.as_str()),
            ("fileName", file_name.as_str()),
            ("fileContent", content.as_ref()),
        ];

        let response = self
            .client
            .post(&self.target.upload_url)
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(event_id, %status, "Map upload rejected");
            return Err(Error::artifact_unavailable(format!(
                "map upload returned HTTP {status}: {body}"
            )));
        }

        let url = self.public_url(&file_name)?;
        debug!(event_id, url = %url, "Map uploaded");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::http_client::test_client;

    #[test]
    fn test_public_url_appends_file_name() {
        let provider = ScriptUploadProvider::new(
            test_client(),
            MapUploadTarget {
                upload_url: "https://script.example.com/exec".to_string(),
                upload_key: "key".to_string(),
                show_map_url: "https://maps.example.com/view".to_string(),
            },
        );
        let artifact = MapArtifact::html("<html></html>");
        let name = ScriptUploadProvider::file_name("1130123", &artifact);

        assert_eq!(name, "1130123.html");
        assert_eq!(
            provider.public_url(&name).unwrap(),
            "https://maps.example.com/view?fileName=1130123.html"
        );
    }
}
