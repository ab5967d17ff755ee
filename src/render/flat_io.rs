use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::musicxml::to_musicxml;
use super::{ImageFormat, RenderError, RenderedImage, Renderer};
use crate::config::FlatIoConfig;
use crate::notes::Note;

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
const MAX_PNG_BYTES: u64 = 50 * 1024 * 1024;

/// Body of `POST /scores`.
#[derive(Debug, Serialize)]
struct NewScore<'a> {
    title: &'a str,
    privacy: &'a str,
    /// MusicXML document.
    data: &'a str,
}

/// Response of `POST /scores`; only the id is kept.
#[derive(Debug, Deserialize)]
struct CreatedScore {
    id: String,
}

/// Remote renderer: uploads the notes as MusicXML to Flat.io, downloads the
/// engraved PNG, and deletes the temporary score.
pub struct FlatIoRenderer {
    config: FlatIoConfig,
    title: String,
}

impl FlatIoRenderer {
    pub fn new(config: FlatIoConfig, title: impl Into<String>) -> Self {
        Self {
            config,
            title: title.into(),
        }
    }

    fn api_key(&self) -> Result<&str, RenderError> {
        self.config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| RenderError::NotConfigured("no Flat.io API key".into()))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn agent(&self) -> ureq::Agent {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(self.config.timeout_secs)))
            .build();
        ureq::Agent::new_with_config(config)
    }

    fn create_score(
        &self,
        agent: &ureq::Agent,
        auth: &str,
        musicxml: &str,
    ) -> Result<String, RenderError> {
        let url = self.endpoint("scores");
        log::debug!("POST {url}");
        let created: CreatedScore = agent
            .post(&url)
            .header("Authorization", auth)
            .send_json(&NewScore {
                title: &self.title,
                privacy: "private",
                data: musicxml,
            })?
            .body_mut()
            .read_json()?;
        Ok(created.id)
    }

    fn fetch_png(
        &self,
        agent: &ureq::Agent,
        auth: &str,
        score_id: &str,
    ) -> Result<Vec<u8>, RenderError> {
        let url = self.endpoint(&format!("scores/{score_id}/png"));
        log::debug!("GET {url}");
        let bytes = agent
            .get(&url)
            .header("Authorization", auth)
            .query("resolution", self.config.resolution.to_string())
            .query("margin", self.config.margin.to_string())
            .call()?
            .body_mut()
            .with_config()
            .limit(MAX_PNG_BYTES)
            .read_to_vec()?;
        if !bytes.starts_with(PNG_MAGIC) {
            return Err(RenderError::BadResponse(format!(
                "expected PNG image, got {} bytes of something else",
                bytes.len()
            )));
        }
        Ok(bytes)
    }

    fn delete_score(&self, agent: &ureq::Agent, auth: &str, score_id: &str) {
        let url = self.endpoint(&format!("scores/{score_id}"));
        log::debug!("DELETE {url}");
        if let Err(e) = agent.delete(&url).header("Authorization", auth).call() {
            log::warn!("Failed to delete Flat.io score {score_id}: {e}");
        }
    }
}

impl Renderer for FlatIoRenderer {
    fn name(&self) -> &'static str {
        "flat.io"
    }

    fn render(&self, notes: &[Note], tempo_bpm: f64) -> Result<RenderedImage, RenderError> {
        let key = self.api_key()?;
        if notes.is_empty() {
            return Err(RenderError::NothingToRender);
        }

        let musicxml = to_musicxml(notes, tempo_bpm, &self.title);
        let auth = format!("Bearer {key}");
        let agent = self.agent();

        let score_id = self.create_score(&agent, &auth, &musicxml)?;
        let png = self.fetch_png(&agent, &auth, &score_id);
        // The score is only a staging copy; remove it whether or not the download worked.
        self.delete_score(&agent, &auth, &score_id);

        Ok(RenderedImage {
            format: ImageFormat::Png,
            bytes: png?,
        })
    }
}
