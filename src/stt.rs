//! Speech-to-text using the hosted Whisper API.
//!
//! Converts voice messages (OGG Opus from Telegram) to text. The model
//! runs remotely; this is only the HTTP client surface.

use reqwest::multipart;
use serde::Deserialize;
use tracing::info;

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Whisper API client.
pub struct Transcriber {
    api_key: String,
    model: String,
    http: reqwest::Client,
}

impl Transcriber {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            model: "whisper-1".to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Transcribe audio bytes. The filename drives the service's format
    /// detection; `language` is an optional hint ("ru", "en").
    pub async fn transcribe(
        &self,
        audio: &[u8],
        filename: &str,
        language: Option<&str>,
    ) -> Result<String, String> {
        info!("Transcribing audio ({} bytes)", audio.len());

        let part = multipart::Part::bytes(audio.to_vec())
            .file_name(filename.to_string())
            .mime_str("audio/ogg")
            .map_err(|e| format!("Failed to build audio part: {e}"))?;

        let mut form = multipart::Form::new()
            .text("model", self.model.clone())
            .part("file", part);
        if let Some(lang) = language {
            form = form.text("language", lang.to_string());
        }

        let response = self
            .http
            .post("https://api.openai.com/v1/audio/transcriptions")
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| format!("Transcription request failed: {e}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Transcription error {status}: {body}"));
        }

        let transcription: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse transcription response: {e}"))?;

        let preview: String = transcription.text.chars().take(50).collect();
        info!("Transcription successful: \"{}\"", preview);
        Ok(transcription.text)
    }
}
