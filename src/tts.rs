//! Text-to-speech using the ElevenLabs API.
//!
//! Generates MP3 audio from text. Telegram accepts the bytes directly
//! as a voice message payload.

use serde::Serialize;
use tracing::{debug, info};

/// Default voice: Rachel.
pub const DEFAULT_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";

const MODEL_ID: &str = "eleven_multilingual_v2";

#[derive(Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model_id: &'static str,
}

/// ElevenLabs TTS client.
pub struct Synthesizer {
    api_key: String,
    voice_id: String,
    http: reqwest::Client,
}

impl Synthesizer {
    pub fn new(api_key: String, voice_id: Option<String>) -> Self {
        Self {
            api_key,
            voice_id: voice_id.unwrap_or_else(|| DEFAULT_VOICE_ID.to_string()),
            http: reqwest::Client::new(),
        }
    }

    /// Synthesize speech from text, returning MP3 bytes.
    ///
    /// `voice_id` overrides the configured default for this call.
    pub async fn synthesize(&self, text: &str, voice_id: Option<&str>) -> Result<Vec<u8>, String> {
        if text.trim().is_empty() {
            return Err("Text cannot be empty".to_string());
        }

        let voice = voice_id.unwrap_or(&self.voice_id);
        let preview: String = text.chars().take(50).collect();
        info!("Synthesizing speech: \"{}\" (voice: {})", preview, voice);

        let response = self
            .http
            .post(format!("https://api.elevenlabs.io/v1/text-to-speech/{voice}"))
            .header("xi-api-key", &self.api_key)
            .header("accept", "audio/mpeg")
            .json(&SynthesisRequest {
                text,
                model_id: MODEL_ID,
            })
            .send()
            .await
            .map_err(|e| format!("TTS request failed: {e}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("TTS error {status}: {body}"));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| format!("Failed to read TTS response: {e}"))?;

        debug!("Got {} bytes of MP3 audio", audio.len());
        Ok(audio.to_vec())
    }
}
