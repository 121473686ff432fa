//! Intent parsing for voice commands via the GPT-4 chat-completions API.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const SYSTEM_PROMPT: &str = r#"Ты - ассистент для парсинга голосовых команд для календаря.
Анализируй текст и определи намерение (intent) пользователя.

Доступные интенты:
- get_today: запрос событий на сегодня (например: "что сегодня", "что в календаре сегодня")
- get_tomorrow: запрос событий на завтра (например: "что завтра", "что завтра в календаре")
- get_upcoming: запрос ближайших событий (например: "что в ближайшие 3 часа", "ближайшие встречи")
  params: {"hours": N} - количество часов
- find_meeting: поиск встречи с человеком (например: "когда встреча с Иваном", "когда встречаюсь с Петром")
  params: {"person": "имя"} - имя человека
- create_event: создание события (например: "создай встречу", "напомни о звонке")
  params: {"title": "название", "time": "время"} - опционально
- unknown: неизвестная команда

Ответь ТОЛЬКО в формате JSON:
{"intent": "название_интента", "params": {}}

Примеры:
Пользователь: "что сегодня в календаре"
Ответ: {"intent": "get_today", "params": {}}

Пользователь: "что в ближайшие 5 часов"
Ответ: {"intent": "get_upcoming", "params": {"hours": 5}}

Пользователь: "когда встреча с Сергеем"
Ответ: {"intent": "find_meeting", "params": {"person": "Сергей"}}"#;

/// What the user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    GetToday,
    GetTomorrow,
    GetUpcoming,
    FindMeeting,
    CreateEvent,
    Unknown,
}

impl Intent {
    fn from_str(s: &str) -> Option<Self> {
        match s {
            "get_today" => Some(Intent::GetToday),
            "get_tomorrow" => Some(Intent::GetTomorrow),
            "get_upcoming" => Some(Intent::GetUpcoming),
            "find_meeting" => Some(Intent::FindMeeting),
            "create_event" => Some(Intent::CreateEvent),
            "unknown" => Some(Intent::Unknown),
            _ => None,
        }
    }
}

/// A parsed command: one per user utterance, consumed once by the
/// bot handler, never persisted.
#[derive(Debug, Clone)]
pub struct Command {
    pub intent: Intent,
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub original_text: String,
    /// 0.9 on a successful parse, 0.0 on fallback.
    pub confidence: f64,
}

#[derive(Debug)]
pub enum NlpError {
    /// Input text was empty or whitespace.
    EmptyText,
    Http(String),
    Api(String),
    Parse(String),
}

impl fmt::Display for NlpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NlpError::EmptyText => write!(f, "text cannot be empty"),
            NlpError::Http(e) => write!(f, "HTTP error: {e}"),
            NlpError::Api(e) => write!(f, "API error: {e}"),
            NlpError::Parse(e) => write!(f, "Parse error: {e}"),
        }
    }
}

impl std::error::Error for NlpError {}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatRequestMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatRequestMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// Shape of the model's JSON answer.
#[derive(Deserialize)]
struct IntentAnswer {
    #[serde(default)]
    intent: String,
    #[serde(default)]
    params: serde_json::Map<String, serde_json::Value>,
}

/// NLP command parser.
pub struct NlpParser {
    api_key: String,
    model: String,
    http: reqwest::Client,
}

impl NlpParser {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            http: reqwest::Client::new(),
        }
    }

    /// Parse free text into a [`Command`].
    ///
    /// An unintelligible model answer is not an error: it falls back to
    /// `Intent::Unknown` with confidence 0.0. Transport and API failures
    /// are errors.
    pub async fn parse(&self, text: &str) -> Result<Command, NlpError> {
        if text.trim().is_empty() {
            return Err(NlpError::EmptyText);
        }

        info!("Parsing command: {}", text);

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatRequestMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatRequestMessage {
                    role: "user",
                    content: text.to_string(),
                },
            ],
            // Deterministic for classification
            temperature: 0.0,
            max_tokens: 150,
        };

        let response = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| NlpError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NlpError::Api(format!("{status}: {body}")));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| NlpError::Parse(e.to_string()))?;

        let content = chat
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| NlpError::Parse("empty choices".to_string()))?;

        debug!("GPT response: {}", content);
        let command = interpret_response(text, &content);
        info!(
            "Parsed command: intent={:?}, confidence={}",
            command.intent, command.confidence
        );
        Ok(command)
    }
}

/// Turn the model's raw answer into a [`Command`]. Pure, so the
/// interpretation rules are testable without the network.
fn interpret_response(original_text: &str, content: &str) -> Command {
    match serde_json::from_str::<IntentAnswer>(content) {
        Ok(answer) => {
            let intent = Intent::from_str(&answer.intent).unwrap_or_else(|| {
                warn!("Unknown intent: {}, using Unknown", answer.intent);
                Intent::Unknown
            });
            Command {
                intent,
                parameters: answer.params,
                original_text: original_text.to_string(),
                confidence: 0.9,
            }
        }
        Err(e) => {
            warn!("Failed to parse GPT response as JSON: {}", e);
            Command {
                intent: Intent::Unknown,
                parameters: serde_json::Map::new(),
                original_text: original_text.to_string(),
                confidence: 0.0,
            }
        }
    }
}
