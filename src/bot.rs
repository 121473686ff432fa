//! Telegram bot handlers: voice and text messages in, voice and text
//! answers out. The pipeline is transcribe → parse → query → synthesize.

use std::sync::Arc;

use chrono_tz::Tz;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::InputFile;
use teloxide::utils::command::BotCommands;
use tracing::{debug, error, info};

use crate::calendar::{CalendarAggregator, CalendarError, Event};
use crate::config::Config;
use crate::nlp::{self, Intent, NlpParser};
use crate::stt::Transcriber;
use crate::tts::Synthesizer;

const VOICE_ERROR_TEXT: &str =
    "❌ Произошла ошибка при обработке голосового сообщения. Попробуйте еще раз.";
const TEXT_ERROR_TEXT: &str = "❌ Произошла ошибка при обработке сообщения. Попробуйте еще раз.";

const HELP_TEXT: &str = "📖 Справка по командам

Я понимаю голосовые команды на русском языке:

🗓 Запросы событий:
• \"Что сегодня?\" / \"Что сегодня в календаре?\"
• \"Что завтра?\"
• \"Что в ближайшие N часов?\" (например, \"в ближайшие 3 часа\")

👤 Поиск встреч:
• \"Когда встреча с [имя]?\" (например, \"когда встреча с Иваном\")
• \"Когда встречаюсь с [имя]?\"

📝 Формат ответа:
Я отвечу голосовым сообщением со списком ваших событий.

💡 Советы:
• Говорите четко и не спешите
• Используйте простые формулировки
• Я работаю с Яндекс.Календарем и Google Calendar

Для начала используйте /start";

/// Slash commands.
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
pub enum Command {
    #[command(description = "начать работу с ботом")]
    Start,
    #[command(description = "справка по командам")]
    Help,
}

/// Shared state for all handlers. Built once at startup; the provider
/// registration inside the aggregator does not change afterwards.
pub struct BotState {
    pub config: Config,
    pub transcriber: Transcriber,
    pub synthesizer: Synthesizer,
    pub nlp: NlpParser,
    pub calendar: CalendarAggregator,
}

pub async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    _state: Arc<BotState>,
) -> ResponseResult<()> {
    match cmd {
        Command::Start => {
            let first_name = msg
                .from
                .as_ref()
                .map(|u| u.first_name.clone())
                .unwrap_or_else(|| "друг".to_string());
            bot.send_message(msg.chat.id, welcome_text(&first_name)).await?;
            if let Some(ref user) = msg.from {
                info!("User {} started bot", user.id);
            }
        }
        Command::Help => {
            bot.send_message(msg.chat.id, HELP_TEXT).await?;
            if let Some(ref user) = msg.from {
                info!("User {} requested help", user.id);
            }
        }
    }
    Ok(())
}

pub async fn handle_voice(bot: Bot, msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    if let Some(ref user) = msg.from {
        info!("Received voice message from user {}", user.id);
    }

    if let Err(e) = process_voice(&bot, &msg, &state).await {
        // Raw error text never reaches the user
        error!("Error processing voice message: {e}");
        bot.send_message(msg.chat.id, VOICE_ERROR_TEXT).await?;
    }
    Ok(())
}

pub async fn handle_text(bot: Bot, msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    if text.starts_with('/') {
        return Ok(());
    }

    if let Some(ref user) = msg.from {
        info!("Received text message from user {}: {}", user.id, text);
    }

    match process_text(text, &state).await {
        Ok(response) => {
            bot.send_message(msg.chat.id, response).await?;
        }
        Err(e) => {
            error!("Error processing text message: {e}");
            bot.send_message(msg.chat.id, TEXT_ERROR_TEXT).await?;
        }
    }
    Ok(())
}

/// The full voice pipeline: download → transcribe → parse → execute →
/// synthesize → reply.
async fn process_voice(bot: &Bot, msg: &Message, state: &BotState) -> Result<(), String> {
    let voice = msg
        .voice()
        .ok_or_else(|| "message has no voice payload".to_string())?;

    let file = bot
        .get_file(voice.file.id.clone())
        .await
        .map_err(|e| format!("failed to get voice file: {e}"))?;
    let mut data = Vec::new();
    bot.download_file(&file.path, &mut data)
        .await
        .map_err(|e| format!("failed to download voice file: {e}"))?;
    debug!("Voice file downloaded ({} bytes)", data.len());

    bot.send_message(msg.chat.id, "🎤 Распознаю голосовое сообщение...")
        .await
        .map_err(|e| format!("failed to send status: {e}"))?;

    let text = state
        .transcriber
        .transcribe(&data, "voice.ogg", Some("ru"))
        .await?;
    info!("Transcribed text: {}", text);

    let command = state.nlp.parse(&text).await.map_err(|e| e.to_string())?;
    let response_text = execute_command(&state.calendar, &command, state.config.timezone)
        .await
        .map_err(|e| e.to_string())?;

    bot.send_message(msg.chat.id, "🔊 Генерирую ответ...")
        .await
        .map_err(|e| format!("failed to send status: {e}"))?;

    let audio = state.synthesizer.synthesize(&response_text, None).await?;
    let input = InputFile::memory(audio).file_name("response.mp3");
    bot.send_voice(msg.chat.id, input)
        .await
        .map_err(|e| format!("failed to send voice reply: {e}"))?;

    if let Some(ref user) = msg.from {
        info!("Voice response sent to user {}", user.id);
    }
    Ok(())
}

async fn process_text(text: &str, state: &BotState) -> Result<String, String> {
    let command = state.nlp.parse(text).await.map_err(|e| e.to_string())?;
    execute_command(&state.calendar, &command, state.config.timezone)
        .await
        .map_err(|e| e.to_string())
}

/// Execute a parsed command against the calendar aggregator and render
/// the answer.
pub async fn execute_command(
    calendar: &CalendarAggregator,
    command: &nlp::Command,
    tz: Tz,
) -> Result<String, CalendarError> {
    match command.intent {
        Intent::GetToday => {
            let events = calendar.get_today_events().await?;
            Ok(format_events_response(&events, "на сегодня", tz))
        }
        Intent::GetTomorrow => {
            let events = calendar.get_tomorrow_events().await?;
            Ok(format_events_response(&events, "на завтра", tz))
        }
        Intent::GetUpcoming => {
            let hours = command
                .parameters
                .get("hours")
                .and_then(|v| v.as_i64())
                .unwrap_or(24);
            let events = calendar.get_upcoming_events(hours).await?;
            Ok(format_events_response(
                &events,
                &format!("в ближайшие {hours} часов"),
                tz,
            ))
        }
        Intent::FindMeeting => {
            let person = command
                .parameters
                .get("person")
                .and_then(|v| v.as_str())
                .unwrap_or("");
            let events = calendar.find_meetings_with_person(person, 7).await?;
            if events.is_empty() {
                Ok(format!("Встреч с {person} не найдено."))
            } else {
                Ok(format_events_response(
                    &events,
                    &format!("встречи с {person}"),
                    tz,
                ))
            }
        }
        Intent::CreateEvent => Ok("Эта команда пока не поддерживается.".to_string()),
        Intent::Unknown => Ok(
            "Извините, я не понял вашу команду. Попробуйте сказать: 'Что сегодня в календаре?'"
                .to_string(),
        ),
    }
}

/// Render an event list as a Russian text answer. Times are shown in
/// the configured timezone.
pub fn format_events_response(events: &[Event], context: &str, tz: Tz) -> String {
    if events.is_empty() {
        return if context.is_empty() {
            "У вас нет событий. Вы свободны!".to_string()
        } else {
            format!("У вас нет событий {context}. Вы свободны!")
        };
    }

    let mut response = if context.is_empty() {
        format!("Найдено событий: {}\n\n", events.len())
    } else {
        format!("У вас {} событий {}:\n\n", events.len(), context)
    };

    for (i, event) in events.iter().enumerate() {
        let start = event.start.with_timezone(&tz).format("%H:%M");
        let end = event.end.with_timezone(&tz).format("%H:%M");
        response.push_str(&format!("{}. {}\n", i + 1, event.title));
        response.push_str(&format!("   Время: {start} - {end}\n"));
        if !event.attendees.is_empty() {
            response.push_str(&format!("   Участники: {}\n", event.attendees.len()));
        }
        if let Some(ref location) = event.location {
            response.push_str(&format!("   Место: {location}\n"));
        }
        response.push('\n');
    }

    response.trim_end().to_string()
}

fn welcome_text(first_name: &str) -> String {
    format!(
        "Привет, {first_name}! 👋

Я голосовой календарь-бот. Отправьте мне голосовое сообщение с командой, и я помогу вам с календарем.

Доступные команды:
• \"Что сегодня в календаре?\" - события на сегодня
• \"Что завтра?\" - события на завтра
• \"Что в ближайшие 3 часа?\" - ближайшие события
• \"Когда встреча с Иваном?\" - найти встречу с человеком

Отправьте голосовое сообщение или используйте /help для подробной справки."
    )
}
