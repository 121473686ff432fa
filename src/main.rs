use std::sync::Arc;

use teloxide::prelude::*;
use tracing::info;
use tracing_subscriber::prelude::*;

use voicecal::bot::{self, BotState, Command};
use voicecal::calendar::{CaldavProvider, CalendarAggregator, IcsProvider};
use voicecal::config::Config;
use voicecal::nlp::NlpParser;
use voicecal::stt::Transcriber;
use voicecal::tts::Synthesizer;

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "voicecal.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    // Setup logging: stdout plus a non-blocking file appender
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("voicecal.log"))
        .expect("Failed to open log file");
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    info!("🚀 Starting voicecal...");
    info!("Loaded config from {config_path}");

    let bot = Bot::new(&config.telegram_bot_token);

    info!("Initializing STT service (Whisper)...");
    let transcriber = Transcriber::new(config.openai_api_key.clone());

    info!("Initializing TTS service (ElevenLabs)...");
    let synthesizer = Synthesizer::new(
        config.elevenlabs_api_key.clone(),
        Some(config.elevenlabs_voice_id.clone()),
    );

    info!("Initializing NLP service (GPT-4)...");
    let nlp = NlpParser::new(config.openai_api_key.clone(), "gpt-4".to_string());

    info!("Initializing calendar aggregator...");
    let mut calendar = CalendarAggregator::new(config.timezone);
    calendar.add_provider(
        "yandex",
        Arc::new(CaldavProvider::new(
            config.yandex_calendar_login.clone(),
            config.yandex_calendar_password.clone(),
            config.yandex_calendar_url.clone(),
        )),
    );
    match config.google_calendar_ics_url {
        Some(ref ics_url) => {
            calendar.add_provider("google", Arc::new(IcsProvider::new(ics_url.clone())));
        }
        None => info!("Google Calendar ICS URL not configured, skipping"),
    }

    let state = Arc::new(BotState {
        config,
        transcriber,
        synthesizer,
        nlp,
        calendar,
    });

    info!("🤖 Bot is running! Press Ctrl+C to stop.");

    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint(bot::handle_command),
        )
        .branch(
            Update::filter_message()
                .filter(|msg: Message| msg.voice().is_some())
                .endpoint(bot::handle_voice),
        )
        .branch(Update::filter_message().endpoint(bot::handle_text));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("✅ Shutdown complete");
}
