//! # mirai
//!
//! Terminal front end for the Mirai chat assistant. Wires settings,
//! logging, the draft cache and the HTTP backend into a session controller.

#![deny(unsafe_code)]

mod chat;
mod render;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mirai_client::{ChatBackend, HistoryDirectory, HttpChatBackend, HttpConfig, SessionController};
use mirai_core::ConversationId;
use mirai_settings::MiraiSettings;
use mirai_store::{Database, DraftCache};
use mirai_telemetry::TelemetryConfig;

/// Mirai chat client.
#[derive(Parser, Debug)]
#[command(name = "mirai", about = "Streaming chat client for the Mirai assistant")]
struct Cli {
    /// Backend origin (overrides settings).
    #[arg(long)]
    api_url: Option<String>,

    /// Model alias forwarded to the backend.
    #[arg(long)]
    model: Option<String>,

    /// Settings file (default: ~/.mirai/settings.json).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Disable the local draft cache.
    #[arg(long)]
    no_draft: bool,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Interactive chat (default).
    Chat,
    /// Check backend health.
    Health,
    /// List past conversations.
    History,
    /// Print one conversation.
    Show {
        id: i64,
    },
    /// Print the last cached draft.
    Draft,
}

impl Cli {
    fn apply_to(&self, settings: &mut MiraiSettings) {
        if let Some(url) = &self.api_url {
            settings.api.base_url = url.trim_end_matches('/').to_string();
        }
        if self.model.is_some() {
            settings.api.model.clone_from(&self.model);
        }
        if self.no_draft {
            settings.draft.enabled = false;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level = level.to_lowercase();
        }
    }
}

fn open_drafts(settings: &MiraiSettings) -> Result<DraftCache> {
    let path = settings.draft.resolve_db_path(&mirai_settings::mirai_home());
    let db = Database::open(&path)
        .with_context(|| format!("Failed to open draft store: {}", path.display()))?;
    Ok(DraftCache::new(db))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings_path = cli
        .settings
        .clone()
        .unwrap_or_else(mirai_settings::settings_path);
    let mut settings = mirai_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings: {}", settings_path.display()))?;
    cli.apply_to(&mut settings);
    settings.validate().context("Invalid settings")?;

    let _ = mirai_telemetry::init_telemetry(&TelemetryConfig::from_level_str(
        &settings.logging.level,
        settings.logging.json,
    ));
    tracing::debug!(base_url = %settings.api.base_url, "settings loaded");

    let backend: Arc<dyn ChatBackend> = Arc::new(
        HttpChatBackend::new(
            HttpConfig::new(settings.api.base_url.clone())
                .with_connect_timeout(Duration::from_millis(settings.api.connect_timeout_ms))
                .with_model(settings.api.model.clone()),
        )
        .context("Failed to build HTTP client")?,
    );

    let mut stdout = std::io::stdout();
    match cli.command.clone().unwrap_or(Command::Chat) {
        Command::Chat => {
            let mut controller = SessionController::new(backend);
            if settings.draft.enabled {
                match open_drafts(&settings) {
                    Ok(drafts) => controller = controller.with_drafts(drafts),
                    Err(e) => tracing::warn!(error = %e, "draft cache disabled"),
                }
            }
            chat::run(controller.clone()).await?;
            controller.drafts_settled().await;
        }
        Command::Health => {
            let report = backend.health().await.context("Health check failed")?;
            writeln!(stdout, "{}", report.status.as_str())?;
            if !report.raw.is_null() {
                writeln!(stdout, "{}", serde_json::to_string_pretty(&report.raw)?)?;
            }
        }
        Command::History => {
            let entries = HistoryDirectory::new(backend)
                .list()
                .await
                .context("Failed to list conversations")?;
            render::write_history(&mut stdout, &entries)?;
        }
        Command::Show { id } => {
            let id = ConversationId::new(id).context("Conversation id must be positive")?;
            let detail = HistoryDirectory::new(backend)
                .load(id)
                .await
                .with_context(|| format!("Failed to load conversation {id}"))?;
            render::write_transcript(&mut stdout, &detail.into_state())?;
        }
        Command::Draft => {
            let drafts = open_drafts(&settings)?;
            match drafts.load().context("Failed to read draft")? {
                Some(state) => writeln!(stdout, "{}", serde_json::to_string_pretty(&state)?)?,
                None => writeln!(stdout, "No draft saved.")?,
            }
        }
    }
    Ok(())
}
