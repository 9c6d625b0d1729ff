use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use recruit_assist::agent::Agent;
use recruit_assist::channels::CliChannel;
use recruit_assist::config::AppConfig;
use recruit_assist::intake::{
    ConversationMachine, FieldSchema, InquiryResponder, LlmIntentClassifier, LlmSlotExtractor,
    SessionManager,
};
use recruit_assist::llm::create_provider;
use recruit_assist::store::{LibSqlBackend, seed_job_postings};

/// Log to stderr, plus a daily-rotated file when a log directory is set.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "recruit-assist.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(file_layer)
        .init();

    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok(); // load .env if present; ignore if missing

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let _log_guard = init_tracing(config.log_dir.as_deref());

    eprintln!("Recruit Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {} ({:?})", config.llm.model, config.llm.backend);
    eprintln!("   Database: {}", config.db_path.display());

    let llm = create_provider(&config.llm)?;

    // ── Database ─────────────────────────────────────────────────────────
    let db = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );

    if let Some(ref seed_path) = config.seed_jobs_path {
        let count = seed_job_postings(db.as_ref(), seed_path)
            .await
            .with_context(|| format!("Failed to seed jobs from {}", seed_path.display()))?;
        eprintln!("   Seeded {} job posting(s) from {}", count, seed_path.display());
    }

    // ── Conversation engine ──────────────────────────────────────────────
    let intake = config.intake.clone();
    let machine = ConversationMachine::new(
        FieldSchema::recruiting(intake.reject_values.clone()),
        Arc::new(LlmIntentClassifier::new(llm.clone())),
        Arc::new(LlmSlotExtractor::new(llm.clone(), intake.reject_values.clone())),
        db.clone(),
        InquiryResponder::new(db.clone(), llm.clone()),
        intake.clone(),
    );
    let sessions = Arc::new(SessionManager::new(Arc::new(machine)).with_store(db.clone()));

    eprintln!(
        "   Max attempts per field: {}, call timeout: {}s",
        intake.max_field_retries,
        intake.call_timeout.as_secs()
    );
    eprintln!("   Say \"I want to apply for a job\" or ask about open positions. /help for commands.\n");

    let agent = Agent::new(
        Arc::new(CliChannel::default()),
        sessions,
        intake.session_idle_timeout,
    );
    agent.run().await?;

    Ok(())
}
