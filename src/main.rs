use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use secrecy::SecretString;

use mail_brief::channels::{FileTokenProvider, GmailSource, LogNotifier, MessageSource};
use mail_brief::config::{AppConfig, Settings};
use mail_brief::llm::OpenAiProvider;
use mail_brief::pipeline::{AiClassifier, MessageProcessor, Poller, RuleClassifier, spawn_poller};
use mail_brief::store::{DedupTracker, LibSqlBackend, StateStore};

#[derive(Parser)]
#[command(name = "mail-brief")]
#[command(about = "Summarise unread mail into short tagged notifications", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Poll on the configured interval until interrupted (default)
    Run,

    /// Run a single poll cycle and exit
    Once,

    /// Forget every processed message id
    Clear,

    /// Store the model API key
    SetKey { key: String },

    /// Remove the stored model API key (rule classifier only)
    ClearKey,

    /// Set the poll interval in minutes (1 to 1440)
    SetInterval { minutes: u64 },

    /// Show settings and dedup state
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env().context("Invalid configuration")?;

    let store: Arc<dyn StateStore> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );

    match cli.cmd.unwrap_or(Command::Run) {
        Command::Run => {
            let poller = Arc::new(build_poller(&config, Arc::clone(&store)).await?);
            let (handle, shutdown) = spawn_poller(poller);

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for ctrl-c")?;
            eprintln!("Shutting down...");
            shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
            handle.abort();
        }
        Command::Once => {
            let poller = build_poller(&config, store).await?;
            match poller.run_cycle().await {
                Some(Ok(report)) => println!(
                    "listed {} · notified {} · skipped {} · notify failures {} · fetch failures {}",
                    report.listed,
                    report.notified,
                    report.skipped,
                    report.notify_failed,
                    report.fetch_failed
                ),
                Some(Err(e)) => return Err(e).context("Poll cycle failed"),
                None => println!("A cycle is already running"),
            }
        }
        Command::Clear => {
            let tracker = DedupTracker::load(store).await?;
            tracker.clear().await?;
            println!("Processed message ids cleared");
        }
        Command::SetKey { key } => {
            let mut settings = Settings::load(store.as_ref()).await?;
            settings.ai_api_key = Some(SecretString::from(key.trim().to_string()));
            settings.save(store.as_ref()).await?;
            println!("API key saved");
        }
        Command::ClearKey => {
            let mut settings = Settings::load(store.as_ref()).await?;
            settings.ai_api_key = None;
            settings.save(store.as_ref()).await?;
            println!("API key removed");
        }
        Command::SetInterval { minutes } => {
            let mut settings = Settings::load(store.as_ref()).await?;
            settings.set_poll_interval(minutes);
            settings.save(store.as_ref()).await?;
            println!("Poll interval set to {} min", settings.poll_interval_minutes);
        }
        Command::Status => {
            let settings = Settings::load(store.as_ref()).await?;
            let tracker = DedupTracker::load(Arc::clone(&store)).await?;
            println!("Database:       {}", config.db_path.display());
            println!(
                "Classifier:     {}",
                if settings.has_ai_key() {
                    format!("model ({})", config.llm_model)
                } else {
                    "rules".to_string()
                }
            );
            println!("Poll interval:  {} min", settings.poll_interval_minutes);
            println!("Processed ids:  {}", tracker.len().await);
        }
    }

    Ok(())
}

async fn build_poller(config: &AppConfig, store: Arc<dyn StateStore>) -> Result<Poller> {
    let tokens = Arc::new(FileTokenProvider::new(
        config.token_file.clone(),
        config.access_token.clone(),
    ));
    let source: Arc<dyn MessageSource> =
        Arc::new(GmailSource::new(&config.gmail_api_base, tokens)?);

    let llm = Arc::new(OpenAiProvider::new(
        &config.llm_base_url,
        &config.llm_model,
        config.ai_timeout,
    )?);
    let ai = Arc::new(
        AiClassifier::new(llm, RuleClassifier::default_rules())
            .with_timeout(config.ai_timeout)
            .with_fallback_tag(config.fallback_tag),
    );

    let tracker = Arc::new(DedupTracker::load(Arc::clone(&store)).await?);
    let processor = MessageProcessor::new(source, Arc::new(LogNotifier), tracker, store).with_ai(ai);

    Ok(Poller::new(Arc::new(processor)).with_batch_size(config.batch_size))
}
