use std::{path::PathBuf, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use client_core::{
    form::GENERIC_FAILURE_MESSAGE, wait_for_terminal_status, BookApi, ConnectionState,
    GenerateForm, GenerationClient, ReconnectPolicy, SubmitOutcome,
};
use shared::{
    domain::{BookId, GenerationConfig, ProgressEvent},
    protocol::{GenerationRequest, DEFAULT_CREATIVITY_LEVEL, DEFAULT_QUALITY_THRESHOLD},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;

use config::load_settings;

#[derive(Parser, Debug)]
#[command(name = "bookgen", about = "Create books on a generation service and follow their progress")]
struct Cli {
    /// Overrides the configured service url.
    #[arg(long, global = true)]
    api_url: Option<String>,
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a book and start its generation.
    Generate {
        #[command(flatten)]
        book: BookArgs,
        /// Stream progress and wait until the book completes or fails.
        #[arg(long)]
        follow: bool,
        #[arg(long, default_value_t = 2000)]
        interval_ms: u64,
    },
    /// Print the current snapshot of a book.
    Status {
        id: i64,
        #[arg(long)]
        wait: bool,
        #[arg(long, default_value_t = 2000)]
        interval_ms: u64,
    },
    /// Print progress events for a book until interrupted.
    Watch {
        id: i64,
        #[arg(long, default_value_t = 0)]
        reconnect_attempts: u32,
        #[arg(long, default_value_t = 1000)]
        reconnect_delay_ms: u64,
    },
    /// Print the service banner.
    Info,
    /// Generate content in one shot without storing a book.
    Compose {
        #[command(flatten)]
        book: BookArgs,
        #[arg(long)]
        instructions: Option<String>,
        #[arg(long, default_value_t = DEFAULT_CREATIVITY_LEVEL)]
        creativity: f64,
        #[arg(long, default_value_t = DEFAULT_QUALITY_THRESHOLD)]
        quality: f64,
    },
}

#[derive(Args, Debug)]
struct BookArgs {
    #[arg(long)]
    title: String,
    #[arg(long)]
    description: String,
    #[arg(long)]
    genre: String,
    #[arg(long)]
    target_audience: String,
    #[arg(long)]
    style: String,
    #[arg(long)]
    tone: String,
    #[arg(long)]
    length: String,
}

impl From<BookArgs> for GenerationConfig {
    fn from(args: BookArgs) -> Self {
        Self {
            title: args.title,
            description: args.description,
            genre: args.genre,
            target_audience: args.target_audience,
            style: args.style,
            tone: args.tone,
            length: args.length,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let api_url = cli.api_url.as_deref().unwrap_or(&settings.api_url);
    let client = GenerationClient::with_session_cookie(api_url, settings.session_cookie.as_deref())
        .with_context(|| format!("failed to set up client for {api_url}"))?;
    info!(api_url = client.base_url(), "using book service");

    match cli.command {
        Command::Generate {
            book,
            follow,
            interval_ms,
        } => generate(&client, book.into(), follow, Duration::from_millis(interval_ms)).await,
        Command::Status {
            id,
            wait,
            interval_ms,
        } => status(&client, BookId(id), wait, Duration::from_millis(interval_ms)).await,
        Command::Watch {
            id,
            reconnect_attempts,
            reconnect_delay_ms,
        } => {
            let policy = ReconnectPolicy::fixed(
                Duration::from_millis(reconnect_delay_ms),
                reconnect_attempts,
            );
            watch(&client, BookId(id), policy).await
        }
        Command::Info => {
            let info = client.service_info().await?;
            println!("{} (version {})", info.message, info.version);
            for feature in info.features {
                println!("  - {feature}");
            }
            Ok(())
        }
        Command::Compose {
            book,
            instructions,
            creativity,
            quality,
        } => {
            let request = GenerationRequest {
                config: book.into(),
                additional_instructions: instructions,
                creativity_level: creativity,
                quality_threshold: quality,
            };
            let response = client.generate_content(&request).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
    }
}

fn print_progress(event: ProgressEvent) {
    println!("[{}] {}", event.stage, event.message);
}

async fn generate(
    client: &GenerationClient,
    config: GenerationConfig,
    follow: bool,
    interval: Duration,
) -> Result<()> {
    let mut form = GenerateForm::from_config(config);
    let book_id = match form.submit(client).await {
        SubmitOutcome::Navigate { book_id, route } => {
            println!("{route}");
            book_id
        }
        SubmitOutcome::Failed => {
            let banner = form.error_banner().unwrap_or(GENERIC_FAILURE_MESSAGE);
            return Err(match form.last_failure() {
                Some(cause) => anyhow!("{banner} ({cause})"),
                None => anyhow!("{banner}"),
            });
        }
        SubmitOutcome::Incomplete(fields) => {
            let names: Vec<String> = fields.into_iter().map(|field| field.label()).collect();
            bail!("required fields are empty: {}", names.join(", "));
        }
        SubmitOutcome::Busy => bail!("a submission is already in progress"),
    };

    if !follow {
        return Ok(());
    }

    let subscription = client.subscribe_to_progress(book_id, print_progress);
    let result = wait_for_terminal_status(client, book_id, interval).await;
    subscription.unsubscribe();

    let book = result.context("failed while waiting for generation")?;
    println!("book {} finished: {}", book.id, book.status);
    Ok(())
}

async fn status(
    client: &GenerationClient,
    id: BookId,
    wait: bool,
    interval: Duration,
) -> Result<()> {
    let book = if wait {
        wait_for_terminal_status(client, id, interval).await?
    } else {
        client.get_book_status(id).await?
    };
    println!("{}", serde_json::to_string_pretty(&book)?);
    Ok(())
}

async fn watch(client: &GenerationClient, id: BookId, policy: ReconnectPolicy) -> Result<()> {
    let subscription = client.subscribe_with_reconnect(id, policy, print_progress, |err| {
        eprintln!("stream problem: {err}");
    });
    let mut states = subscription.watch_state();

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            info!(book_id = %id, "interrupted");
        }
        state = states.wait_for(|state| {
            matches!(state, ConnectionState::Closed | ConnectionState::Errored)
        }) => {
            if let Ok(state) = state {
                info!(book_id = %id, state = ?*state, "progress stream finished");
            }
        }
    }

    subscription.unsubscribe();
    Ok(())
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
