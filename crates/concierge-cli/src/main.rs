//! concierge - JSON-lines front end for the booking action dispatcher
//!
//! Each stdin line is either a dispatch request
//! (`{"conversationId", "actionType", "actionParameters", "callerIdentity"}`)
//! or an authorization callback (`{"state", "code"}`). One JSON response is
//! written to stdout per line.

mod config;

use anyhow::Context;
use clap::Parser;
use concierge_agent::{
    ActionDispatcher, BoundaryMessage, CredentialBroker, DispatchEvent, MilestoneTracker,
    OutcomeKind, Services,
};
use concierge_api::services::{
    HttpBookingService, HttpCalendarService, HttpHotelInventory, OAuthClient,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// concierge - credential broker and milestone-gated booking dispatcher
#[derive(Parser, Debug)]
#[command(name = "concierge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (default: $CONCIERGE_CONFIG_PATH or the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Print dispatch events to stderr
    #[arg(long)]
    events: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(args.verbose);

    let path = args.config.unwrap_or_else(config::Config::config_path);

    // Initialize config and exit
    if args.init_config {
        let path = config::Config::init(&path)
            .with_context(|| format!("Error creating config at {}", path.display()))?;
        println!("Config file created at: {}", path.display());
        println!("\nExample config:\n{}", config::example_config());
        return Ok(());
    }

    let mut config = config::Config::load(&path);
    config.apply_env();
    config.validate().context("Invalid configuration")?;

    let dispatcher = build_dispatcher(&config)?;

    if args.events {
        let mut receiver = dispatcher.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = receiver.recv().await {
                print_event(&event);
            }
        });
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted, cancelling in-flight dispatches");
                cancel.cancel();
            }
        });
    }

    run_session(&dispatcher, &cancel).await
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("concierge=debug,concierge_agent=debug,concierge_api=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_dispatcher(config: &config::Config) -> anyhow::Result<ActionDispatcher> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("concierge/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    let identity = OAuthClient::with_client(client.clone(), config.identity.clone());
    let broker = CredentialBroker::with_config(Arc::new(identity), config.broker_config());
    let services = Services {
        inventory: Arc::new(HttpHotelInventory::with_client(
            client.clone(),
            &config.services.hotel_api_base_url,
        )),
        bookings: Arc::new(HttpBookingService::with_client(
            client.clone(),
            &config.services.booking_api_base_url,
        )),
        calendar: Arc::new(HttpCalendarService::with_client(
            client,
            &config.services.calendar_api_base_url,
        )),
    };

    Ok(ActionDispatcher::new(
        broker,
        Arc::new(MilestoneTracker::new()),
        services,
        config.dispatcher_config(),
    ))
}

async fn run_session(
    dispatcher: &ActionDispatcher,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line.context("Failed to read stdin")?,
        };
        let Some(line) = line else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let reply = match BoundaryMessage::parse(line) {
            Ok(BoundaryMessage::Dispatch(request)) => {
                serde_json::to_string(&dispatcher.handle(request, cancel).await)?
            }
            Ok(BoundaryMessage::Authorize(callback)) => {
                serde_json::to_string(&dispatcher.authorize(callback, cancel).await)?
            }
            Err(e) => {
                tracing::debug!(error = %e, "Rejected session line");
                serde_json::to_string(&json!({
                    "outcomeKind": OutcomeKind::InvalidParameters,
                    "errorDetail": e.to_string(),
                }))?
            }
        };

        stdout.write_all(reply.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    Ok(())
}

fn print_event(event: &DispatchEvent) {
    match event {
        DispatchEvent::ActionStart {
            conversation,
            action,
        } => eprintln!("[{}] {}...", conversation, action),
        DispatchEvent::RetryScheduled {
            conversation,
            action,
            attempt,
            delay_ms,
        } => eprintln!(
            "[{}] {} retry {} in {} ms",
            conversation, action, attempt, delay_ms
        ),
        DispatchEvent::MilestoneAchieved {
            conversation,
            milestone,
        } => eprintln!("[{}] reached {}", conversation, milestone.as_str()),
        DispatchEvent::PreconditionFailed {
            conversation,
            action,
            missing,
        } => eprintln!(
            "[{}] {} blocked: needs {}",
            conversation,
            action,
            missing.as_str()
        ),
        DispatchEvent::AuthorizationRequired {
            conversation,
            action,
        } => eprintln!("[{}] {} waiting for user authorization", conversation, action),
        DispatchEvent::ActionEnd {
            conversation,
            action,
        } => eprintln!("[{}] {} done", conversation, action),
        DispatchEvent::ActionFailed {
            conversation,
            action,
            detail,
        } => eprintln!("[{}] {} failed: {}", conversation, action, detail),
    }
}
