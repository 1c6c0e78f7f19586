//! funnel-tracker - command-line driver
//!
//! Runs a funnel visit against file-backed storage under the root folder:
//! capture attribution from an entry URL, inspect or reset what is stored,
//! send a single event, or walk the whole funnel.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use funnel_common::config::{
    default_config_path, RootFolderInitializer, RootFolderResolver, TomlConfig,
};
use funnel_tracker::answers::PlanWeeks;
use funnel_tracker::attribution::AttributionStore;
use funnel_tracker::collector::{RecordingEventCollector, RecordingPixelCollector};
use funnel_tracker::funnel::{MailSubmission, QuizStep, Screen};
use funnel_tracker::{CollectorSource, FunnelApp, FunnelStores};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_URL: &str = "https://funnel.local/#/start";

/// Command-line arguments for funnel-tracker
#[derive(Parser, Debug)]
#[command(name = "funnel-tracker")]
#[command(about = "Quiz funnel attribution capture and event tracking")]
#[command(version)]
struct Args {
    /// Folder holding attribution.json and session.json
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Record events in memory and print them instead of sending
    #[arg(long)]
    dry_run: bool,

    /// Start a new browsing session (forget the session id)
    #[arg(long)]
    new_session: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Capture attribution from an entry URL and print the merged snapshot
    Capture {
        #[arg(long)]
        url: String,
        #[arg(long)]
        referrer: Option<String>,
    },
    /// Print stored attribution
    Show,
    /// Forget stored attribution
    Reset,
    /// Send one event and wait for its outcome
    Track {
        name: String,
        /// Extra property as key=value (repeatable)
        #[arg(long = "prop", value_parser = parse_prop)]
        props: Vec<(String, String)>,
        #[arg(long, default_value = DEFAULT_URL)]
        url: String,
        #[arg(long)]
        referrer: Option<String>,
    },
    /// Walk the funnel from the entry URL to the thanks (or error) screen
    Walk {
        #[arg(long, default_value = DEFAULT_URL)]
        url: String,
        #[arg(long)]
        referrer: Option<String>,
        /// Answers for quiz questions in order; the first option is used when missing
        #[arg(long = "answer")]
        answers: Vec<String>,
        #[arg(long, default_value = "user@example.com")]
        email: String,
        /// Plan length in weeks (4, 12 or 24)
        #[arg(long, default_value_t = 12)]
        plan: u32,
        /// Dismiss the standard plans and pay on the personal offer
        #[arg(long)]
        offer: bool,
    },
}

fn parse_prop(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{}'", raw)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(default_config_path);
    let (config, config_error) = match &config_path {
        Some(path) => TomlConfig::load_or_default(path),
        None => (TomlConfig::default(), None),
    };

    // Initialize tracing
    let level = &config.logging.level;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("funnel_tracker={level},funnel_common={level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Some(e) = config_error {
        warn!("Using default configuration: {}", e);
    }

    let root_folder = RootFolderResolver::new("funnel-tracker")
        .with_cli_arg(args.root_folder.clone())
        .with_config_path(config_path)
        .resolve();
    info!("Root folder: {}", root_folder.display());

    let initializer = RootFolderInitializer::new(root_folder);
    let stores = FunnelStores::open(&initializer).context("Failed to open funnel storage")?;

    if args.new_session {
        stores
            .session
            .clear()
            .context("Failed to clear session storage")?;
        info!("Started a new session");
    }

    let recording = if args.dry_run {
        Some((
            Arc::new(RecordingEventCollector::new()),
            Arc::new(RecordingPixelCollector::new()),
        ))
    } else {
        None
    };
    let source = match &recording {
        Some((events, pixel)) => CollectorSource::Recording(events.clone(), pixel.clone()),
        None => CollectorSource::Configured,
    };

    match args.command {
        Command::Show => {
            let snapshot = AttributionStore::new(stores.durable.clone()).load();
            print_json(&snapshot.to_json())?;
        }
        Command::Reset => {
            AttributionStore::new(stores.durable.clone())
                .clear()
                .context("Failed to clear stored attribution")?;
            println!("Stored attribution cleared");
        }
        Command::Capture { url, referrer } => {
            let app = FunnelApp::start(&config, stores, source, &url, referrer.as_deref())
                .await
                .context("Failed to start funnel")?;
            finish(&app).await;
            print_json(&json!({
                "session_id": app.session_id(),
                "attribution": app.snapshot().to_json(),
            }))?;
        }
        Command::Track {
            name,
            props,
            url,
            referrer,
        } => {
            let app = FunnelApp::start(&config, stores, source, &url, referrer.as_deref())
                .await
                .context("Failed to start funnel")?;
            let extra: Map<String, Value> = props
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect();
            let timeout = Duration::from_millis(app.timing().dispatch_timeout_ms);
            let outcome = app.tracker().track(&name, Some(extra)).wait(timeout).await;
            finish(&app).await;
            println!("{}: {}", name, outcome);
        }
        Command::Walk {
            url,
            referrer,
            answers,
            email,
            plan,
            offer,
        } => {
            let plan = PlanWeeks::from_weeks(plan)
                .with_context(|| format!("No {}-week plan (choose 4, 12 or 24)", plan))?;
            let app = FunnelApp::start(&config, stores, source, &url, referrer.as_deref())
                .await
                .context("Failed to start funnel")?;
            walk(&app, &answers, &email, plan, offer).await?;
            finish(&app).await;
        }
    }

    if let Some((events, pixel)) = recording {
        for event in events.events() {
            print_json(&json!({ "event": event.name, "properties": event.properties }))?;
        }
        for call in pixel.calls() {
            print_json(&json!({
                "pixel": call.event_name,
                "action": call.action.to_string(),
                "data": call.data,
            }))?;
        }
    }

    Ok(())
}

async fn walk(
    app: &FunnelApp,
    answers: &[String],
    email: &str,
    plan: PlanWeeks,
    offer: bool,
) -> Result<()> {
    let mut nav = app.navigator();
    let mut answers = answers.iter();
    nav.resume();

    loop {
        let screen = nav.current();
        match screen {
            Screen::Thanks | Screen::Error => break,
            Screen::Mail => {
                nav.focus_mail()?;
                if nav.submit_email(email)? == MailSubmission::Invalid {
                    bail!("'{}' is not a valid email address", email);
                }
            }
            Screen::PriceStandard if offer => {
                nav.cancel()?;
            }
            Screen::PriceStandard => {
                if nav.highlighted_plan() != plan {
                    nav.select_plan(plan)?;
                }
                let paid = nav.purchase().await?;
                info!(event = %paid.event, pixel = %paid.pixel, "Paid {} weeks", paid.plan.weeks);
            }
            Screen::PriceOffer => {
                let paid = nav.purchase().await?;
                info!(event = %paid.event, pixel = %paid.pixel, "Paid personal offer");
            }
            other => match QuizStep::for_screen(other) {
                Some(quiz) => {
                    let choice = answers
                        .next()
                        .map(String::as_str)
                        .or_else(|| quiz.options.first().copied())
                        .unwrap_or_default();
                    nav.answer(choice)
                        .await
                        .with_context(|| format!("Answering question {}", quiz.number))?;
                }
                None => {
                    nav.next().await?;
                }
            },
        }
        println!("{} -> {}", screen, nav.current());
    }

    Ok(())
}

/// Give outstanding dispatches a chance to finish before exiting
async fn finish(app: &FunnelApp) {
    let status = app.collectors_ready().await;
    if !status.events {
        warn!("Analytics unavailable, events were not sent");
    }
    let timeout = Duration::from_millis(app.timing().dispatch_timeout_ms);
    if !app.tracker().flush(timeout).await {
        warn!("{} dispatches still pending at exit", app.tracker().pending());
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to encode output")?
    );
    Ok(())
}
