use crate::engine::fleet::FleetClient;
use crate::engine::timer::TICK_PERIOD;
use crate::engine::websocket::WsConnector;
use crate::metrics;
use crate::model::{CampaignEvent, CampaignSummary, Outcome, RunConfig, Targets};
use crate::orchestrator::{process_campaign_completion, CampaignController};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "fleet-live-query",
    version,
    about = "Run a live query against fleet hosts and stream the results"
)]
pub struct Cli {
    /// Base URL of the fleet server
    #[arg(long, env = "FLEET_URL")]
    pub fleet_url: String,

    /// API token used for the REST call and the results stream
    #[arg(long, env = "FLEET_API_TOKEN", hide_env_values = true)]
    pub token: String,

    /// SQL to run on the targets
    #[arg(long, short = 'q')]
    pub query: String,

    /// Target host id (repeatable)
    #[arg(long = "host")]
    pub hosts: Vec<u64>,

    /// Target label id (repeatable)
    #[arg(long = "label")]
    pub labels: Vec<u64>,

    /// Print JSON summary and exit
    #[arg(long)]
    pub json: bool,

    /// Print text summary only, without progress lines
    #[arg(long)]
    pub text: bool,

    /// Run silently: suppress all output except errors
    #[arg(long)]
    pub silent: bool,

    /// Give up if the results channel is not open within this time
    #[arg(long, default_value = "5s")]
    pub open_timeout: humantime::Duration,

    /// Export the run summary as JSON
    #[arg(long)]
    pub export_json: Option<std::path::PathBuf>,

    /// Export result rows as CSV
    #[arg(long)]
    pub export_csv: Option<std::path::PathBuf>,

    /// Export per-host errors as CSV
    #[arg(long)]
    pub export_errors_csv: Option<std::path::PathBuf>,

    /// Use --auto-save true or --auto-save false to override
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub auto_save: bool,
}

/// Build a `RunConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> RunConfig {
    RunConfig {
        fleet_url: args.fleet_url.clone(),
        token: args.token.clone(),
        query: args.query.clone(),
        targets: Targets {
            hosts: args.hosts.clone(),
            labels: args.labels.clone(),
        },
        open_timeout: Duration::from(args.open_timeout),
        tick_period: TICK_PERIOD,
        user_agent: format!("fleet-live-query/{}", env!("CARGO_PKG_VERSION")),
    }
}

pub async fn run(args: Cli) -> Result<()> {
    if args.silent && args.text {
        return Err(anyhow::anyhow!("--silent cannot be combined with --text"));
    }

    let cfg = build_config(&args);
    let connector = WsConnector::new(&cfg.fleet_url)?;
    let client = FleetClient::new(&cfg)?;
    let mut controller = CampaignController::new(cfg.clone(), connector, client);

    let mut handle = controller.start(&cfg.query, cfg.targets.clone())?;
    let mut events = handle
        .take_events()
        .context("campaign event stream unavailable")?;

    let stopper = handle.stopper();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stopper.stop();
        }
    });

    let (out_tx, out_handle) = spawn_output_writer();
    let progress = !(args.silent || args.json || args.text);

    while let Some(ev) = events.recv().await {
        if !progress {
            continue;
        }
        let line = match ev {
            CampaignEvent::StateChanged { state } => Some(format!("== {state:?} ==")),
            CampaignEvent::HostResponded { host, outcome } => {
                let snapshot = handle.state();
                let what = match outcome {
                    Outcome::Results { rows } => format!("{rows} row(s)"),
                    Outcome::NoResults => "no results".to_string(),
                    Outcome::Error => "error".to_string(),
                };
                Some(format!(
                    "{host}: {what} [{}/{} responded, {}%]",
                    snapshot.responded,
                    snapshot.targeted,
                    snapshot.percent_responded()
                ))
            }
            CampaignEvent::Tick {
                run_query_milliseconds,
            } => {
                // One progress line every five seconds is plenty.
                (run_query_milliseconds % 5000 == 0)
                    .then(|| format!("Running {}", metrics::format_elapsed(run_query_milliseconds)))
            }
            CampaignEvent::Info(info) => Some(info.to_message()),
            CampaignEvent::Completed { .. } => None,
        };
        if let Some(line) = line {
            let _ = out_tx.send(OutputLine::Stderr(line));
        }
    }

    let result = handle.wait().await;
    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            drop(out_tx);
            let _ = out_handle.await;
            return Err(e.into());
        }
    };

    report(&args, &summary, &out_tx)?;

    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

fn report(
    args: &Cli,
    summary: &CampaignSummary,
    out_tx: &mpsc::UnboundedSender<OutputLine>,
) -> Result<()> {
    let processed = process_campaign_completion(args, summary);

    if args.silent {
        return Ok(());
    }
    if args.json {
        let out = serde_json::to_string_pretty(summary)?;
        let _ = out_tx.send(OutputLine::Stdout(out));
    } else {
        for line in crate::text_summary::build_text_summary(summary).lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }
    for msg in processed.export_messages {
        let _ = out_tx.send(OutputLine::Stderr(msg));
    }
    if let Some(p) = processed.auto_saved_path {
        let _ = out_tx.send(OutputLine::Stderr(format!("Saved: {}", p.display())));
    }
    Ok(())
}
