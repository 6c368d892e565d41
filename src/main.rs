//! Seistrigger - streaming STA/LTA seismic event trigger
//!
//! Entry point for the replay and comparison tools.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use seistrigger::diagnostics::{read_records_from_path, DiagnosticWriter};
use seistrigger::{ChannelOrchestrator, EngineConfig, EngineError, Event, Harness, ValidationConfig};
use serde::Deserialize;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "seistrigger", version, about = "Streaming STA/LTA seismic event trigger")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay recorded samples through the trigger engine
    Replay {
        /// Engine config (JSON)
        #[arg(long)]
        config: PathBuf,
        /// Samples as CSV with columns channel,timestamp,value
        #[arg(long)]
        input: PathBuf,
        /// Write a per-sample diagnostic trace to this CSV file
        #[arg(long)]
        trace: Option<PathBuf>,
        /// Channel to trace (defaults to the only configured channel)
        #[arg(long)]
        trace_channel: Option<String>,
    },
    /// Compare diagnostic traces (and optionally events) of two runs
    Compare {
        /// Reference trace CSV
        #[arg(long)]
        reference: PathBuf,
        /// Candidate trace CSV
        #[arg(long)]
        candidate: PathBuf,
        /// Reference events as JSON lines
        #[arg(long, requires = "candidate_events")]
        reference_events: Option<PathBuf>,
        /// Candidate events as JSON lines
        #[arg(long, requires = "reference_events")]
        candidate_events: Option<PathBuf>,
        /// Maximum accepted per-sample ratio difference
        #[arg(long, default_value_t = seistrigger::DEFAULT_RATIO_TOLERANCE)]
        tolerance: f64,
        /// Maximum accepted event drift in seconds
        #[arg(long, default_value_t = seistrigger::DEFAULT_EVENT_DRIFT_SECS)]
        drift: f64,
    },
}

/// One input row of a replay
#[derive(Debug, Deserialize)]
struct SampleRow {
    channel: String,
    timestamp: DateTime<Utc>,
    value: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("seistrigger=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    info!(version = seistrigger::VERSION, "Seistrigger starting");

    match cli.command {
        Command::Replay {
            config,
            input,
            trace,
            trace_channel,
        } => replay(&config, &input, trace.as_deref(), trace_channel),
        Command::Compare {
            reference,
            candidate,
            reference_events,
            candidate_events,
            tolerance,
            drift,
        } => compare(
            &reference,
            &candidate,
            reference_events.as_deref().zip(candidate_events.as_deref()),
            ValidationConfig {
                ratio_tolerance: tolerance,
                event_drift: drift,
            },
        ),
    }
}

fn replay(config_path: &Path, input: &Path, trace: Option<&Path>, trace_channel: Option<String>) -> Result<()> {
    let config = EngineConfig::load(config_path)?;
    let (mut orchestrator, events) = ChannelOrchestrator::from_config(&config)?;

    let mut tracer = match trace {
        Some(path) => {
            let channel = match trace_channel {
                Some(id) => id,
                None => match config.channels.as_slice() {
                    [only] => only.channel_id.to_string(),
                    _ => bail!("--trace-channel is required when more than one channel is configured"),
                },
            };
            if !orchestrator.contains(&channel) {
                bail!("Trace channel {} is not configured", channel);
            }
            let writer = DiagnosticWriter::create(path)
                .with_context(|| format!("Failed to create trace {}", path.display()))?;
            Some((channel, writer))
        }
        None => None,
    };

    let mut reader = csv::Reader::from_path(input)
        .with_context(|| format!("Failed to open input {}", input.display()))?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut unknown = 0u64;

    for (line, row) in reader.deserialize::<SampleRow>().enumerate() {
        let row = row.with_context(|| format!("Malformed input row {}", line + 1))?;

        let result = match tracer.as_mut() {
            Some((channel, writer)) if *channel == row.channel => {
                match orchestrator.push_traced(&row.channel, row.timestamp, row.value) {
                    Ok((record, event)) => {
                        if let Err(e) = writer.write(&record) {
                            warn!(error = %e, "Failed to write trace record");
                        }
                        Ok(event)
                    }
                    Err(e) => Err(e),
                }
            }
            _ => orchestrator.push(&row.channel, row.timestamp, row.value),
        };

        match result {
            Ok(_)
            | Err(EngineError::NonFiniteSample { .. } | EngineError::SampleOverflow { .. }) => {}
            Err(EngineError::UnknownChannel(id)) => {
                unknown += 1;
                if unknown == 1 {
                    warn!(channel = %id, "Skipping samples of unconfigured channel");
                }
            }
            Err(e) => return Err(e.into()),
        }

        for event in events.drain() {
            writeln!(out, "{}", serde_json::to_string(&event)?)?;
        }
    }

    if let Some((_, writer)) = tracer.as_mut() {
        writer.flush()?;
    }

    for id in orchestrator.channel_ids() {
        if let Some(stats) = orchestrator.stats(id.as_str()) {
            info!(
                channel = %id,
                samples = stats.samples_processed,
                rejected = stats.samples_rejected,
                triggers = stats.triggers,
                resets = stats.resets,
                timeouts = stats.timeout_resets,
                gaps = stats.gap_resets,
                max_ratio = stats.max_ratio,
                "Replay finished"
            );
        }
    }
    let sink = orchestrator.sink_stats();
    info!(
        delivered = sink.delivered,
        dropped = sink.dropped,
        failed = sink.failed,
        skipped = unknown,
        "Event delivery"
    );
    Ok(())
}

fn compare(
    reference: &Path,
    candidate: &Path,
    event_files: Option<(&Path, &Path)>,
    config: ValidationConfig,
) -> Result<()> {
    let reference_trace = read_records_from_path(reference)
        .with_context(|| format!("Failed to read reference trace {}", reference.display()))?;
    let candidate_trace = read_records_from_path(candidate)
        .with_context(|| format!("Failed to read candidate trace {}", candidate.display()))?;

    let events = match event_files {
        Some((r, c)) => Some((read_events(r)?, read_events(c)?)),
        None => None,
    };

    let harness = Harness::new(config);
    let report = harness.report(
        None,
        Some((reference_trace.as_slice(), candidate_trace.as_slice())),
        events.as_ref().map(|(r, c)| (r.as_slice(), c.as_slice())),
    );

    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.passed() {
        bail!("Candidate diverges from reference");
    }
    Ok(())
}

/// Read events written as JSON lines by `replay`
fn read_events(path: &Path) -> Result<Vec<Event>> {
    let file = std::fs::File::open(path).with_context(|| format!("Failed to open events {}", path.display()))?;
    let mut events = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event: Event = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid event", path.display(), line_no + 1))?;
        events.push(event);
    }
    Ok(events)
}
