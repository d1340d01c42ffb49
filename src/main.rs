use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use routetriage::analysis::InvestigationReport;
use routetriage::{EngineConfig, RawRecord};

#[derive(Parser)]
#[command(
    name = "routetriage",
    about = "Forensic reconstruction of BGP hijack and route-leak incidents",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a file of collected routing updates through the engine
    Analyze {
        /// JSON file with an array of raw update records
        #[arg(long)]
        events: String,

        /// Target prefix in CIDR notation
        #[arg(long)]
        prefix: String,

        /// Expected origin AS (inferred from the window when omitted)
        #[arg(long)]
        origin: Option<u32>,

        /// Window start (RFC 3339, e.g. 2024-06-27T18:00:00Z)
        #[arg(long)]
        start: String,

        /// Window duration
        #[arg(long, default_value = "24h")]
        duration: String,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            events,
            prefix,
            origin,
            start,
            duration,
            json,
        } => {
            let window_start = start
                .parse()
                .with_context(|| format!("bad --start value '{start}'"))?;
            let window_duration_secs = parse_duration_secs(&duration)
                .with_context(|| format!("bad --duration value '{duration}'"))?;

            let mut config = EngineConfig::new(&prefix, window_start, window_duration_secs);
            config.expected_origin = origin;

            let raw = std::fs::read_to_string(&events)
                .with_context(|| format!("reading events file '{events}'"))?;
            let records: Vec<RawRecord> =
                serde_json::from_str(&raw).context("events file is not a JSON record array")?;

            tracing::info!(%prefix, records = records.len(), "analyzing collected window");
            let report = routetriage::investigate(&config, records)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
    }

    Ok(())
}

/// Parse duration strings like "24h", "90m", "7d", "45s".
fn parse_duration_secs(input: &str) -> Result<i64> {
    let input = input.trim();
    for (suffix, multiplier) in [("s", 1), ("m", 60), ("h", 3600), ("d", 86_400)] {
        if let Some(number) = input.strip_suffix(suffix) {
            let value: i64 = number.parse()?;
            anyhow::ensure!(value > 0, "duration must be positive");
            return Ok(value * multiplier);
        }
    }
    anyhow::bail!("expected a number followed by s/m/h/d")
}


fn print_report(report: &InvestigationReport) {
    println!("\n=== RouteTriage Incident Report ===");
    println!("Target:      {}", report.target);
    match report.expected_origin {
        Some(asn) => println!("Origin:      AS{asn}"),
        None => println!("Origin:      unknown (path-shape heuristics only)"),
    }
    println!(
        "Window:      {} -> {}",
        report.window_start.format("%Y-%m-%d %H:%M:%S UTC"),
        report.window_end.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!(
        "Records:     {} accepted, {} dropped, {} loop-flagged",
        report.stats.accepted, report.stats.dropped, report.stats.loop_flagged
    );
    println!(
        "Activity:    {} announcements, {} withdrawals in scope",
        report.announcements, report.withdrawals
    );

    let timeline = &report.timeline;
    if timeline.anomalies.is_empty() {
        println!("\nNo anomalies found - routing matched the baseline.");
        println!("===================================\n");
        return;
    }

    println!(
        "\nAnomalies:   {} ({} distinct offending AS)",
        timeline.anomaly_count, timeline.distinct_offender_count
    );
    for anomaly in &timeline.anomalies {
        let kind = serde_json::to_string(&anomaly.kind)
            .unwrap_or_default()
            .trim_matches('"')
            .to_string();
        let path = anomaly
            .as_path
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        println!(
            " - {}  {:<20} AS{:<10} {} via [{}]",
            anomaly.timestamp.format("%Y-%m-%dT%H:%M:%SZ"),
            kind,
            anomaly.offending_asn,
            anomaly.prefix,
            path
        );
    }

    if let (Some(start), Some(end)) = (timeline.start_time, timeline.end_time) {
        println!("\nTimeline:    {} -> {}", start, end);
        println!("Duration:    {}s", timeline.duration_secs);
    }
    if timeline.ongoing {
        println!("Status:      ONGOING at window end");
    } else if let Some(recovered) = timeline.recovered_at {
        println!("Status:      recovered at {}", recovered);
    }
    if !report.involved_asns.is_empty() {
        let involved = report
            .involved_asns
            .iter()
            .map(|a| format!("AS{a}"))
            .collect::<Vec<_>>()
            .join(", ");
        println!("Involved:    {}", involved);
    }
    println!("===================================\n");
}
