//! SkyTraffic Simulator CLI
//!
//! Run deterministic traffic scenarios, or drive a pool in real time.

use clap::Parser;
use skytraffic_core::{AirportSet, TrafficConfig, TrafficManager, TrafficMetrics};
use skytraffic_env::{Announcer, Callout, Collaborators, TokioContext, TrafficContext};
use skytraffic_sim::scenarios::ScenarioId;
use skytraffic_sim::{ScenarioResult, ScenarioRunner, SimError};
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// SkyTraffic Deterministic Simulation CLI
#[derive(Parser, Debug)]
#[command(name = "skytraffic-sim")]
#[command(about = "Run deterministic background air-traffic simulations", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Number of aircraft in the pool
    #[arg(short, long, default_value = "12")]
    agents: usize,

    /// Scenario to run (busy_skies, single_runway, broken_taxiways, reset_storm, rush_hour, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Simulation duration in seconds
    #[arg(short, long, default_value = "120")]
    duration: f64,

    /// Tick rate in Hz
    #[arg(long, default_value = "30")]
    tick_rate: u32,

    /// Airport set JSON file (built-in world if omitted)
    #[arg(long)]
    airports: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export simulation frames to a JSON file
    #[arg(long)]
    export: Option<String>,

    /// Drive one pool on the wall clock instead of running scenarios
    #[arg(long)]
    realtime: bool,
}

/// Speaks callouts into the log.
struct LogAnnouncer;

impl Announcer for LogAnnouncer {
    fn announce(&mut self, callout: &Callout) {
        info!(agent = %callout.agent, "{}", callout_line(callout));
    }
}

fn callout_line(callout: &Callout) -> String {
    format!("Callout at t={:.1}s: {}", callout.issued_at, callout.text)
}

/// Drives a pool against the wall clock for `duration` seconds.
fn run_realtime(
    agents: usize,
    duration: f64,
    tick_rate: u32,
    airports: AirportSet,
) -> Result<TrafficMetrics, SimError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let ctx = TokioContext::shared();
        let collaborators = Collaborators {
            announcer: Box::new(LogAnnouncer),
            ..Collaborators::default()
        };
        let mut manager =
            TrafficManager::new(ctx.clone(), airports, TrafficConfig::default(), collaborators)?;
        manager.initialize(agents);

        let period = Duration::from_secs_f64(1.0 / tick_rate.max(1) as f64);
        let mut last = ctx.now();
        let mut next_report = 10.0;

        while ctx.now().as_secs_f64() < duration {
            ctx.sleep(period).await;
            let now = ctx.now();
            manager.tick((now - last).as_secs_f64());
            last = now;

            if now.as_secs_f64() >= next_report {
                info!("t={:.0}s | {}", now.as_secs_f64(), manager.metrics());
                next_report += 10.0;
            }
        }

        Ok::<_, SimError>(manager.metrics().clone())
    })
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    if !args.json {
        info!("SkyTraffic Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let airports = match &args.airports {
        Some(path) => AirportSet::from_json_file(path).unwrap_or_else(|e| {
            eprintln!("Error: cannot load {}: {}", path, e);
            std::process::exit(1);
        }),
        None => AirportSet::default_world(),
    };

    if args.realtime {
        match run_realtime(args.agents, args.duration, args.tick_rate, airports) {
            Ok(metrics) => info!("Real-time run finished: {}", metrics),
            Err(e) => {
                error!("Real-time run failed: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse().unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            eprintln!(
                "Available scenarios: {}, all",
                ScenarioId::all()
                    .iter()
                    .map(ScenarioId::name)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            std::process::exit(1);
        })]
    };

    // Determine base seed
    let base_seed = if args.seed == 0 { rand::random() } else { args.seed };

    // Handle --export mode
    if let Some(export_path) = &args.export {
        if scenarios.len() > 1 {
            eprintln!("Error: --export only supports a single scenario, not 'all'");
            std::process::exit(1);
        }

        info!("Running with export to: {}", export_path);

        let runner = ScenarioRunner::new(base_seed, args.agents)
            .with_tick_rate(args.tick_rate)
            .with_duration(args.duration)
            .with_airports(airports);
        // One frame per simulated second
        let (result, export) = runner.run_recorded(scenarios[0], args.tick_rate.max(1) as u64);

        match export.write_to_file(export_path) {
            Ok(()) => info!("Exported {} frames to {}", export.frames.len(), export_path),
            Err(e) => error!("Failed to write export: {}", e),
        }

        if result.passed {
            info!("✓ {} (seed={}) PASSED", scenarios[0].name(), base_seed);
        } else {
            error!(
                "✗ {} FAILED: {}",
                scenarios[0].name(),
                result.failure_reason.as_deref().unwrap_or("unknown")
            );
            std::process::exit(1);
        }
        return;
    }

    // Track results
    let mut all_results: Vec<ScenarioResult> = Vec::new();
    let mut failed_count = 0;

    // Run simulations
    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);

        let runner = ScenarioRunner::new(seed, args.agents)
            .with_tick_rate(args.tick_rate)
            .with_duration(args.duration)
            .with_airports(airports.clone());

        for scenario in &scenarios {
            let result = runner.run(*scenario);

            if !args.json {
                if result.passed {
                    info!(
                        "✓ {} (seed={}) PASSED | {}",
                        scenario.name(),
                        seed,
                        result.metrics.traffic
                    );
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }

            if !result.passed {
                failed_count += 1;
            }

            all_results.push(result);
        }
    }

    // Summary
    let total = all_results.len();
    let passed = total - failed_count;

    if args.json {
        // JSON output for CI parsing
        let summary = serde_json::json!({
            "total": total,
            "passed": passed,
            "failed": failed_count,
            "results": all_results,
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Error: cannot encode summary: {}", e),
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);

            // List failed seeds
            for result in &all_results {
                if !result.passed {
                    error!(
                        "  - {} seed={}: {}",
                        result.scenario.name(),
                        result.seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
}
