//! ricart-sim CLI
//!
//! Runs a Ricart–Agrawala scenario and prints one line per tick.
//!
//! # Example
//!
//! ```bash
//! # Three nodes, two-tick links, N0 then N1 request
//! ricart-sim -n 3 --delay 2 --request 0@0 --request 1@1 --hold 0=3 --ticks 12
//!
//! # Random delays in [1, 4], reproducible with a seed
//! ricart-sim -n 5 --delay 1 --jitter 3 --seed 7 --request 2@0 --request 4@0
//!
//! # A scenario file, with the final snapshot as JSON
//! ricart-sim --scenario contention.json --json
//! ```

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use ricart_sim::{DelayPolicy, NodeId, Scenario, Simulation, Snapshot};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Ricart–Agrawala mutual exclusion simulator
///
/// Deterministic: the same scenario and seed always produce the same
/// trace.
#[derive(Parser, Debug)]
#[command(name = "ricart-sim")]
#[command(version, about, long_about = None)]
struct Args {
    /// Load the scenario from a JSON file. `--seed`, `--request` and
    /// `--hold` are applied on top; `--nodes`, `--delay` and `--jitter`
    /// are ignored.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Number of nodes
    #[arg(short = 'n', long, default_value = "3")]
    nodes: usize,

    /// Minimum message delay in ticks
    #[arg(short = 'd', long, default_value = "1")]
    delay: u64,

    /// Extra random delay; each message takes delay..=delay+jitter ticks
    #[arg(short = 'j', long, default_value = "0")]
    jitter: u64,

    /// Seed for random delays. When omitted, a random seed is used.
    #[arg(long)]
    seed: Option<u64>,

    /// Schedule a request, as NODE@TICK. Repeatable.
    #[arg(short = 'r', long = "request", value_parser = parse_request)]
    requests: Vec<(u64, u64)>,

    /// Auto-release a node after holding, as NODE=TICKS. Repeatable.
    #[arg(long = "hold", value_parser = parse_hold)]
    holds: Vec<(u64, u64)>,

    /// Ticks to simulate
    #[arg(short = 't', long, default_value = "30")]
    ticks: u64,

    /// Print the final snapshot as JSON
    #[arg(long)]
    json: bool,

    /// Print the event log after the run
    #[arg(long)]
    log: bool,

    /// Print the effective scenario as JSON and exit
    #[arg(long)]
    dump_scenario: bool,
}

fn parse_pair(s: &str, sep: char, what: &str) -> Result<(u64, u64), String> {
    let (a, b) = s
        .split_once(sep)
        .ok_or_else(|| format!("expected {}, got '{}'", what, s))?;
    let a = a.trim().parse().map_err(|e| format!("'{}': {}", a, e))?;
    let b = b.trim().parse().map_err(|e| format!("'{}': {}", b, e))?;
    Ok((a, b))
}

fn parse_request(s: &str) -> Result<(u64, u64), String> {
    parse_pair(s, '@', "NODE@TICK")
}

fn parse_hold(s: &str) -> Result<(u64, u64), String> {
    parse_pair(s, '=', "NODE=TICKS")
}

fn build_scenario(args: &Args) -> Result<Scenario, Box<dyn Error>> {
    let mut scenario = match &args.scenario {
        Some(path) => Scenario::from_json(&std::fs::read_to_string(path)?)?,
        None => {
            let delay = if args.jitter == 0 {
                DelayPolicy::fixed(args.delay)
            } else {
                DelayPolicy::uniform(args.delay, args.delay.saturating_add(args.jitter))
            };
            let mut scenario = Scenario::new(args.nodes, delay);
            scenario.seed = args.seed.unwrap_or_else(rand::random);
            scenario
        }
    };

    if args.scenario.is_some() {
        if let Some(seed) = args.seed {
            scenario.seed = seed;
        }
    }
    for &(node, at) in &args.requests {
        scenario
            .scheduled_requests
            .entry(NodeId::new(node))
            .or_default()
            .push(at);
    }
    for &(node, ticks) in &args.holds {
        scenario.hold_durations.insert(NodeId::new(node), ticks);
    }
    Ok(scenario)
}

fn print_tick(snap: &Snapshot) {
    let letters: Vec<String> = snap
        .nodes
        .iter()
        .map(|n| n.state.letter().to_string())
        .collect();
    println!(
        "{:>6}  {}  in-flight: {}",
        snap.tick.to_string(),
        letters.join(" "),
        snap.in_flight.len()
    );
}

/// One-line run summary. Carries the seed so a random-seed run can be
/// replayed with `--seed`.
fn summary(sim: &Simulation) -> String {
    format!(
        "{} messages sent, {} log entries, seed {}, digest {:016x}",
        sim.messages_sent(),
        sim.event_log().len(),
        sim.export_scenario().seed,
        sim.event_log().digest()
    )
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    let scenario = build_scenario(args)?;
    if args.dump_scenario {
        println!("{}", scenario.to_json()?);
        return Ok(());
    }

    info!(
        nodes = scenario.node_count,
        delay = %scenario.delay,
        seed = scenario.seed,
        ticks = args.ticks,
        "starting simulation"
    );
    let mut sim = Simulation::new(scenario)?;

    let header: Vec<String> = NodeId::range(sim.node_count()).map(|n| n.to_string()).collect();
    println!("{:>6}  {}", "", header.join(" "));
    print_tick(&sim.snapshot());
    for _ in 0..args.ticks {
        sim.advance(1)?;
        print_tick(&sim.snapshot());
    }

    let snap = sim.snapshot();
    let violations = snap.check_invariants();
    println!();
    println!("{}", summary(&sim));
    for violation in &violations {
        println!("  ✗ {}", violation);
    }

    if args.log {
        println!();
        sim.event_log().export(&mut std::io::stdout().lock())?;
    }
    if args.json {
        println!();
        println!("{}", snap.to_json()?);
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
