//! colony - SimWorld 上で colony を回すデモ
//!
//! ```text
//! colony --ticks 300 --agents 6 --snapshot target/colony.json
//! RUST_LOG=colony_core=debug colony
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use colony_core::app::{ColonyBuilder, TickRunner};
use colony_core::config::ColonyConfig;
use colony_core::domain::{Loadout, Meter, ObjectId, ObjectKind, Position, Tick};
use colony_core::impls::{InMemorySnapshotStore, JsonFileSnapshotStore, LoadoutCapabilities, SimWorld};
use colony_core::matcher::ProviderKind;
use colony_core::ports::{SnapshotStore, WorldPorts, WorldQuery};

const ZONE: &str = "W1N1";

#[derive(Debug, Parser)]
#[command(name = "colony", about = "Run the colony task pipeline against a simulated world")]
struct Cli {
    /// Number of ticks to simulate.
    #[arg(long, default_value_t = 300)]
    ticks: u64,

    /// TOML config; defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Persist snapshots to this JSON file instead of memory.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Agents to spawn into the scenario.
    #[arg(long, default_value_t = 6)]
    agents: usize,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => ColonyConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ColonyConfig::default(),
    };
    let mut colony = ColonyBuilder::new()
        .with_config(config)
        .with_standard_machines()
        .build()
        .context("building colony")?;
    colony
        .supply_mut()
        .register_provider(ObjectId::new("storage"), ProviderKind::Storage);

    let world = scenario(cli.agents);
    match cli.snapshot {
        Some(path) => {
            info!(path = %path.display(), "using file snapshots");
            run(TickRunner::new(colony, JsonFileSnapshotStore::new(path)), &world, cli.ticks).await
        }
        None => run(TickRunner::new(colony, InMemorySnapshotStore::new()), &world, cli.ticks).await,
    }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("colony_core=debug,colony=debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}

async fn run<S: SnapshotStore>(mut runner: TickRunner<S>, world: &SimWorld, ticks: u64) -> Result<()> {
    let ports = WorldPorts {
        world,
        movement: world,
        actuator: world,
        capabilities: &LoadoutCapabilities,
    };
    for _ in 0..ticks {
        let now = world.tick();
        let summary = runner
            .tick(ports, now)
            .await
            .with_context(|| format!("tick {now}"))?;
        if !summary.degraded.is_empty() {
            info!(tick = now.0, degraded = ?summary.degraded, "degraded tick");
        }
        world.advance();
    }

    let colony = runner.colony();
    info!(
        counts = ?colony.status_counts(),
        "finished {ticks} ticks"
    );
    println!("{}", serde_json::to_string_pretty(colony.counters())?);
    Ok(())
}

/// One zone with two sources, a spawn, a container, a storage, a controller,
/// a construction site and a damaged road.
fn scenario(agents: usize) -> SimWorld {
    let at = |x, y| Position::new(ZONE, x, y);
    let world = SimWorld::new(Tick(0));

    world.add_source("source-a", at(5, 5), 3000);
    world.add_source("source-b", at(40, 12), 3000);
    world.add_store("spawn", ObjectKind::Spawn, at(20, 20), 0, 300);
    world.add_store("container", ObjectKind::Container, at(6, 7), 0, 2000);
    world.add_store("storage", ObjectKind::Storage, at(22, 24), 5000, 1_000_000);
    world.add_controller("controller", at(30, 30), 15000);
    world.add_site("site-extension", at(18, 18), 0, 3000);
    world.add_store("road", ObjectKind::Road, at(21, 21), 0, 0);
    world.set_hits(&ObjectId::new("road"), Meter::new(400, 5000));

    let loadouts = [
        Loadout { work: 2, carry: 1, mobility: 1, attack: 0 },
        Loadout { work: 0, carry: 4, mobility: 2, attack: 0 },
        Loadout { work: 2, carry: 2, mobility: 2, attack: 0 },
    ];
    for i in 0..agents {
        let loadout = loadouts[i % loadouts.len()];
        world.add_agent(format!("agent-{i}"), at(20 + i as i32 % 3, 22), loadout, 1500);
    }
    world
}
