//! The simulation loop.
//!
//! Every ship gets a `thrust(dx, dy)` binding that moves it and a `heading()`
//! binding that reads its position back. Each tick, the world posts
//! `on_tick(tick)` to every ship and then calls `update_all` once.

use crate::cli::Cli;
use crate::error::{SimError, SimResult};
use agent_host::{Agent, AgentBindings, MemoryStore, SourceStore};
use context_pool::{ContextPool, PoolConfig, TickReport};
use parking_lot::Mutex;
use script_context::{Dynamic, Isolate, Task, ToScript};
use script_types::{ContextId, ScriptError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Boot script of a well-behaved ship.
pub const DEFAULT_SHIP_SCRIPT: &str = r#"
let fuel = 100;

fn on_tick(tick) {
    if tick % 2 == 0 {
        thrust(1.0, 0.0);
    } else {
        thrust(0.0, 1.0);
    }
}
"#;

/// Boot script of a ship that never yields.
pub const RUNAWAY_SHIP_SCRIPT: &str = r#"
fn on_tick(tick) {
    let spins = 0;
    loop { spins += 1; }
}
"#;

const SHIP_PATH: &str = "/ship/boot.rhai";
const RUNAWAY_PATH: &str = "/ship/runaway.rhai";

/// Kinematic state of one ship, owned by the world.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ShipState {
    /// Position along x
    pub x: f64,
    /// Position along y
    pub y: f64,
}

struct ShipBindings {
    state: Arc<Mutex<ShipState>>,
}

impl AgentBindings for ShipBindings {
    fn install(&self, isolate: &mut Isolate) -> Result<(), ScriptError> {
        isolate.bind_method(
            "thrust",
            Arc::clone(&self.state),
            |ship: &mut ShipState, dx: f64, dy: f64| {
                ship.x += dx;
                ship.y += dy;
            },
        )?;
        isolate.bind_method("heading", Arc::clone(&self.state), |ship: &mut ShipState| {
            vec![ship.x, ship.y]
        })?;
        Ok(())
    }
}

struct Ship {
    agent: Agent,
    state: Arc<Mutex<ShipState>>,
    runaway: bool,
}

/// Totals over a whole run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Summary {
    /// Ticks completed
    pub ticks: u64,
    /// Rounds run across all ticks
    pub rounds: usize,
    /// Rounds cut off by their budget
    pub interrupted: usize,
    /// Uncaught script errors across all rounds
    pub script_errors: usize,
    /// Slowest tick
    pub slowest_tick: Duration,
    /// Final position of every well-behaved ship
    pub positions: Vec<(ContextId, ShipState)>,
}

/// A pool of ships and the world state they steer.
pub struct Simulation {
    pool: ContextPool,
    ships: Vec<Ship>,
    tick: u64,
}

impl Simulation {
    /// Spawns the pool and every ship, and queues their boot scripts.
    pub fn new(cli: &Cli) -> SimResult<Self> {
        let ship_script = match &cli.script {
            Some(path) => std::fs::read_to_string(path).map_err(|source| SimError::Script {
                path: path.display().to_string(),
                source,
            })?,
            None => DEFAULT_SHIP_SCRIPT.to_string(),
        };
        let store = Arc::new(MemoryStore::new());
        store.write(SHIP_PATH, ship_script);
        store.write(RUNAWAY_PATH, RUNAWAY_SHIP_SCRIPT);
        let store: Arc<dyn SourceStore> = store;

        let pool = ContextPool::new(PoolConfig::new().with_workers(cli.workers))?;
        let budget = Duration::from_millis(cli.budget_ms);
        let mut ships = Vec::with_capacity(cli.agents + cli.runaway);
        for index in 0..cli.agents + cli.runaway {
            let runaway = index >= cli.agents;
            let state = Arc::new(Mutex::new(ShipState::default()));
            let bindings = Arc::new(ShipBindings {
                state: Arc::clone(&state),
            });
            let path = if runaway { RUNAWAY_PATH } else { SHIP_PATH };
            let agent = Agent::spawn(&pool, Arc::clone(&store), bindings, path, budget)?;
            agent.boot()?;
            ships.push(Ship {
                agent,
                state,
                runaway,
            });
        }
        info!(
            agents = cli.agents,
            runaway = cli.runaway,
            workers = cli.workers,
            budget_ms = cli.budget_ms,
            "simulation ready"
        );
        Ok(Self {
            pool,
            ships,
            tick: 0,
        })
    }

    /// Posts `on_tick` to every ship and runs one pool tick.
    pub fn step(&mut self) -> SimResult<TickReport> {
        self.tick += 1;
        let tick = self.tick;
        for ship in &self.ships {
            ship.agent.context().post(Task::new(move |isolate| {
                // u64 saturates at the script's integer range
                let _ = isolate.call_fn::<Dynamic>("on_tick", vec![tick.to_script()])?;
                Ok(())
            }))?;
        }
        let report = self.pool.update_all()?;
        for failure in &report.init_failures {
            warn!(context = %failure.0, error = %failure.1, "ship failed to boot");
        }
        Ok(report)
    }

    /// Runs `ticks` ticks and summarizes them.
    pub fn run(&mut self, ticks: u64, mut on_tick: impl FnMut(&TickReport)) -> SimResult<Summary> {
        let mut summary = Summary::default();
        for _ in 0..ticks {
            let report = self.step()?;
            summary.ticks += 1;
            summary.rounds += report.rounds.len();
            summary.interrupted += report.interrupted().count();
            summary.script_errors += report.rounds.iter().map(|r| r.script_errors).sum::<usize>();
            summary.slowest_tick = summary.slowest_tick.max(report.elapsed);
            on_tick(&report);
        }
        summary.positions = self
            .ships
            .iter()
            .filter(|ship| !ship.runaway)
            .map(|ship| (ship.agent.id(), *ship.state.lock()))
            .collect();
        Ok(summary)
    }
}
