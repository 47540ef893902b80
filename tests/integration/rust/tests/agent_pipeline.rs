//! Agents driven through boot, ticks and reboot

use agent_host::{Agent, AgentBindings, MemoryStore, SourceStore};
use integration_tests::pool_with_workers;
use parking_lot::Mutex;
use script_context::{Dynamic, Isolate, Task};
use script_types::ScriptError;
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct Hull {
    integrity: i64,
}

struct HullBindings {
    hull: Arc<Mutex<Hull>>,
}

impl AgentBindings for HullBindings {
    fn install(&self, isolate: &mut Isolate) -> Result<(), ScriptError> {
        isolate.bind_method("repair", Arc::clone(&self.hull), |hull: &mut Hull, amount: i64| {
            hull.integrity += amount;
            hull.integrity
        })?;
        Ok(())
    }
}

/// Test: A received source replaces the running program on the next tick
#[test]
fn test_agent_reboot_with_received_source() {
    let pool = pool_with_workers(2);
    let store = Arc::new(MemoryStore::new());
    store.write("/boot", "fn on_tick() { repair(1) }");
    let hull = Arc::new(Mutex::new(Hull::default()));
    let agent = Agent::spawn(
        &pool,
        Arc::clone(&store) as Arc<dyn SourceStore>,
        Arc::new(HullBindings {
            hull: Arc::clone(&hull),
        }),
        "/boot",
        Duration::from_millis(100),
    )
    .expect("agent should spawn");
    agent.boot().expect("boot should queue");

    let on_tick = || {
        Task::new(|isolate: &mut Isolate| {
            let _ = isolate.call_fn::<Dynamic>("on_tick", Vec::new())?;
            Ok(())
        })
    };

    for _ in 0..3 {
        agent.context().post(on_tick()).expect("post should succeed");
        pool.update_all().expect("tick should complete");
    }
    assert_eq!(hull.lock().integrity, 3);

    agent
        .reboot_with("fn on_tick() { repair(10) }")
        .expect("reboot should queue");
    agent.context().post(on_tick()).expect("post should succeed");
    let tick = pool.update_all().expect("tick should complete");
    assert_eq!(tick.round_for(agent.id()).expect("agent ran").script_errors, 0);
    assert_eq!(hull.lock().integrity, 13);
}

/// Test: Dropping an agent removes it from the pool's schedule
#[test]
fn test_dropped_agent_is_pruned() {
    let pool = pool_with_workers(1);
    let store: Arc<dyn SourceStore> = Arc::new(MemoryStore::new());
    let hull = Arc::new(Mutex::new(Hull::default()));
    let agents: Vec<_> = (0..3)
        .map(|_| {
            Agent::spawn(
                &pool,
                Arc::clone(&store),
                Arc::new(HullBindings {
                    hull: Arc::clone(&hull),
                }),
                "/boot",
                Duration::from_millis(50),
            )
            .expect("agent should spawn")
        })
        .collect();
    assert_eq!(pool.update_all().expect("tick").rounds.len(), 3);

    let mut agents = agents;
    agents.pop();
    let tick = pool.update_all().expect("tick should complete");
    assert_eq!(tick.rounds.len(), 2);
    assert_eq!(tick.pruned, 1);
}
