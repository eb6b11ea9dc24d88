//! THE MOST IMPORTANT TEST IN THE PROJECT.
//!
//! Two peers, same seed, same command stream.
//! They must produce identical checksums at every interval.
//! Any divergence is a desync in a real session. Do not merge until fixed.

use lockstep_core::{
    checksum::DesyncMonitor,
    command::PlayerCommand,
    config::SimConfig,
    engine::SimEngine,
    error::SimError,
    map::Coords,
    scenario::Scenario,
    snapshot::SAVEGAME_VERSION,
    store::SimStore,
    types::{Seed, SimTime},
};

const TICKS: u64 = 10_000;

fn scenario_commands(config: &SimConfig, seed: u64, ticks: SimTime) -> Vec<(SimTime, PlayerCommand)> {
    let scenario = Scenario {
        players: 3,
        ticks,
        command_spacing: 30,
    };
    scenario.generate(seed, &config.map.build().expect("test map"))
}

fn build_peer(seed: Seed, config: &SimConfig, commands: &[(SimTime, PlayerCommand)]) -> SimEngine {
    let mut engine = SimEngine::new(format!("det-test-{seed}"), seed, config).expect("engine");
    for (due, command) in commands {
        engine.enqueue(*due, command.clone());
    }
    engine
}

fn build_store() -> SimStore {
    let store = SimStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    store
}

/// Re-encode a savegame with one field of one arena replaced.
fn with_arena_field<V: serde::Serialize>(bytes: &[u8], arena: &str, field: &str, value: V) -> Vec<u8> {
    use serde_cbor::Value;
    let mut root: Value = serde_cbor::from_slice(bytes).unwrap();
    let Value::Map(top) = &mut root else { panic!("savegame is not a map") };
    let Some(Value::Map(fields)) = top.get_mut(&Value::Text(arena.into())) else {
        panic!("savegame has no {arena} map")
    };
    fields.insert(Value::Text(field.into()), serde_cbor::value::to_value(value).unwrap());
    serde_cbor::to_vec(&root).unwrap()
}

#[test]
fn same_seed_produces_identical_checksums() {
    let _ = env_logger::builder().is_test(true).try_init();
    const SEED: Seed = 0xDEAD_BEEF;
    let config = SimConfig::default_test();
    let commands = scenario_commands(&config, 1, TICKS);

    let mut peer_a = build_peer(SEED, &config, &commands);
    let mut peer_b = build_peer(SEED, &config, &commands);
    peer_a.run_ticks(TICKS).expect("peer_a run");
    peer_b.run_ticks(TICKS).expect("peer_b run");

    let sums_a = peer_a.checksums();
    let sums_b = peer_b.checksums();
    assert_eq!(sums_a.len(), (TICKS / config.checksum_interval) as usize);
    for ((tick_a, a), (tick_b, b)) in sums_a.iter().zip(sums_b) {
        assert_eq!(tick_a, tick_b);
        assert_eq!(a, b, "checksums diverged at tick {tick_a}:\n  A: {a}\n  B: {b}");
    }

    // The scenario really exercised the simulation.
    assert!(!peer_a.buildings().is_empty());
    assert_eq!(peer_a.world().visions, peer_a.recompute_vision());
}

#[test]
fn desync_monitor_agrees_across_peers() {
    let config = SimConfig::default_test();
    let commands = scenario_commands(&config, 2, 2_000);
    let mut peer_a = build_peer(5, &config, &commands);
    let mut peer_b = build_peer(5, &config, &commands);
    let mut monitor = DesyncMonitor::new();

    for _ in 0..20 {
        peer_a.run_ticks(100).unwrap();
        peer_b.run_ticks(100).unwrap();
        let (tick, local) = peer_a.latest_checksum().unwrap();
        let (remote_tick, remote) = peer_b.latest_checksum().unwrap();
        monitor.record_local(tick, local).unwrap();
        monitor.record_remote(remote_tick, remote).unwrap();
    }
    assert_eq!(monitor.verified_through(), Some(2_000));
    assert_eq!(monitor.pending(), 0);
}

#[test]
fn diverging_command_streams_are_detected() {
    let config = SimConfig::default_test();
    let commands = scenario_commands(&config, 3, 1_000);
    let mut peer_a = build_peer(5, &config, &commands);
    let mut peer_b = build_peer(5, &config, &commands);
    let mut monitor = DesyncMonitor::new();

    peer_a.run_ticks(100).unwrap();
    peer_b.run_ticks(100).unwrap();
    let (tick, local) = peer_a.latest_checksum().unwrap();
    let (_, remote) = peer_b.latest_checksum().unwrap();
    monitor.record_local(tick, local).unwrap();
    monitor.record_remote(tick, remote).unwrap();

    // One peer receives a command the other never saw. It is still
    // pending at tick 200, and pending commands are part of the state.
    peer_b.enqueue(
        250,
        PlayerCommand::SetBlocked {
            at:      Coords::new(30, 30),
            blocked: true,
        },
    );
    peer_a.run_ticks(100).unwrap();
    peer_b.run_ticks(100).unwrap();

    let (tick, local) = peer_a.latest_checksum().unwrap();
    let (_, remote) = peer_b.latest_checksum().unwrap();
    monitor.record_local(tick, local).unwrap();
    let err = monitor.record_remote(tick, remote).unwrap_err();
    assert!(matches!(err, SimError::DeterminismViolation { tick: 200, .. }));
    assert_eq!(monitor.verified_through(), Some(100));
}

#[test]
fn different_seeds_produce_different_checksums() {
    let config = SimConfig::default_test();
    let commands = scenario_commands(&config, 4, 500);
    let mut engine_a = build_peer(42, &config, &commands);
    let mut engine_b = build_peer(99, &config, &commands);

    engine_a.run_ticks(500).expect("run a");
    engine_b.run_ticks(500).expect("run b");

    let any_different = engine_a
        .checksums()
        .iter()
        .zip(engine_b.checksums())
        .any(|(a, b)| a != b);
    assert!(any_different, "Different seeds produced identical checksums; seed is not being used");
}

/// A savegame taken mid-run continues exactly like the run it came from.
#[test]
fn savegame_resume_matches_uninterrupted_run() {
    let config = SimConfig::default_test();
    let commands = scenario_commands(&config, 5, 3_000);
    let mut original = build_peer(77, &config, &commands);
    original.run_ticks(1_450).unwrap();

    let bytes = original.save().unwrap();
    let mut resumed = SimEngine::load(&bytes, &config).unwrap();
    assert_eq!(resumed.clock.current_tick, 1_450);
    assert_eq!(resumed.checksums(), original.checksums());
    assert_eq!(resumed.state_checksum().unwrap(), original.state_checksum().unwrap());

    original.run_ticks(1_550).unwrap();
    resumed.run_ticks(1_550).unwrap();
    assert_eq!(resumed.checksums(), original.checksums());
    assert_eq!(resumed.save().unwrap(), original.save().unwrap());
}

#[test]
fn corrupt_savegames_are_rejected() {
    let config = SimConfig::default_test();
    let commands = scenario_commands(&config, 6, 400);
    let mut engine = build_peer(3, &config, &commands);
    engine.run_ticks(400).unwrap();
    let bytes = engine.save().unwrap();

    assert!(SimEngine::load(&bytes[..bytes.len() / 2], &config).is_err());

    let mut savegame = lockstep_core::snapshot::SaveGame::decode(&bytes).unwrap();
    savegame.version = SAVEGAME_VERSION + 1;
    let err = SimEngine::load(&savegame.encode().unwrap(), &config).err().unwrap();
    assert!(matches!(err, SimError::UnsupportedVersion { .. }));

    let mut savegame = lockstep_core::snapshot::SaveGame::decode(&bytes).unwrap();
    savegame.rng = [0, 0];
    let err = SimEngine::load(&savegame.encode().unwrap(), &config).err().unwrap();
    assert!(matches!(err, SimError::MalformedState(_)));

    // Arena bookkeeping is checked before any slot is trusted.
    let err = SimEngine::load(&with_arena_field(&bytes, "actors", "free", vec![10_000]), &config)
        .err()
        .unwrap();
    assert!(matches!(err, SimError::MalformedState(ref reason) if reason.contains("out of range")));
    let err = SimEngine::load(&with_arena_field(&bytes, "buildings", "live", 12_345), &config)
        .err()
        .unwrap();
    assert!(matches!(err, SimError::MalformedState(ref reason) if reason.contains("live count")));

    // A config missing a program the saved actors run cannot load it.
    let mut stripped = config.clone();
    stripped.programs.clear();
    stripped.programs.insert("idle".into(), vec!["idle 10".into()]);
    let runs_a_program = engine
        .actors()
        .iter()
        .any(|(_, a)| a.default_program.is_some() || a.stack.len() > 1);
    if runs_a_program {
        let err = SimEngine::load(&bytes, &stripped).err().unwrap();
        assert!(matches!(err, SimError::MalformedState(_)));
    }
}

#[test]
fn ticking_paused_or_past_the_grant_is_an_error() {
    let config = SimConfig::default_test();
    let mut engine = SimEngine::new("grant-test".into(), 1, &config).unwrap();
    engine.grant(1);
    let err = engine.tick().unwrap_err();
    assert!(matches!(err, SimError::ClockPaused { tick: 0 }));
    assert_eq!(engine.clock.current_tick, 0);

    let mut engine = SimEngine::new("grant-test".into(), 1, &config).unwrap();
    engine.clock.resume();
    let err = engine.tick().unwrap_err();
    assert!(matches!(err, SimError::TickMismatch { expected: 1, actual: 0 }));

    engine.grant(2);
    engine.tick().unwrap();
    engine.tick().unwrap();
    assert!(engine.tick().is_err());
    assert_eq!(engine.clock.current_tick, 2);
}

#[test]
fn attached_store_records_the_run_without_changing_it() {
    let mut config = SimConfig::default_test();
    config.snapshot_interval = 100;
    let commands = scenario_commands(&config, 7, 300);

    let mut stored = build_peer(11, &config, &commands)
        .with_store(build_store())
        .unwrap();
    let mut bare = build_peer(11, &config, &commands);
    stored.run_ticks(300).unwrap();
    bare.run_ticks(300).unwrap();
    assert_eq!(stored.checksums(), bare.checksums());

    let store = stored.store().unwrap();
    let run_id = stored.run_id.clone();
    assert_eq!(store.checksums_for_run(&run_id).unwrap(), stored.checksums());
    assert_eq!(store.run_seed(&run_id).unwrap(), Some(11));

    let init = store.events_for_tick(&run_id, 0).unwrap();
    assert_eq!(init.len(), 1);
    assert_eq!(init[0].event_type, "run_initialized");
    let tick_one = store.events_for_tick(&run_id, 1).unwrap();
    assert_eq!(tick_one.first().map(|e| e.event_type.as_str()), Some("tick_started"));
    assert_eq!(tick_one.last().map(|e| e.event_type.as_str()), Some("tick_completed"));

    // The savegame stored at tick 200 is the state whose checksum was taken then.
    let (saved_at, bytes) = store.latest_snapshot_before(&run_id, 250).unwrap().unwrap();
    assert_eq!(saved_at, 200);
    let mut restored = SimEngine::load(&bytes, &config).unwrap();
    let at_200 = stored.checksums().iter().find(|(t, _)| *t == 200).unwrap().1;
    assert_eq!(restored.state_checksum().unwrap(), at_200);
}

#[test]
fn resume_from_store_continues_the_run() {
    let mut config = SimConfig::default_test();
    config.snapshot_interval = 100;
    let commands = scenario_commands(&config, 8, 600);
    let path = std::env::temp_dir().join(format!("lockstep-resume-{}.db", std::process::id()));
    let path = path.to_str().unwrap().to_string();
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{path}{suffix}"));
    }

    {
        let store = SimStore::open(&path).unwrap();
        store.migrate().unwrap();
        let mut engine = build_peer(21, &config, &commands).with_store(store).unwrap();
        engine.run_ticks(250).unwrap();
    }

    let store = SimStore::open(&path).unwrap();
    let mut resumed = SimEngine::resume_from_store(store, "det-test-21", 250, &config)
        .unwrap()
        .expect("a savegame at or before tick 250");
    assert_eq!(resumed.clock.current_tick, 200);
    let store = resumed.store().unwrap();
    assert!(store.events_for_tick("det-test-21", 230).unwrap().is_empty());
    assert_eq!(store.count_events("det-test-21", "tick_started").unwrap(), 200);
    resumed.run_ticks(400).unwrap();

    let mut reference = build_peer(21, &config, &commands);
    reference.run_ticks(600).unwrap();
    assert_eq!(resumed.checksums(), reference.checksums());

    // Ticks 201..=250 ran twice but are recorded once.
    let store = resumed.store().unwrap();
    assert_eq!(store.count_events("det-test-21", "tick_started").unwrap(), 600);
    assert_eq!(store.count_events("det-test-21", "run_initialized").unwrap(), 1);
    assert_eq!(store.checksums_for_run("det-test-21").unwrap(), reference.checksums());

    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{path}{suffix}"));
    }
}
