//! sim-runner: headless lockstep runner.
//!
//! Runs several peers in one process from the same seed and the same
//! scripted command stream, exchanges their checksums the way a network
//! layer would, and stops at the first desync.
//!
//! Usage:
//!   sim-runner --seed 12345 --ticks 10000 --peers 2 --db run.db
//!   sim-runner --seed 12345 --ipc-mode

use anyhow::Result;
use lockstep_core::{
    checksum::DesyncMonitor,
    command::PlayerCommand,
    config::SimConfig,
    engine::SimEngine,
    object::ObjectId,
    scenario::Scenario,
    store::SimStore,
    types::{Seed, SimTime},
};
use std::env;
use std::io::{self, BufRead, Write};

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    GetState,
    Tick { count: u64 },
    Command { due_time: SimTime, command: PlayerCommand },
    Save,
    Quit,
}

#[derive(serde::Serialize)]
struct UiState {
    tick:      SimTime,
    paused:    bool,
    actors:    usize,
    buildings: usize,
    queued:    usize,
    checksum:  Option<String>,
    workers:   Vec<WorkerState>,
}

#[derive(serde::Serialize)]
struct WorkerState {
    id:       ObjectId,
    owner:    u8,
    kind:     String,
    position: (i16, i16),
    task:     &'static str,
    carried:  Option<String>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42 as Seed);
    let ticks = parse_arg(&args, "--ticks", 10_000u64);
    let peers = parse_arg(&args, "--peers", 2usize).max(1);
    let players = parse_arg(&args, "--players", 2u8);
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let db = args
        .windows(2)
        .find(|w| w[0] == "--db")
        .map(|w| w[1].as_str());
    let data_dir = args
        .windows(2)
        .find(|w| w[0] == "--data-dir")
        .map(|w| w[1].as_str())
        .unwrap_or("./data");

    let config = SimConfig::load(data_dir)?;
    let run_id = format!("run-{seed}");

    if ipc_mode {
        let mut engine = SimEngine::new(run_id, seed, &config)?;
        if let Some(path) = db {
            engine = engine.with_store(open_store(path)?)?;
        }
        return run_ipc_loop(&mut engine);
    }

    println!("lockstep sim-runner");
    println!("  seed:      {seed}");
    println!("  ticks:     {ticks}");
    println!("  peers:     {peers}");
    println!("  players:   {players}");
    println!("  db:        {}", db.unwrap_or("(none)"));
    println!("  data_dir:  {data_dir}");
    println!();

    let scenario = Scenario {
        players,
        ticks,
        ..Scenario::default()
    };
    let commands = scenario.generate(u64::from(seed), &config.map.build()?);
    log::info!("scenario has {} commands", commands.len());

    // Peer 0 is the one that persists, if a database was given.
    let mut engines = (0..peers)
        .map(|peer| {
            let engine = SimEngine::new(run_id.clone(), seed, &config)?;
            match db {
                Some(path) if peer == 0 => engine.with_store(open_store(path)?),
                _ => Ok(engine),
            }
        })
        .collect::<lockstep_core::error::SimResult<Vec<_>>>()?;
    for engine in &mut engines {
        for (due_time, command) in &commands {
            engine.enqueue(*due_time, command.clone());
        }
    }

    // Peer 0 compares itself against every other peer.
    let mut monitors: Vec<DesyncMonitor> = (1..peers).map(|_| DesyncMonitor::new()).collect();
    let step = config.checksum_interval;
    let mut done = 0;
    let mut last_compared = None;
    while done < ticks {
        let n = step.min(ticks - done);
        for engine in &mut engines {
            engine.run_ticks(n)?;
        }
        done += n;

        let Some((tick, local)) = engines[0].latest_checksum() else {
            continue;
        };
        if last_compared.replace(tick) == Some(tick) {
            continue;
        }
        for (monitor, remote) in monitors.iter_mut().zip(&engines[1..]) {
            monitor.record_local(tick, local)?;
            if let Some((remote_tick, digest)) = remote.latest_checksum() {
                monitor.record_remote(remote_tick, digest)?;
            }
        }
    }

    print_summary(&engines[0], &monitors, ticks)?;
    Ok(())
}

fn open_store(path: &str) -> Result<SimStore> {
    let store = SimStore::open(path)?;
    store.migrate()?;
    Ok(store)
}

fn run_ipc_loop(engine: &mut SimEngine) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                let err_json = serde_json::json!({ "error": e.to_string() });
                writeln!(stdout, "{}", err_json)?;
                stdout.flush()?;
                continue;
            }
        };

        match cmd {
            IpcCommand::Quit => break,
            IpcCommand::Tick { count } => {
                engine.run_ticks(count)?;
                writeln!(stdout, "{}", serde_json::to_string(&build_ui_state(engine))?)?;
            }
            IpcCommand::GetState => {
                writeln!(stdout, "{}", serde_json::to_string(&build_ui_state(engine))?)?;
            }
            IpcCommand::Command { due_time, command } => {
                let sequence = engine.enqueue(due_time, command);
                writeln!(stdout, "{}", serde_json::json!({ "queued": sequence }))?;
            }
            IpcCommand::Save => {
                let bytes = engine.save()?;
                writeln!(stdout, "{}", serde_json::json!({ "savegame_bytes": bytes.len() }))?;
            }
        }
        stdout.flush()?;
    }
    Ok(())
}

fn build_ui_state(engine: &SimEngine) -> UiState {
    let workers = engine
        .actors()
        .iter()
        .map(|(id, actor)| WorkerState {
            id,
            owner:    actor.owner,
            kind:     actor.kind.clone(),
            position: (actor.position.x, actor.position.y),
            task:     actor.top().task.name(),
            carried:  actor.carried.clone(),
        })
        .collect();
    UiState {
        tick:      engine.clock.current_tick,
        paused:    engine.clock.paused,
        actors:    engine.actors().len(),
        buildings: engine.buildings().len(),
        queued:    engine.world().queue.len(),
        checksum:  engine.latest_checksum().map(|(_, digest)| digest.to_string()),
        workers,
    }
}

fn print_summary(engine: &SimEngine, monitors: &[DesyncMonitor], ticks: u64) -> Result<()> {
    let stock: u32 = engine
        .buildings()
        .iter()
        .map(|(_, b)| b.stock.values().sum::<u32>())
        .sum();

    println!("=== RUN SUMMARY ===");
    println!("  run_id:         {}", engine.run_id);
    println!("  ticks run:      {ticks}");
    println!("  final tick:     {}", engine.clock.current_tick);
    println!("  homes:          {}", engine.buildings().len());
    println!("  workers:        {}", engine.actors().len());
    println!("  wares stocked:  {stock}");
    println!("  checksums:      {}", engine.checksums().len());
    if let Some((tick, digest)) = engine.latest_checksum() {
        println!("  last checksum:  {digest} (tick {tick})");
    }

    println!();
    println!("=== PEER AGREEMENT ===");
    if monitors.is_empty() {
        println!("  (single peer, nothing to compare)");
    }
    for (peer, monitor) in monitors.iter().enumerate() {
        match monitor.verified_through() {
            Some(tick) => println!("  peer {}: in sync through tick {tick}", peer + 1),
            None => println!("  peer {}: nothing verified yet", peer + 1),
        }
    }

    if let Some(store) = engine.store() {
        let delivered = store.count_events(&engine.run_id, "ware_delivered")?;
        let failed = store.count_events(&engine.run_id, "task_failed")?;
        println!();
        println!("=== EVENT LOG ===");
        println!("  deliveries:     {delivered}");
        println!("  task failures:  {failed}");
    }
    Ok(())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
