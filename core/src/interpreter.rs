//! The task interpreter.
//!
//! One loop dispatches on the top frame's TaskKind; Program frames
//! dispatch again on the current action's Opcode. Every handler shares
//! one contract: given the actor (whose top frame is the current one)
//! and the world, return a Flow.
//!
//!   - Continue: the stack changed; run the new top frame right away.
//!   - Suspend(n): schedule the next act `n` ticks from now. This is the
//!     only way an actor yields; nothing ever blocks.
//!   - Sleep: schedule nothing; a command will wake the actor.
//!
//! A handler that cannot complete pops its frame with the "fail" signal.
//! That is an ordinary outcome, never an error: SimError is returned
//! only for the fatal cases (pathfield pool exhaustion).

use crate::{
    actor::{Actor, TaskKind, SIGNAL_FAIL},
    command::CommandPayload,
    error::SimResult,
    event::SimEvent,
    map::{Coords, Direction},
    object::Arena,
    program::{Action, Opcode, WALK_TO_OBJECT},
    region::{area_cells, Area},
    router,
    types::SimTime,
    world::World,
};

/// Pause after an ordinary program step.
pub const STEP_TICKS: SimTime = 10;
/// Time to walk one cell.
pub const WALK_STEP_TICKS: SimTime = 3;
/// Pause between two runs of a worker's default program.
pub const IDLE_RESTART_TICKS: SimTime = 20;
/// Backoff unit after a failed program; multiplied by the retry count.
pub const RETRY_BACKOFF_TICKS: SimTime = 50;
/// Consecutive failures after which the default program is dropped.
pub const MAX_PROGRAM_RETRIES: u32 = 5;

const MAX_TRANSITIONS_PER_ACT: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Suspend(SimTime),
    Sleep,
}

/// Run one act of `actor`. `actors` holds everyone else; the acting
/// actor is checked out of it for the duration.
pub fn act(actor: &mut Actor, world: &mut World, actors: &mut Arena<Actor>) -> SimResult<()> {
    for _ in 0..MAX_TRANSITIONS_PER_ACT {
        let flow = match actor.top().task {
            TaskKind::Idle    => idle_update(actor, world),
            TaskKind::Program => program_update(actor, world, actors)?,
            TaskKind::Move    => move_update(actor, world),
            TaskKind::Return  => return_update(actor, world)?,
            TaskKind::Scout   => scout_update(actor, world),
        };
        match flow {
            Flow::Continue => continue,
            Flow::Suspend(ticks) => {
                schedule_act(actor, world, ticks);
                return Ok(());
            }
            Flow::Sleep => return Ok(()),
        }
    }
    log::warn!(
        "tick={} actor {} made {MAX_TRANSITIONS_PER_ACT} task transitions in one act",
        world.time,
        actor.id
    );
    schedule_act(actor, world, 1);
    Ok(())
}

/// Schedule the actor's next act. Any act scheduled earlier goes stale.
pub fn schedule_act(actor: &mut Actor, world: &mut World, ticks: SimTime) {
    schedule_act_at(actor, world, world.time + ticks.max(1));
}

/// Wake the actor later in the current tick.
pub fn wake(actor: &mut Actor, world: &mut World) {
    schedule_act_at(actor, world, world.time);
}

fn schedule_act_at(actor: &mut Actor, world: &mut World, due_time: SimTime) {
    actor.act_serial = actor.act_serial.wrapping_add(1);
    world.queue.schedule(
        due_time,
        Some(actor.id),
        CommandPayload::Act {
            serial: actor.act_serial,
        },
    );
}

fn fail(actor: &mut Actor, world: &mut World, reason: &str) -> Flow {
    let task = actor.top().task;
    log::debug!(
        "tick={} actor {} {} failed: {reason}",
        world.time,
        actor.id,
        task.name()
    );
    world.emit(SimEvent::TaskFailed {
        tick:   world.time,
        actor:  actor.id,
        task,
        reason: reason.to_string(),
    });
    actor.pop_task(Some(SIGNAL_FAIL));
    Flow::Continue
}

/// Pass a signal left by a popped child on to this frame's parent.
fn forward_signal(actor: &mut Actor) -> Option<Flow> {
    let signal = actor.signal.take()?;
    actor.pop_task(Some(&signal));
    Some(Flow::Continue)
}

/// Move one cell, dragging the owner's vision along incrementally.
fn step_actor(actor: &mut Actor, world: &mut World, dir: Direction) {
    let area = Area::new(actor.position, actor.vision_radius);
    let moved = world.move_viewer(actor.owner, area, dir);
    actor.position = moved.center;
}

fn start_walk(actor: &mut Actor, world: &mut World, target: Coords) -> SimResult<Flow> {
    if actor.position == target {
        return Ok(Flow::Continue);
    }
    match router::find_path(&world.map, &mut world.pathfields, actor.position, target)? {
        Some(path) => {
            actor.push_task(TaskKind::Move).path = Some(path);
            Ok(Flow::Continue)
        }
        None => Ok(fail(actor, world, "no path to target")),
    }
}

// ── Task updates ─────────────────────────────────────────────────────────────

fn idle_update(actor: &mut Actor, world: &mut World) -> Flow {
    let failed = actor.signal.take().is_some_and(|s| s == SIGNAL_FAIL);
    let idle = actor.top_mut();
    let was_running = idle.ivar[0] != 0;
    idle.ivar[0] = 0;

    if failed {
        idle.retry_counter += 1;
        let retries = idle.retry_counter;
        if retries > MAX_PROGRAM_RETRIES {
            idle.retry_counter = 0;
            if let Some(program) = actor.default_program.take() {
                log::debug!("tick={} actor {} abandons {program}", world.time, actor.id);
                world.emit(SimEvent::ProgramAbandoned {
                    tick: world.time,
                    actor: actor.id,
                    program,
                });
            }
            return Flow::Sleep;
        }
        return Flow::Suspend(RETRY_BACKOFF_TICKS * SimTime::from(retries));
    }

    if was_running {
        idle.retry_counter = 0;
        return if actor.pending_program.is_some() || actor.default_program.is_some() {
            Flow::Suspend(IDLE_RESTART_TICKS)
        } else {
            Flow::Sleep
        };
    }

    let next = actor
        .pending_program
        .take()
        .or_else(|| actor.default_program.clone());
    let Some(name) = next else {
        return Flow::Sleep;
    };
    if !world.programs.contains(&name) {
        log::warn!("actor {} has unknown program {name}", actor.id);
        return Flow::Sleep;
    }
    actor.top_mut().ivar[0] = 1;
    actor.push_task(TaskKind::Program).program = Some(name);
    Flow::Continue
}

fn program_update(
    actor: &mut Actor,
    world: &mut World,
    actors: &mut Arena<Actor>,
) -> SimResult<Flow> {
    if let Some(flow) = forward_signal(actor) {
        return Ok(flow);
    }
    let frame = actor.top();
    let pc = frame.pc;
    let Some(program) = frame.program.as_deref().and_then(|name| world.programs.get(name)) else {
        return Ok(fail(actor, world, "unknown program"));
    };
    let Some(action) = program.actions.get(pc) else {
        actor.pop_task(None);
        return Ok(Flow::Continue);
    };

    match action.opcode {
        Opcode::CreateWare => Ok(run_createware(actor, world, action)),
        Opcode::Return     => Ok(run_return(actor, action)),
        Opcode::Walk       => run_walk(actor, world, actors, action),
        Opcode::FindSpace  => Ok(run_findspace(actor, world, action)),
        Opcode::FindObject => Ok(run_findobject(actor, world, actors, action)),
        Opcode::GiveWare   => Ok(run_giveware(actor, world, actors)),
        Opcode::Idle       => Ok(run_idle(actor, action)),
        Opcode::Scout      => Ok(run_scout(actor, action)),
    }
}

fn move_update(actor: &mut Actor, world: &mut World) -> Flow {
    if let Some(flow) = forward_signal(actor) {
        return flow;
    }
    let frame = actor.top();
    let step = frame.ivar[0] as usize;
    let Some(dir) = frame.path.as_ref().and_then(|p| p.steps.get(step)).copied() else {
        actor.pop_task(None);
        return Flow::Continue;
    };
    if world.map.is_blocked(world.map.neighbour(actor.position, dir)) {
        return fail(actor, world, "path obstructed");
    }
    step_actor(actor, world, dir);
    actor.top_mut().ivar[0] += 1;
    Flow::Suspend(WALK_STEP_TICKS)
}

/// ivar[0]: drop the carried ware at home. ivar[1]: already walked.
fn return_update(actor: &mut Actor, world: &mut World) -> SimResult<Flow> {
    if let Some(flow) = forward_signal(actor) {
        return Ok(flow);
    }
    let Some(home_at) = actor
        .home
        .and_then(|id| world.buildings.get(id))
        .map(|home| home.position)
    else {
        return Ok(fail(actor, world, "home vanished"));
    };

    if actor.position != home_at {
        if actor.top().ivar[1] != 0 {
            return Ok(fail(actor, world, "could not reach home"));
        }
        actor.top_mut().ivar[1] = 1;
        return start_walk(actor, world, home_at);
    }

    if actor.top().ivar[0] != 0 {
        if let (Some(ware), Some(home_id)) = (actor.carried.take(), actor.home) {
            if let Some(home) = world.buildings.get_mut(home_id) {
                home.store_ware(ware.clone());
            }
            world.emit(SimEvent::WareDelivered {
                tick:     world.time,
                actor:    actor.id,
                building: home_id,
                ware,
            });
        }
    }
    actor.pop_task(None);
    Ok(Flow::Continue)
}

/// ivar[0]: radius around the starting cell. ivar[1]: steps left.
fn scout_update(actor: &mut Actor, world: &mut World) -> Flow {
    if let Some(flow) = forward_signal(actor) {
        return flow;
    }
    let frame = actor.top();
    if frame.ivar[1] <= 0 {
        actor.pop_task(None);
        return Flow::Continue;
    }
    let radius = frame.ivar[0] as u32;
    let anchor = frame.coords.unwrap_or(actor.position);
    actor.top_mut().ivar[1] -= 1;

    let dir = Direction::ALL[world.rng.next_below(6) as usize];
    let next = world.map.neighbour(actor.position, dir);
    if !world.map.is_blocked(next) && world.map.calc_distance(anchor, next) <= radius {
        step_actor(actor, world, dir);
    }
    Flow::Suspend(WALK_STEP_TICKS)
}

// ── Program steps ────────────────────────────────────────────────────────────

fn run_createware(actor: &mut Actor, world: &mut World, action: &Action) -> Flow {
    let ware = action.sparams[0].clone();
    actor.carried = Some(ware.clone());
    actor.top_mut().pc += 1;
    world.emit(SimEvent::WareCreated {
        tick:  world.time,
        actor: actor.id,
        ware,
    });
    Flow::Suspend(STEP_TICKS)
}

fn run_return(actor: &mut Actor, action: &Action) -> Flow {
    actor.top_mut().pc += 1;
    actor.push_task(TaskKind::Return).ivar[0] = action.iparams[0];
    Flow::Continue
}

fn run_walk(
    actor: &mut Actor,
    world: &mut World,
    actors: &Arena<Actor>,
    action: &Action,
) -> SimResult<Flow> {
    let target = if action.sparams[0] == WALK_TO_OBJECT {
        let Some(id) = actor.top().objvar else {
            return Ok(fail(actor, world, "no object to walk to"));
        };
        match actors.get(id) {
            Some(object) => object.position,
            None => return Ok(fail(actor, world, "object vanished")),
        }
    } else {
        match actor.top().coords {
            Some(c) => c,
            None => return Ok(fail(actor, world, "no coordinates to walk to")),
        }
    };
    actor.top_mut().pc += 1;
    start_walk(actor, world, target)
}

fn run_findspace(actor: &mut Actor, world: &mut World, action: &Action) -> Flow {
    let radius = action.iparams[0] as u16;
    let candidates: Vec<Coords> = area_cells(&world.map, Area::new(actor.position, radius))
        .into_iter()
        .skip(1)
        .filter(|&c| !world.map.is_blocked(c))
        .collect();
    if candidates.is_empty() {
        return fail(actor, world, "no free space");
    }
    let pick = candidates[world.rng.next_below(candidates.len() as u32) as usize];
    let frame = actor.top_mut();
    frame.coords = Some(pick);
    frame.pc += 1;
    Flow::Suspend(STEP_TICKS)
}

fn run_findobject(
    actor: &mut Actor,
    world: &mut World,
    actors: &Arena<Actor>,
    action: &Action,
) -> Flow {
    let kind = &action.sparams[0];
    let radius = action.iparams[0] as u32;
    let nearest = actors
        .iter()
        .filter(|(_, other)| other.kind == *kind)
        .map(|(id, other)| (world.map.calc_distance(actor.position, other.position), id))
        .filter(|&(distance, _)| distance <= radius)
        .min();
    let Some((_, found)) = nearest else {
        return fail(actor, world, "no such object nearby");
    };
    let frame = actor.top_mut();
    frame.objvar = Some(found);
    frame.pc += 1;
    Flow::Suspend(STEP_TICKS)
}

fn run_giveware(actor: &mut Actor, world: &mut World, actors: &mut Arena<Actor>) -> Flow {
    let Some(target) = actor.top().objvar else {
        return fail(actor, world, "no receiver");
    };
    let Some(receiver) = actors.get_mut(target) else {
        return fail(actor, world, "receiver vanished");
    };
    if actor.carried.is_none() {
        return fail(actor, world, "nothing to give");
    }
    if receiver.carried.is_some() {
        return fail(actor, world, "receiver's hands are full");
    }
    if world.map.calc_distance(actor.position, receiver.position) > 1 {
        return fail(actor, world, "receiver out of reach");
    }
    let ware = actor.carried.take();
    receiver.carried = ware.clone();
    if let Some(ware) = ware {
        world.emit(SimEvent::WareHandedOver {
            tick: world.time,
            from: actor.id,
            to:   target,
            ware,
        });
    }
    actor.top_mut().pc += 1;
    Flow::Suspend(STEP_TICKS)
}

fn run_idle(actor: &mut Actor, action: &Action) -> Flow {
    actor.top_mut().pc += 1;
    Flow::Suspend(action.iparams[0] as SimTime)
}

fn run_scout(actor: &mut Actor, action: &Action) -> Flow {
    let start = actor.position;
    actor.top_mut().pc += 1;
    let frame = actor.push_task(TaskKind::Scout);
    frame.ivar[0] = action.iparams[0];
    frame.ivar[1] = action.iparams[1];
    frame.coords = Some(start);
    Flow::Continue
}
