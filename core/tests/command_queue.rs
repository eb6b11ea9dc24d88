//! Command queue ordering tests.

use lockstep_core::{
    cmdqueue::CommandQueue,
    command::{CommandPayload, PlayerCommand},
    map::Coords,
    object::ObjectId,
};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;

fn act(serial: u32) -> CommandPayload {
    CommandPayload::Act { serial }
}

fn actor(index: u32) -> Option<ObjectId> {
    Some(ObjectId { index, generation: 0 })
}

/// Whatever order commands are scheduled in, they come out sorted by
/// (due_time, sequence).
#[test]
fn random_schedules_drain_in_key_order() {
    let mut rng = Pcg64Mcg::seed_from_u64(0x5EED);
    for _ in 0..20 {
        let mut queue = CommandQueue::new();
        for serial in 0..200 {
            queue.schedule(rng.gen_range(0..50), actor(serial % 7), act(serial));
        }
        let drained = queue.pop_due(u64::MAX);
        assert_eq!(drained.len(), 200);
        assert!(
            drained.windows(2).all(|w| w[0].key() < w[1].key()),
            "commands left out of order"
        );
        assert!(queue.is_empty());
    }
}

#[test]
fn equal_due_times_keep_insertion_order() {
    let mut queue = CommandQueue::new();
    for serial in 0..10 {
        queue.schedule(5, actor(serial), act(serial));
    }
    let serials: Vec<u32> = queue
        .pop_due(5)
        .into_iter()
        .map(|c| match c.payload {
            CommandPayload::Act { serial } => serial,
            CommandPayload::Player(_) => unreachable!(),
        })
        .collect();
    assert_eq!(serials, (0..10).collect::<Vec<_>>());
}

#[test]
fn only_due_commands_leave() {
    let mut queue = CommandQueue::new();
    queue.schedule(10, None, act(0));
    queue.schedule(3, None, act(1));
    queue.schedule(7, None, act(2));

    let due: Vec<u64> = queue.pop_due(7).iter().map(|c| c.due_time).collect();
    assert_eq!(due, vec![3, 7]);
    assert_eq!(queue.peek_due_time(), Some(10));
    assert!(queue.pop_next_due(9).is_none());
    assert_eq!(queue.len(), 1);
}

#[test]
fn past_due_commands_run_at_next_poll() {
    let mut queue = CommandQueue::new();
    queue.schedule(20, None, act(0));
    // Scheduled "in the past" relative to a clock already at 20.
    queue.schedule(4, None, act(1));

    let first = queue.pop_next_due(20).expect("past-due command");
    assert_eq!(first.due_time, 4);
    assert_eq!(queue.pop_next_due(20).map(|c| c.due_time), Some(20));
}

/// Commands scheduled while draining and already due are picked up by
/// the same drain, after everything scheduled before them.
#[test]
fn commands_scheduled_during_dispatch_run_in_same_poll() {
    let mut queue = CommandQueue::new();
    queue.schedule(5, actor(0), act(0));
    queue.schedule(5, actor(1), act(1));

    let mut order = Vec::new();
    while let Some(command) = queue.pop_next_due(5) {
        order.push(command.sequence);
        if command.sequence == 0 {
            queue.schedule(5, actor(0), act(2));
        }
    }
    assert_eq!(order, vec![0, 1, 2]);
}

#[test]
fn cancelled_commands_are_skipped() {
    let mut queue = CommandQueue::new();
    let a = queue.schedule(1, actor(0), act(0));
    let b = queue.schedule(1, actor(1), act(1));
    queue.schedule(2, actor(0), act(2));

    assert!(queue.cancel(a));
    assert!(!queue.cancel(a), "cancelling twice is a no-op");
    assert_eq!(queue.cancel_target(ObjectId { index: 0, generation: 0 }), 1);
    assert_eq!(queue.len(), 1);

    let left: Vec<u64> = queue.pop_due(10).iter().map(|c| c.sequence).collect();
    assert_eq!(left, vec![b]);
    assert!(!queue.cancel(b), "already dispatched");
}

#[test]
fn saved_queue_restores_order_and_sequence() {
    let mut queue = CommandQueue::new();
    queue.schedule(
        4,
        None,
        CommandPayload::Player(PlayerCommand::SetBlocked {
            at:      Coords::new(1, 1),
            blocked: true,
        }),
    );
    let cancelled = queue.schedule(2, actor(3), act(9));
    queue.schedule(2, actor(4), act(1));
    queue.cancel(cancelled);

    let state = queue.save_state();
    assert_eq!(state.pending.len(), 2);
    assert_eq!(state.next_sequence, 3);

    let mut restored = CommandQueue::restore(state);
    assert_eq!(restored.schedule(2, None, act(0)), 3);
    let order: Vec<u64> = restored.pop_due(10).iter().map(|c| c.sequence).collect();
    assert_eq!(order, vec![2, 3, 0]);
}
