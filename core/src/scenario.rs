//! Scripted player command streams.
//!
//! Stands in for the network layer in tools and tests: a scenario seed
//! expands into the same list of timed commands on every peer. The
//! generator has its own Pcg64Mcg stream and never touches the
//! simulation's SimRng.

use crate::{
    command::PlayerCommand,
    map::{Coords, Map},
    types::{PlayerNumber, SimTime},
};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use std::collections::BTreeMap;

/// Worker kinds the generator spawns, each with the program it repeats.
pub const WORKER_KINDS: [(&str, &str); 4] = [
    ("carrier", "deliver"),
    ("courier", "courier"),
    ("explorer", "explore"),
    ("scout", "wander"),
];

const CELL_ATTEMPTS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    pub players:         PlayerNumber,
    pub ticks:           SimTime,
    /// Mean number of ticks between two commands.
    pub command_spacing: SimTime,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            players:         2,
            ticks:           10_000,
            command_spacing: 40,
        }
    }
}

impl Scenario {
    /// Expand `seed` into a command stream ordered by due time.
    pub fn generate(&self, seed: u64, map: &Map) -> Vec<(SimTime, PlayerCommand)> {
        let mut rng = Pcg64Mcg::seed_from_u64(seed);
        let mut homes: BTreeMap<PlayerNumber, Coords> = BTreeMap::new();
        let mut commands = Vec::new();

        for player in 0..self.players {
            let Some(at) = free_cell(&mut rng, map, &homes) else {
                log::warn!("no free cell for the home of player {player}");
                continue;
            };
            homes.insert(player, at);
            commands.push((1, PlayerCommand::BuildHome { player, at }));
        }
        if homes.is_empty() {
            return commands;
        }
        let players: Vec<(PlayerNumber, Coords)> = homes.iter().map(|(&p, &c)| (p, c)).collect();

        let spacing = self.command_spacing.max(1);
        let mut due: SimTime = 2;
        while due < self.ticks {
            let (player, home) = players[rng.gen_range(0..players.len())];
            let (kind, program) = WORKER_KINDS[rng.gen_range(0..WORKER_KINDS.len())];
            let command = match rng.gen_range(0..100) {
                0..=59 => Some(PlayerCommand::SpawnWorker {
                    player,
                    home,
                    kind:    kind.to_string(),
                    program: Some(program.to_string()),
                }),
                60..=79 => Some(PlayerCommand::ReleaseWorker {
                    player,
                    kind: kind.to_string(),
                }),
                _ => free_cell(&mut rng, map, &homes).map(|at| PlayerCommand::SetBlocked {
                    at,
                    blocked: rng.gen_bool(0.6),
                }),
            };
            if let Some(command) = command {
                commands.push((due, command));
            }
            due += rng.gen_range(1..=2 * spacing);
        }
        commands
    }
}

/// A random cell that is neither blocked on the starting map nor a home.
fn free_cell(
    rng: &mut Pcg64Mcg,
    map: &Map,
    homes: &BTreeMap<PlayerNumber, Coords>,
) -> Option<Coords> {
    (0..CELL_ATTEMPTS)
        .map(|_| {
            Coords::new(
                rng.gen_range(0..map.width()) as i16,
                rng.gen_range(0..map.height()) as i16,
            )
        })
        .find(|&c| !map.is_blocked(c) && !homes.values().any(|&h| h == c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let map = Map::new(24, 24).unwrap();
        let scenario = Scenario::default();
        assert_eq!(scenario.generate(7, &map), scenario.generate(7, &map));
        assert_ne!(scenario.generate(7, &map), scenario.generate(8, &map));
    }

    #[test]
    fn stream_is_ordered_and_starts_with_homes() {
        let map = Map::new(24, 24).unwrap();
        let scenario = Scenario {
            players: 3,
            ..Scenario::default()
        };
        let commands = scenario.generate(99, &map);
        assert!(commands.windows(2).all(|w| w[0].0 <= w[1].0));
        assert!(commands[..3]
            .iter()
            .all(|(_, c)| matches!(c, PlayerCommand::BuildHome { .. })));
        assert!(commands.iter().all(|(due, _)| *due < scenario.ticks));
    }
}
