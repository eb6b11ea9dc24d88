use crate::{
    error::SimResult,
    map::{Coords, Map},
    program::ProgramLibrary,
    types::SimTime,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapConfig {
    pub width:   u16,
    pub height:  u16,
    #[serde(default)]
    pub blocked: Vec<Coords>,
}

impl MapConfig {
    pub fn build(&self) -> SimResult<Map> {
        let mut map = Map::new(self.width, self.height)?;
        for &c in &self.blocked {
            map.set_blocked(c, true);
        }
        Ok(map)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SimFile {
    map:                  MapConfig,
    checksum_interval:    SimTime,
    snapshot_interval:    SimTime,
    worker_vision_radius: u16,
    home_vision_radius:   u16,
}

/// Worker programs by name, one step per line.
#[derive(Debug, Clone, Deserialize)]
struct ProgramsFile {
    programs: BTreeMap<String, Vec<String>>,
}

/// Everything a session needs before tick 0. Every peer must load the
/// same configuration; it is not part of the savegame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    pub map:                  MapConfig,
    /// Ticks between two state checksums.
    pub checksum_interval:    SimTime,
    /// Ticks between two savegames written to an attached store.
    pub snapshot_interval:    SimTime,
    pub worker_vision_radius: u16,
    pub home_vision_radius:   u16,
    pub programs:             BTreeMap<String, Vec<String>>,
}

impl SimConfig {
    /// Load configuration from the data directory.
    /// In tests, use SimConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/sim.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let sim: SimFile = serde_json::from_str(&content)?;

        let programs_path = format!("{data_dir}/programs.json");
        let programs_content = std::fs::read_to_string(&programs_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {programs_path}: {e}"))?;
        let programs: ProgramsFile = serde_json::from_str(&programs_content)?;

        let config = Self {
            map:                  sim.map,
            checksum_interval:    sim.checksum_interval,
            snapshot_interval:    sim.snapshot_interval,
            worker_vision_radius: sim.worker_vision_radius,
            home_vision_radius:   sim.home_vision_radius,
            programs:             programs.programs,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.checksum_interval > 0, "checksum_interval must be positive");
        anyhow::ensure!(self.snapshot_interval > 0, "snapshot_interval must be positive");
        self.map.build()?;
        self.program_library()?;
        Ok(())
    }

    /// Parse every program. Unknown opcodes are rejected here, never at run time.
    pub fn program_library(&self) -> SimResult<ProgramLibrary> {
        ProgramLibrary::from_definitions(&self.programs)
    }

    /// Minimal in-memory config for tests.
    pub fn default_test() -> Self {
        let programs = [
            ("deliver", vec!["createware wood", "return drop=true"]),
            ("wander", vec!["scout radius=3 duration=12", "return"]),
            ("explore", vec!["findspace radius=4", "walk coords", "idle 5", "return"]),
            (
                "courier",
                vec![
                    "createware stone",
                    "findobject kind=carrier radius=8",
                    "walk object",
                    "giveware",
                    "return",
                ],
            ),
        ]
        .into_iter()
        .map(|(name, steps)| {
            (
                name.to_string(),
                steps.into_iter().map(str::to_string).collect(),
            )
        })
        .collect();

        Self {
            map: MapConfig {
                width:   32,
                height:  32,
                blocked: (4..12).map(|y| Coords::new(16, y)).collect(),
            },
            checksum_interval:    100,
            snapshot_interval:    1000,
            worker_vision_radius: 2,
            home_vision_radius:   4,
            programs,
        }
    }
}
