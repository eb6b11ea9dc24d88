//! Worker programs: named, ordered lists of actions.
//!
//! Programs are parsed once when the session starts and shared
//! read-only by every actor. Unknown opcodes and bad arguments are
//! rejected here, so the interpreter never meets a step it cannot run.
//!
//! Step syntax is one line per action: `opcode [arg ...]`, where an arg
//! is either positional (`createware wood`) or `key=value`
//! (`findspace radius=6`).

use crate::error::{SimError, SimResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Opcode {
    CreateWare,
    Return,
    Walk,
    FindSpace,
    FindObject,
    GiveWare,
    Idle,
    Scout,
}

impl Opcode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "createware" => Some(Self::CreateWare),
            "return"     => Some(Self::Return),
            "walk"       => Some(Self::Walk),
            "findspace"  => Some(Self::FindSpace),
            "findobject" => Some(Self::FindObject),
            "giveware"   => Some(Self::GiveWare),
            "idle"       => Some(Self::Idle),
            "scout"      => Some(Self::Scout),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::CreateWare => "createware",
            Self::Return     => "return",
            Self::Walk       => "walk",
            Self::FindSpace  => "findspace",
            Self::FindObject => "findobject",
            Self::GiveWare   => "giveware",
            Self::Idle       => "idle",
            Self::Scout      => "scout",
        }
    }
}

/// Where a `walk` step heads.
pub const WALK_TO_COORDS: &str = "coords";
pub const WALK_TO_OBJECT: &str = "object";

/// One program step. Parameter layout per opcode:
///
/// | opcode     | iparams            | sparams        |
/// |------------|--------------------|----------------|
/// | createware |                    | ware           |
/// | return     | drop (0/1)         |                |
/// | walk       |                    | coords/object  |
/// | findspace  | radius             |                |
/// | findobject | radius             | kind           |
/// | giveware   |                    |                |
/// | idle       | ticks              |                |
/// | scout      | radius, duration   |                |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub opcode:  Opcode,
    pub iparams: Vec<i32>,
    pub sparams: Vec<String>,
}

impl Action {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut words = line.split_whitespace();
        let name = words.next().ok_or("empty step")?;
        let opcode = Opcode::from_name(name).ok_or_else(|| format!("unknown opcode '{name}'"))?;
        let args = Args::collect(words)?;

        let (iparams, sparams) = match opcode {
            Opcode::CreateWare => (vec![], vec![args.positional(0, "ware")?.to_string()]),
            Opcode::Return => {
                let drop = match args.named("drop") {
                    None | Some("false") => 0,
                    Some("true") => 1,
                    Some(other) => return Err(format!("drop must be true or false, not '{other}'")),
                };
                (vec![drop], vec![])
            }
            Opcode::Walk => {
                let target = args.positional(0, "target")?;
                if target != WALK_TO_COORDS && target != WALK_TO_OBJECT {
                    return Err(format!("walk target must be coords or object, not '{target}'"));
                }
                (vec![], vec![target.to_string()])
            }
            Opcode::FindSpace => (vec![args.number("radius", 1, 32)?], vec![]),
            Opcode::FindObject => (
                vec![args.number("radius", 1, 32)?],
                vec![args.named("kind").ok_or("missing kind=")?.to_string()],
            ),
            Opcode::GiveWare => (vec![], vec![]),
            Opcode::Idle => {
                let ticks = args.positional(0, "ticks")?;
                let ticks: i32 = ticks
                    .parse()
                    .map_err(|_| format!("idle ticks '{ticks}' is not a number"))?;
                if ticks < 1 {
                    return Err("idle ticks must be positive".into());
                }
                (vec![ticks], vec![])
            }
            Opcode::Scout => (
                vec![args.number("radius", 1, 32)?, args.number("duration", 1, 10_000)?],
                vec![],
            ),
        };
        Ok(Self { opcode, iparams, sparams })
    }
}

struct Args<'a> {
    positional: Vec<&'a str>,
    named:      BTreeMap<&'a str, &'a str>,
}

impl<'a> Args<'a> {
    fn collect(words: impl Iterator<Item = &'a str>) -> Result<Self, String> {
        let mut args = Args {
            positional: Vec::new(),
            named:      BTreeMap::new(),
        };
        for word in words {
            match word.split_once('=') {
                Some((key, value)) => {
                    if args.named.insert(key, value).is_some() {
                        return Err(format!("duplicate argument '{key}'"));
                    }
                }
                None => args.positional.push(word),
            }
        }
        Ok(args)
    }

    fn positional(&self, n: usize, what: &str) -> Result<&'a str, String> {
        self.positional
            .get(n)
            .copied()
            .ok_or_else(|| format!("missing {what}"))
    }

    fn named(&self, key: &str) -> Option<&'a str> {
        self.named.get(key).copied()
    }

    fn number(&self, key: &str, min: i32, max: i32) -> Result<i32, String> {
        let raw = self.named(key).ok_or_else(|| format!("missing {key}="))?;
        let value: i32 = raw
            .parse()
            .map_err(|_| format!("{key}='{raw}' is not a number"))?;
        if !(min..=max).contains(&value) {
            return Err(format!("{key}={value} outside {min}..={max}"));
        }
        Ok(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub name:    String,
    pub actions: Vec<Action>,
}

impl Program {
    pub fn parse(name: &str, lines: &[String]) -> SimResult<Self> {
        if lines.is_empty() {
            return Err(SimError::MalformedProgram {
                program: name.to_string(),
                step:    0,
                reason:  "program has no steps".into(),
            });
        }
        let actions = lines
            .iter()
            .enumerate()
            .map(|(step, line)| {
                Action::parse(line).map_err(|reason| SimError::MalformedProgram {
                    program: name.to_string(),
                    step,
                    reason,
                })
            })
            .collect::<SimResult<Vec<_>>>()?;
        Ok(Self {
            name: name.to_string(),
            actions,
        })
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Every program of the session, shared by all actors.
#[derive(Debug, Clone, Default)]
pub struct ProgramLibrary {
    programs: BTreeMap<String, Arc<Program>>,
}

impl ProgramLibrary {
    pub fn from_definitions(definitions: &BTreeMap<String, Vec<String>>) -> SimResult<Self> {
        let programs = definitions
            .iter()
            .map(|(name, lines)| Ok((name.clone(), Arc::new(Program::parse(name, lines)?))))
            .collect::<SimResult<BTreeMap<_, _>>>()?;
        Ok(Self { programs })
    }

    pub fn get(&self, name: &str) -> Option<Arc<Program>> {
        self.programs.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.programs.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.programs.keys().map(String::as_str)
    }
}
