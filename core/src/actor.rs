//! Actors and their task stacks.
//!
//! RULES:
//!   - An actor's stack is never empty while it is alive; the bottom
//!     frame is always its Idle task.
//!   - Starting a sub-behaviour pushes a frame; finishing or failing pops
//!     it. A failing frame leaves a signal for its parent to inspect.
//!   - Frames refer to other objects only through ObjectIds.

use crate::{
    map::Coords,
    object::ObjectId,
    router::Path,
    types::{PlayerNumber, WareName},
};
use serde::{Deserialize, Serialize};

/// Signal left on an actor when a frame could not complete.
pub const SIGNAL_FAIL: &str = "fail";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Idle,
    Program,
    Move,
    Return,
    Scout,
}

impl TaskKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Idle    => "idle",
            Self::Program => "program",
            Self::Move    => "move",
            Self::Return  => "return",
            Self::Scout   => "scout",
        }
    }
}

/// One frame of an actor's behaviour stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskState {
    pub task:          TaskKind,
    /// Program frames only: the program being run.
    pub program:       Option<String>,
    pub pc:            usize,
    pub ivar:          [i32; 4],
    pub svar:          String,
    pub objvar:        Option<ObjectId>,
    pub coords:        Option<Coords>,
    /// Move frames only: the route being walked.
    pub path:          Option<Path>,
    pub retry_counter: u32,
}

impl TaskState {
    pub fn new(task: TaskKind) -> Self {
        Self {
            task,
            program:       None,
            pc:            0,
            ivar:          [0; 4],
            svar:          String::new(),
            objvar:        None,
            coords:        None,
            path:          None,
            retry_counter: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id:              ObjectId,
    pub owner:           PlayerNumber,
    pub kind:            String,
    pub position:        Coords,
    pub home:            Option<ObjectId>,
    pub carried:         Option<WareName>,
    pub vision_radius:   u16,
    /// Restarted by the Idle frame whenever the actor has nothing else to do.
    pub default_program: Option<String>,
    /// Run once by the Idle frame before the default program.
    pub pending_program: Option<String>,
    pub signal:          Option<String>,
    /// Serial of the latest scheduled act; older acts are ignored.
    pub act_serial:      u32,
    pub stack:           Vec<TaskState>,
}

impl Actor {
    pub fn new(id: ObjectId, owner: PlayerNumber, kind: &str, position: Coords) -> Self {
        Self {
            id,
            owner,
            kind:            kind.to_string(),
            position,
            home:            None,
            carried:         None,
            vision_radius:   0,
            default_program: None,
            pending_program: None,
            signal:          None,
            act_serial:      0,
            stack:           vec![TaskState::new(TaskKind::Idle)],
        }
    }

    pub fn top(&self) -> &TaskState {
        self.stack.last().expect("task stack is never empty")
    }

    pub fn top_mut(&mut self) -> &mut TaskState {
        self.stack.last_mut().expect("task stack is never empty")
    }

    /// The frame below the top, if any.
    pub fn parent(&self) -> Option<&TaskState> {
        self.stack.iter().rev().nth(1)
    }

    pub fn push_task(&mut self, task: TaskKind) -> &mut TaskState {
        self.stack.push(TaskState::new(task));
        self.top_mut()
    }

    /// Pop the top frame, leaving `signal` for the parent. The bottom
    /// Idle frame is never popped; a signal aimed at it stays pending.
    pub fn pop_task(&mut self, signal: Option<&str>) {
        if self.stack.len() > 1 {
            self.stack.pop();
        } else {
            log::warn!("actor {} tried to pop its idle task", self.id);
        }
        self.signal = signal.map(str::to_string);
    }

    /// Drop every frame above Idle without signals.
    pub fn reset_tasks(&mut self) {
        self.stack.truncate(1);
        self.signal = None;
        let idle = self.top_mut();
        *idle = TaskState::new(TaskKind::Idle);
    }

    pub fn is_idle(&self) -> bool {
        self.stack.len() == 1
    }
}
