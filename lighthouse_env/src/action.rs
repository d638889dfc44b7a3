//! Actions submitted by agents to the shared world.

use std::collections::BTreeMap;

use crate::types::Direction;

/// Parameter key carrying the movement direction of a move action.
pub const DIRECTION_PARAM: &str = "direction";

/// Kind tag of an action.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// Move one step; needs a direction parameter
    Move,
    /// Stay put
    Stop,
    /// Any tag the world does not understand
    Other(String),
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::Move => f.write_str("move"),
            ActionKind::Stop => f.write_str("stop"),
            ActionKind::Other(tag) => f.write_str(tag),
        }
    }
}

impl From<&str> for ActionKind {
    fn from(tag: &str) -> Self {
        match tag {
            "move" => ActionKind::Move,
            "stop" => ActionKind::Stop,
            other => ActionKind::Other(other.to_string()),
        }
    }
}

/// Value of an action parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionParam {
    /// A named direction such as `"north"`
    Name(String),
    /// An explicit 2-D vector, rounded to a grid step on resolution
    Vector(f64, f64),
}

/// An action: a kind tag plus a parameter mapping.
///
/// Produced by a policy and consumed exactly once by the world.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    kind: ActionKind,
    params: BTreeMap<String, ActionParam>,
}

impl Action {
    /// Creates a parameterless action of the given kind.
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            params: BTreeMap::new(),
        }
    }

    /// A move one step in a compass direction.
    pub fn move_in(direction: Direction) -> Self {
        Self::move_named(direction.name())
    }

    /// A move in a direction given by name (resolved by the world).
    pub fn move_named(name: impl Into<String>) -> Self {
        Self::new(ActionKind::Move).with_param(DIRECTION_PARAM, ActionParam::Name(name.into()))
    }

    /// A move along an explicit vector.
    pub fn move_along(dx: f64, dy: f64) -> Self {
        Self::new(ActionKind::Move).with_param(DIRECTION_PARAM, ActionParam::Vector(dx, dy))
    }

    /// Do nothing this tick.
    pub fn stop() -> Self {
        Self::new(ActionKind::Stop)
    }

    /// Builder-style parameter insert.
    pub fn with_param(mut self, key: impl Into<String>, value: ActionParam) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn kind(&self) -> &ActionKind {
        &self.kind
    }

    pub fn param(&self, key: &str) -> Option<&ActionParam> {
        self.params.get(key)
    }

    /// The direction parameter of a move, if present.
    pub fn direction(&self) -> Option<&ActionParam> {
        self.param(DIRECTION_PARAM)
    }

    pub fn is_move(&self) -> bool {
        self.kind == ActionKind::Move
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.direction() {
            Some(ActionParam::Name(name)) => write!(f, "{} {}", self.kind, name),
            Some(ActionParam::Vector(dx, dy)) => write!(f, "{} ({:.2}, {:.2})", self.kind, dx, dy),
            _ => write!(f, "{}", self.kind),
        }
    }
}
