//! Common types for the Lighthouse grid world.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::EnvError;

/// Unique identifier for an agent living in the grid world.
///
/// Uses UUID v4 for global uniqueness without coordination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub Uuid);

impl AgentId {
    /// Creates a new random AgentId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a deterministic AgentId from a seed (for reproducible runs).
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// A cell of the grid. `x` grows eastward, `y` grows southward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    /// Creates a cell from its coordinates.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Returns the cell displaced by `(dx, dy)`.
    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x.saturating_add(dx), self.y.saturating_add(dy))
    }

    /// Returns the neighbouring cell in the given direction.
    pub fn step(&self, direction: Direction) -> Self {
        let (dx, dy) = direction.offset();
        self.offset(dx, dy)
    }

    /// Euclidean distance to another cell.
    pub fn distance_to(&self, other: &Cell) -> f64 {
        let dx = f64::from(other.x - self.x);
        let dy = f64::from(other.y - self.y);
        dx.hypot(dy)
    }

    /// Unit vector pointing at `other`, or `(0, 0)` when both cells coincide.
    pub fn unit_vector_to(&self, other: &Cell) -> (f64, f64) {
        let dist = self.distance_to(other);
        if dist > 0.0 {
            (f64::from(other.x - self.x) / dist, f64::from(other.y - self.y) / dist)
        } else {
            (0.0, 0.0)
        }
    }
}

impl From<(i32, i32)> for Cell {
    fn from((x, y): (i32, i32)) -> Self {
        Self::new(x, y)
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// The eight compass directions an agent can move in.
///
/// The declaration order (cardinals first, then diagonals clockwise from
/// northeast) is the canonical action order used by value tables and by the
/// obstacle mask bit layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    North,
    South,
    East,
    West,
    NorthEast,
    SouthEast,
    SouthWest,
    NorthWest,
}

impl Direction {
    /// All directions in canonical order.
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
        Direction::NorthEast,
        Direction::SouthEast,
        Direction::SouthWest,
        Direction::NorthWest,
    ];

    /// Grid offset of a single step in this direction.
    pub const fn offset(self) -> (i32, i32) {
        match self {
            Direction::North => (0, -1),
            Direction::South => (0, 1),
            Direction::East => (1, 0),
            Direction::West => (-1, 0),
            Direction::NorthEast => (1, -1),
            Direction::SouthEast => (1, 1),
            Direction::SouthWest => (-1, 1),
            Direction::NorthWest => (-1, -1),
        }
    }

    /// Position of this direction in [`Direction::ALL`].
    pub const fn index(self) -> usize {
        match self {
            Direction::North => 0,
            Direction::South => 1,
            Direction::East => 2,
            Direction::West => 3,
            Direction::NorthEast => 4,
            Direction::SouthEast => 5,
            Direction::SouthWest => 6,
            Direction::NorthWest => 7,
        }
    }

    /// Lowercase name, as carried in move actions.
    pub const fn name(self) -> &'static str {
        match self {
            Direction::North => "north",
            Direction::South => "south",
            Direction::East => "east",
            Direction::West => "west",
            Direction::NorthEast => "northeast",
            Direction::SouthEast => "southeast",
            Direction::SouthWest => "southwest",
            Direction::NorthWest => "northwest",
        }
    }

    /// Buckets a direction vector into one of the eight directions.
    ///
    /// A component only counts once its magnitude exceeds `threshold`. When
    /// both components count the diagonal wins; otherwise the axis with the
    /// larger magnitude decides. Returns `None` for the zero vector.
    pub fn from_vector(dx: f64, dy: f64, threshold: f64) -> Option<Direction> {
        if !dx.is_finite() || !dy.is_finite() || (dx == 0.0 && dy == 0.0) {
            return None;
        }

        let vertical = if dy < -threshold {
            Some(Direction::North)
        } else if dy > threshold {
            Some(Direction::South)
        } else {
            None
        };
        let horizontal = if dx > threshold {
            Some(Direction::East)
        } else if dx < -threshold {
            Some(Direction::West)
        } else {
            None
        };

        match (vertical, horizontal) {
            (Some(Direction::North), Some(Direction::East)) => Some(Direction::NorthEast),
            (Some(Direction::North), Some(Direction::West)) => Some(Direction::NorthWest),
            (Some(Direction::South), Some(Direction::East)) => Some(Direction::SouthEast),
            (Some(Direction::South), Some(Direction::West)) => Some(Direction::SouthWest),
            _ if dx.abs() > dy.abs() => {
                Some(if dx > 0.0 { Direction::East } else { Direction::West })
            }
            _ => Some(if dy > 0.0 { Direction::South } else { Direction::North }),
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Direction {
    type Err = EnvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "north" | "n" => Ok(Direction::North),
            "south" | "s" => Ok(Direction::South),
            "east" | "e" => Ok(Direction::East),
            "west" | "w" => Ok(Direction::West),
            "northeast" | "ne" => Ok(Direction::NorthEast),
            "southeast" | "se" => Ok(Direction::SouthEast),
            "southwest" | "sw" => Ok(Direction::SouthWest),
            "northwest" | "nw" => Ok(Direction::NorthWest),
            _ => Err(EnvError::unknown_direction(s)),
        }
    }
}

/// Bitmask of blocked neighbours, one bit per [`Direction`] index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObstacleMask(pub u8);

impl ObstacleMask {
    /// A mask with no blocked neighbours.
    pub const EMPTY: ObstacleMask = ObstacleMask(0);

    /// Marks the neighbour in `direction` as blocked.
    pub fn set(&mut self, direction: Direction) {
        self.0 |= 1 << direction.index();
    }

    /// Whether the neighbour in `direction` is blocked.
    pub fn contains(&self, direction: Direction) -> bool {
        self.0 & (1 << direction.index()) != 0
    }

    /// Number of blocked neighbours.
    pub fn count(&self) -> u32 {
        self.0.count_ones()
    }
}

impl std::fmt::Display for ObstacleMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for direction in Direction::ALL {
            f.write_str(if self.contains(direction) { "1" } else { "0" })?;
        }
        Ok(())
    }
}

/// Discretized, hashable view of an observation used to index learned values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StateKey {
    /// Compass bucket of the goal direction plus the blocked-neighbour mask.
    /// `heading` is `None` when the agent sits on the goal.
    Composite {
        heading: Option<Direction>,
        obstacles: ObstacleMask,
    },

    /// Raw grid position, used when no composite key was published.
    Position(Cell),
}

impl std::fmt::Display for StateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateKey::Composite { heading, obstacles } => {
                let heading = heading.map_or("here", Direction::name);
                write!(f, "{}/{}", heading, obstacles)
            }
            StateKey::Position(cell) => write!(f, "{}", cell),
        }
    }
}
