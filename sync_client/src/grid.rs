//! Grid-stepped movement.
//!
//! Keyboard input moves the entity one cell at a time and always lands on a
//! cell centre, clamped to the grid bounds.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sync_shared::{config::GridConfig, math::Position};

/// Logical movement direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl FromStr for Direction {
    type Err = DirectionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" | "w" | "arrowup" => Ok(Direction::Up),
            "down" | "s" | "arrowdown" => Ok(Direction::Down),
            "left" | "a" | "arrowleft" => Ok(Direction::Left),
            "right" | "d" | "arrowright" => Ok(Direction::Right),
            _ => Err(DirectionParseError(s.to_string())),
        }
    }
}

/// Error type for direction parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectionParseError(pub String);

impl fmt::Display for DirectionParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown direction '{}'", self.0)
    }
}

impl std::error::Error for DirectionParseError {}

/// Cell containing `position`. Negative coordinates fall into cell 0.
pub fn cell_of(grid: &GridConfig, position: Position) -> (u32, u32) {
    let to_cell = |v: f32, limit: u32| {
        let c = (v / grid.cell_size).floor();
        if c <= 0.0 {
            0
        } else {
            (c as u32).min(limit.saturating_sub(1))
        }
    };
    (to_cell(position.x, grid.columns), to_cell(position.y, grid.rows))
}

/// Centre of cell `(cx, cy)` in position units.
pub fn cell_center(grid: &GridConfig, (cx, cy): (u32, u32)) -> Position {
    let half = grid.cell_size / 2.0;
    Position::new(
        cx as f32 * grid.cell_size + half,
        cy as f32 * grid.cell_size + half,
    )
}

/// Target of one step from `from`, or `None` when the step would leave the
/// grid (the entity is already against that edge).
pub fn step(grid: &GridConfig, from: Position, direction: Direction) -> Option<Position> {
    let (cx, cy) = cell_of(grid, from);
    let max_x = grid.columns.saturating_sub(1);
    let max_y = grid.rows.saturating_sub(1);
    let next = match direction {
        Direction::Up => (cx, cy.saturating_sub(1)),
        Direction::Down => (cx, (cy + 1).min(max_y)),
        Direction::Left => (cx.saturating_sub(1), cy),
        Direction::Right => ((cx + 1).min(max_x), cy),
    };
    if next == (cx, cy) {
        return None;
    }
    Some(cell_center(grid, next))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> GridConfig {
        GridConfig::default()
    }

    #[test]
    fn steps_land_on_cell_centres() {
        let g = grid();
        let start = Position::new(32.0, 32.0);
        assert_eq!(step(&g, start, Direction::Right), Some(Position::new(96.0, 32.0)));
        assert_eq!(step(&g, start, Direction::Down), Some(Position::new(32.0, 96.0)));
    }

    #[test]
    fn off_centre_positions_snap_to_neighbour_centre() {
        let g = grid();
        // Inside cell (2, 3).
        let p = Position::new(130.0, 250.0);
        assert_eq!(step(&g, p, Direction::Left), Some(Position::new(96.0, 224.0)));
        assert_eq!(step(&g, p, Direction::Up), Some(Position::new(160.0, 160.0)));
    }

    #[test]
    fn edges_clamp_to_no_step() {
        let g = grid();
        let origin = cell_center(&g, (0, 0));
        assert_eq!(step(&g, origin, Direction::Up), None);
        assert_eq!(step(&g, origin, Direction::Left), None);

        let corner = cell_center(&g, (49, 49));
        assert_eq!(step(&g, corner, Direction::Right), None);
        assert_eq!(step(&g, corner, Direction::Down), None);
    }

    #[test]
    fn positions_beyond_grid_clamp_into_it() {
        let g = grid();
        assert_eq!(cell_of(&g, Position::new(-10.0, 99_999.0)), (0, 49));
    }

    #[test]
    fn parse_directions() {
        assert_eq!("up".parse::<Direction>(), Ok(Direction::Up));
        assert_eq!(" ArrowLeft ".parse::<Direction>(), Ok(Direction::Left));
        assert_eq!("D".parse::<Direction>(), Ok(Direction::Right));
        assert!("north".parse::<Direction>().is_err());
    }
}
