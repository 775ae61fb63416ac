//! Ticks, zones and grid positions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One discrete simulation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tick(pub u64);

impl Tick {
    /// Ticks elapsed since `earlier` (0 if `earlier` is in the future).
    pub fn since(self, earlier: Tick) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    pub fn plus(self, ticks: u64) -> Tick {
        Tick(self.0.saturating_add(ticks))
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// A zone (room) of the world. Distances are only defined inside one zone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(String);

impl ZoneId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub zone: ZoneId,
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(zone: impl Into<String>, x: i32, y: i32) -> Self {
        Self {
            zone: ZoneId::new(zone),
            x,
            y,
        }
    }

    /// Chebyshev distance (8-way movement), `None` across zones.
    pub fn range_to(&self, other: &Position) -> Option<u32> {
        if self.zone != other.zone {
            return None;
        }
        let dx = (self.x - other.x).unsigned_abs();
        let dy = (self.y - other.y).unsigned_abs();
        Some(dx.max(dy))
    }

    pub fn is_within(&self, other: &Position, range: u32) -> bool {
        self.range_to(other).is_some_and(|r| r <= range)
    }

    /// The eight surrounding tiles.
    pub fn neighbours(&self) -> Vec<Position> {
        let mut out = Vec::with_capacity(8);
        for dy in -1..=1 {
            for dx in -1..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                out.push(Position {
                    zone: self.zone.clone(),
                    x: self.x + dx,
                    y: self.y + dy,
                });
            }
        }
        out
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{},{}", self.zone, self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::same(0, 0, 0)]
    #[case::straight(5, 0, 5)]
    #[case::diagonal(3, 3, 3)]
    #[case::mixed(2, 7, 7)]
    fn range_is_chebyshev(#[case] x: i32, #[case] y: i32, #[case] expected: u32) {
        let a = Position::new("W1N1", 10, 10);
        let b = Position::new("W1N1", 10 + x, 10 - y);
        assert_eq!(a.range_to(&b), Some(expected));
    }

    #[test]
    fn range_across_zones_is_undefined() {
        let a = Position::new("W1N1", 10, 10);
        let b = Position::new("W2N1", 10, 10);
        assert_eq!(a.range_to(&b), None);
        assert!(!a.is_within(&b, 100));
    }

    #[test]
    fn tick_since_saturates() {
        assert_eq!(Tick(10).since(Tick(4)), 6);
        assert_eq!(Tick(4).since(Tick(10)), 0);
    }
}
