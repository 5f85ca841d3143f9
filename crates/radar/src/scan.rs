//! Sweep state: a bounded angle oscillating between the two end stops

pub const ANGLE_MIN: u8 = 0;
pub const ANGLE_MAX: u8 = 180;

/// Sweep direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Increasing angle
    #[default]
    Forward,
    /// Decreasing angle
    Reverse,
}

impl Direction {
    pub fn reversed(self) -> Self {
        match self {
            Direction::Forward => Direction::Reverse,
            Direction::Reverse => Direction::Forward,
        }
    }

    /// Signed step, +1 or -1
    pub fn step(self) -> i8 {
        match self {
            Direction::Forward => 1,
            Direction::Reverse => -1,
        }
    }
}

/// Current sweep position.
///
/// The angle never leaves `ANGLE_MIN..=ANGLE_MAX`. Direction flips whenever the angle
/// lands on either bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanState {
    angle: u8,
    direction: Direction,
}

impl Default for ScanState {
    fn default() -> Self {
        Self {
            angle: ANGLE_MIN,
            direction: Direction::Forward,
        }
    }
}

impl ScanState {
    /// Start from an arbitrary position; the angle is clamped into range
    pub fn new(angle: u8, direction: Direction) -> Self {
        Self {
            angle: angle.min(ANGLE_MAX),
            direction,
        }
    }

    pub fn angle(&self) -> u8 {
        self.angle
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Move one degree and return the new angle.
    pub fn advance(&mut self) -> u8 {
        // Sitting on a bound while pointing outward.
        if (self.angle >= ANGLE_MAX && self.direction == Direction::Forward)
            || (self.angle <= ANGLE_MIN && self.direction == Direction::Reverse)
        {
            self.direction = self.direction.reversed();
        }

        let next = i16::from(self.angle) + i16::from(self.direction.step());
        self.angle = next.clamp(i16::from(ANGLE_MIN), i16::from(ANGLE_MAX)) as u8;

        if self.angle == ANGLE_MAX || self.angle == ANGLE_MIN {
            self.direction = self.direction.reversed();
        }
        self.angle
    }
}
