use super::Pos;

/// Crystallographic unit cell: edge lengths in Å and angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitCell {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

/// State of the molecular system for one frame: coordinates in Å, time stamp and
/// an optional unit cell.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct State {
    pub coords: Vec<Pos>,
    pub time: f32,
    pub cell: Option<UnitCell>,
}

impl State {
    pub fn new(coords: Vec<Pos>) -> Self {
        Self {
            coords,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }
}
