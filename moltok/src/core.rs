mod atom;
mod periodic_table;
mod residue_names;
mod state;
mod structure;
mod token_map;
mod topology;

pub use {
    atom::*,
    periodic_table::*,
    residue_names::*,
    state::*,
    structure::*,
    token_map::*,
    topology::*,
};

// Aliases for vector and points
pub type Vector3f = nalgebra::Vector3<f32>;
pub type Pos = nalgebra::Point3<f32>; // Atom position
